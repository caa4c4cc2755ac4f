use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use scanflow::errors::ItemError;
use scanflow::exec::{invoke_with_deadline, run_with_deadline, Guarded, Invocation, ProcessInvoker, KILL_GRACE};
use scanflow_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn completes_before_the_deadline() {
    let parent = CancellationToken::new();
    let out = run_with_deadline(Some(Duration::from_secs(5)), &parent, |_token| async { 7 }).await;
    assert_eq!(out, Guarded::Completed(7));
}

#[tokio::test]
async fn no_limit_means_no_deadline() {
    let parent = CancellationToken::new();
    let out = run_with_deadline(None, &parent, |_token| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        "done"
    })
    .await;
    assert_eq!(out, Guarded::Completed("done"));
}

#[tokio::test]
async fn expiry_cancels_the_child_token() {
    init_tracing();
    let parent = CancellationToken::new();
    let limit = Duration::from_millis(100);
    let started = Instant::now();

    let out = run_with_deadline(Some(limit), &parent, |token| async move {
        token.cancelled().await;
        "cleaned up"
    })
    .await;

    assert_eq!(out, Guarded::TimedOut(limit));
    assert!(started.elapsed() < limit + Duration::from_millis(500));
    // Only the child was cancelled.
    assert!(!parent.is_cancelled());
}

#[tokio::test]
async fn action_ignoring_cancellation_is_abandoned_after_grace() {
    let parent = CancellationToken::new();
    let limit = Duration::from_millis(50);
    let started = Instant::now();

    let out = with_timeout(run_with_deadline(Some(limit), &parent, |_token| async {
        std::future::pending::<()>().await;
    }))
    .await;

    assert_eq!(out, Guarded::TimedOut(limit));
    let elapsed = started.elapsed();
    assert!(elapsed >= KILL_GRACE);
    assert!(elapsed < KILL_GRACE + Duration::from_secs(1));
}

#[tokio::test]
async fn parent_cancellation_reaches_the_action() {
    let parent = CancellationToken::new();
    let trigger = parent.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let out = with_timeout(run_with_deadline(None, &parent, |token| async move {
        token.cancelled().await;
        "stopped"
    }))
    .await;
    assert_eq!(out, Guarded::Completed("stopped"));
}

#[cfg(unix)]
mod process {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn exit_zero_is_success() {
        init_tracing();
        let result = invoke_with_deadline(&ProcessInvoker, &sh("echo hello; echo oops >&2"), None, &CancellationToken::new()).await;
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_with_its_code() {
        let result = invoke_with_deadline(&ProcessInvoker, &sh("exit 3"), None, &CancellationToken::new()).await;
        match result {
            Err(ItemError::ExitStatus { code, .. }) => assert_eq!(code, 3),
            other => panic!("expected ExitStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_program_is_a_spawn_error() {
        let inv = Invocation::new("/definitely/not/a/program");
        let result = invoke_with_deadline(&ProcessInvoker, &inv, None, &CancellationToken::new()).await;
        assert!(matches!(result, Err(ItemError::Spawn { .. })));
    }

    #[tokio::test]
    async fn hung_process_is_killed_at_the_deadline() {
        init_tracing();
        let limit = Duration::from_millis(200);
        let started = Instant::now();
        let result = with_timeout(invoke_with_deadline(
            &ProcessInvoker,
            &Invocation::new("sleep").arg("30"),
            Some(limit),
            &CancellationToken::new(),
        ))
        .await;

        assert!(matches!(result, Err(ItemError::TimedOut(d)) if d == limit));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}

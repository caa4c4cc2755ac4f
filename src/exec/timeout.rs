// src/exec/timeout.rs

//! Deadline + cancellation around a single external invocation.
//!
//! The guarded action receives a child [`CancellationToken`]. When the
//! deadline passes, the token is cancelled so the action can kill its
//! process; after a short grace window the action is dropped regardless.
//! Cancelling the parent token (Ctrl-C) reaches the same child token, so
//! one mechanism covers both.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long a cancelled action gets to clean up before it is dropped.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Result of [`run_with_deadline`].
#[derive(Debug, PartialEq, Eq)]
pub enum Guarded<T> {
    /// The action finished on its own.
    Completed(T),
    /// The deadline passed; the action was cancelled and abandoned.
    TimedOut(Duration),
}

/// Run `action` with an optional wall-clock `limit`.
///
/// `None` runs the action to completion with only `parent` cancellation.
pub async fn run_with_deadline<F, Fut, T>(
    limit: Option<Duration>,
    parent: &CancellationToken,
    action: F,
) -> Guarded<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T>,
{
    let token = parent.child_token();
    let fut = action(token.clone());
    tokio::pin!(fut);

    let Some(limit) = limit else {
        return Guarded::Completed(fut.await);
    };

    tokio::select! {
        out = &mut fut => Guarded::Completed(out),
        _ = sleep(limit) => {
            debug!(?limit, "deadline reached; cancelling invocation");
            token.cancel();
            if timeout(KILL_GRACE, &mut fut).await.is_err() {
                warn!(?limit, "invocation ignored cancellation; abandoning it");
            }
            Guarded::TimedOut(limit)
        }
    }
}

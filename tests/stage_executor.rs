use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use scanflow::config::ConfigFile;
use scanflow::errors::ItemError;
use scanflow::exec::Invoker;
use scanflow::pipeline::PipelineStep;
use scanflow::stage::{Action, Gear, GearKind, StageGear, StageReport};
use scanflow::types::{ErrorKind, Outcome, RunOptions, WorkItemId};
use scanflow_test_utils::builders::{ConfigFileBuilder, StageConfigBuilder};
use scanflow_test_utils::fake_invoker::{Behaviour, FakeInvoker};
use scanflow_test_utils::{init_tracing, with_timeout, write_item_file, write_tool};

type TestResult = Result<(), Box<dyn Error>>;

const ITEMS: [&str; 3] = ["1001", "1002", "1003"];

/// Layout:
/// - cut/<id>_MOUTH_REMOVED.mha
/// - landmarks/<id>_LANDMARKS.fcsv
/// - bin/laplace
/// - stage "laplace" (laplace_solution) writing heat/<id>_HEATFLOW.mha
fn laplace_fixture(root: &Path, timeout: Option<&str>) -> ConfigFile {
    for id in ITEMS {
        write_item_file(&root.join("cut"), id, "MOUTH_REMOVED", "mha", &format!("mask {id}"));
        write_item_file(&root.join("landmarks"), id, "LANDMARKS", "fcsv", &format!("lm {id}"));
    }
    write_tool(&root.join("bin"), "laplace", "laplace v1");

    let mut stage = StageConfigBuilder::new("laplace", GearKind::LaplaceSolution, "bin/laplace")
        .track("cut")
        .track("landmarks")
        .output_dir("heat");
    if let Some(t) = timeout {
        stage = stage.timeout(t);
    }
    ConfigFileBuilder::new(root).with_stage(stage.build()).build()
}

async fn run_stage(cfg: &ConfigFile, invoker: &Arc<FakeInvoker>, jobs: usize) -> Result<StageReport, Box<dyn Error>> {
    let invoker: Arc<dyn Invoker> = invoker.clone();
    let mut step = PipelineStep::from_config(cfg, &cfg.stage[0], invoker, jobs, CancellationToken::new())?;
    Ok(step.run(RunOptions::default()).await?)
}

fn outcome_of(report: &StageReport, id: &str) -> Outcome {
    report
        .records
        .iter()
        .find(|r| r.item.as_str() == id)
        .map(|r| r.outcome)
        .unwrap_or_else(|| panic!("no record for {id}"))
}

#[tokio::test]
async fn second_run_is_a_no_op() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = laplace_fixture(dir.path(), None);
    let invoker = Arc::new(FakeInvoker::new());

    let first = run_stage(&cfg, &invoker, 2).await?;
    assert_eq!(first.records.len(), 3);
    assert!(first.all_succeeded());
    assert_eq!(invoker.call_count(), 3);
    for id in ITEMS {
        assert!(dir.path().join(format!("heat/{id}_HEATFLOW.mha")).is_file());
    }

    let second = run_stage(&cfg, &invoker, 2).await?;
    assert!(second.records.is_empty());
    assert_eq!(invoker.call_count(), 3);
    Ok(())
}

#[tokio::test]
async fn only_the_changed_item_is_reprocessed() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = laplace_fixture(dir.path(), None);
    let invoker = Arc::new(FakeInvoker::new());
    run_stage(&cfg, &invoker, 1).await?;

    fs::write(dir.path().join("landmarks/1002_LANDMARKS.fcsv"), "lm 1002!")?;

    let report = run_stage(&cfg, &invoker, 1).await?;
    assert_eq!(report.succeeded_ids(), vec![&WorkItemId::new("1002")]);
    assert_eq!(invoker.calls_mentioning("1002_"), 2);
    assert_eq!(invoker.calls_mentioning("1001_"), 1);
    Ok(())
}

#[tokio::test]
async fn missing_input_fails_only_that_item() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = laplace_fixture(dir.path(), None);
    fs::remove_file(dir.path().join("landmarks/1002_LANDMARKS.fcsv"))?;
    let invoker = Arc::new(FakeInvoker::new());

    let report = run_stage(&cfg, &invoker, 3).await?;

    assert_eq!(outcome_of(&report, "1001"), Outcome::Success);
    assert_eq!(outcome_of(&report, "1003"), Outcome::Success);
    let failed = report.records.iter().find(|r| r.item.as_str() == "1002").unwrap();
    assert_eq!(failed.outcome, Outcome::Failure);
    assert_eq!(failed.error, Some(ErrorKind::MissingInput));
    assert!(failed.detail.as_deref().unwrap_or("").contains("1002_LANDMARKS.fcsv"));

    // The tool was never called for the broken item.
    assert_eq!(invoker.calls_mentioning("1002_"), 0);

    let failures = fs::read_to_string(dir.path().join("logs/laplace.failures"))?;
    assert_eq!(failures, "1002\n");

    let run_log = fs::read_to_string(dir.path().join("logs/laplace.log"))?;
    assert_eq!(run_log.lines().count(), 3);
    assert!(run_log.lines().any(|l| l.contains(" laplace 1002 failure missing_input: ")));
    Ok(())
}

#[tokio::test]
async fn failed_item_is_retried_until_it_succeeds() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = laplace_fixture(dir.path(), None);
    let invoker = Arc::new(FakeInvoker::new());
    run_stage(&cfg, &invoker, 1).await?;

    fs::write(dir.path().join("landmarks/1003_LANDMARKS.fcsv"), "moved")?;
    let invoker = Arc::new(FakeInvoker::new().when("1003_", Behaviour::Fail(3)));
    let first = run_stage(&cfg, &invoker, 1).await?;
    assert_eq!(first.failed_ids(), vec![&WorkItemId::new("1003")]);
    assert_eq!(first.records.len(), 1);
    assert_eq!(first.records[0].error, Some(ErrorKind::Invocation));

    // Nothing changed on disk since, but 1003 was never committed.
    invoker.reset_rules();
    let second = run_stage(&cfg, &invoker, 1).await?;
    assert_eq!(second.succeeded_ids(), vec![&WorkItemId::new("1003")]);

    // A new non-empty batch truncates the failure log.
    let failures = fs::read_to_string(dir.path().join("logs/laplace.failures"))?;
    assert!(failures.is_empty());

    let third = run_stage(&cfg, &invoker, 1).await?;
    assert!(third.records.is_empty());
    Ok(())
}

#[tokio::test]
async fn executable_change_reprocesses_each_item_until_it_succeeds() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = laplace_fixture(dir.path(), None);
    let invoker = Arc::new(FakeInvoker::new());
    run_stage(&cfg, &invoker, 1).await?;

    write_tool(&dir.path().join("bin"), "laplace", "laplace v2");
    let invoker = Arc::new(FakeInvoker::new().when("1001_", Behaviour::Fail(1)));
    let partial = run_stage(&cfg, &invoker, 1).await?;
    assert_eq!(partial.records.len(), 3);
    assert_eq!(partial.failed_ids(), vec![&WorkItemId::new("1001")]);

    // Only the item that has not yet succeeded with the new build returns.
    invoker.reset_rules();
    let retry = run_stage(&cfg, &invoker, 1).await?;
    assert_eq!(retry.succeeded_ids(), vec![&WorkItemId::new("1001")]);

    let after = run_stage(&cfg, &invoker, 1).await?;
    assert!(after.records.is_empty());
    Ok(())
}

#[tokio::test]
async fn a_permanently_broken_item_does_not_hold_back_the_others() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = laplace_fixture(dir.path(), None);
    fs::remove_file(dir.path().join("landmarks/1002_LANDMARKS.fcsv"))?;
    let invoker = Arc::new(FakeInvoker::new());

    let first = run_stage(&cfg, &invoker, 1).await?;
    assert_eq!(first.records.len(), 3);
    assert_eq!(first.failed_ids(), vec![&WorkItemId::new("1002")]);

    for _ in 0..2 {
        let again = run_stage(&cfg, &invoker, 1).await?;
        assert_eq!(again.records.len(), 1);
        assert_eq!(again.failed_ids(), vec![&WorkItemId::new("1002")]);
    }

    assert_eq!(invoker.calls_mentioning("1001_"), 1);
    assert_eq!(invoker.calls_mentioning("1003_"), 1);
    assert_eq!(invoker.call_count(), 2);

    // Tool records sit under the state dir, not next to the tool.
    let records = dir.path().join(".scanflow/executables/laplace");
    assert!(records.join("1001/laplace.hash").is_file());
    assert!(!records.join("1002").exists());
    assert!(!dir.path().join("bin/.scanflow").exists());
    Ok(())
}

#[tokio::test]
async fn missing_output_after_success_is_a_failure() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = laplace_fixture(dir.path(), None);
    let invoker = Arc::new(FakeInvoker::new());
    run_stage(&cfg, &invoker, 1).await?;

    // A deleted output makes its item stale even though the inputs match.
    fs::remove_file(dir.path().join("heat/1001_HEATFLOW.mha"))?;
    let invoker = Arc::new(FakeInvoker::new().when("1001_", Behaviour::ForgetOutputs));
    let report = run_stage(&cfg, &invoker, 1).await?;
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].error, Some(ErrorKind::MissingOutput));

    invoker.reset_rules();
    let again = run_stage(&cfg, &invoker, 1).await?;
    assert_eq!(again.succeeded_ids(), vec![&WorkItemId::new("1001")]);
    assert!(dir.path().join("heat/1001_HEATFLOW.mha").is_file());
    Ok(())
}

#[tokio::test]
async fn timeout_kills_one_item_and_the_batch_continues() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = laplace_fixture(dir.path(), Some("200ms"));
    let invoker = Arc::new(FakeInvoker::new().when("1001_", Behaviour::Hang));

    let started = Instant::now();
    let report = with_timeout(run_stage(&cfg, &invoker, 1)).await?;
    let elapsed = started.elapsed();

    assert_eq!(outcome_of(&report, "1001"), Outcome::TimedOut);
    assert_eq!(outcome_of(&report, "1002"), Outcome::Success);
    assert_eq!(outcome_of(&report, "1003"), Outcome::Success);
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(2), "overshoot too large: {elapsed:?}");

    let failures = fs::read_to_string(dir.path().join("logs/laplace.failures"))?;
    assert_eq!(failures, "1001\n");
    Ok(())
}

#[tokio::test]
async fn cancellation_skips_items_not_yet_started() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = laplace_fixture(dir.path(), None);
    let invoker = Arc::new(FakeInvoker::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let dyn_invoker: Arc<dyn Invoker> = invoker.clone();
    let mut step = PipelineStep::from_config(&cfg, &cfg.stage[0], dyn_invoker, 1, cancel)?;
    let report = step.run(RunOptions::default()).await?;

    assert_eq!(report.count(Outcome::Skipped), 3);
    assert_eq!(invoker.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn dry_run_invokes_nothing_and_commits_nothing() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = laplace_fixture(dir.path(), None);
    let invoker = Arc::new(FakeInvoker::new());
    let dyn_invoker: Arc<dyn Invoker> = invoker.clone();

    let mut step = PipelineStep::from_config(&cfg, &cfg.stage[0], dyn_invoker, 1, CancellationToken::new())?;
    let options = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    let report = step.run(options).await?;
    assert!(report.records.is_empty());
    assert_eq!(invoker.call_count(), 0);
    assert!(!dir.path().join("logs").exists());
    assert_eq!(step.plan(false)?.len(), 3);
    Ok(())
}

#[test]
fn laplace_arguments_follow_the_role_table() -> TestResult {
    let dir = tempdir()?;
    let root = dir.path();
    write_item_file(&root.join("cut"), "1001", "MOUTH_REMOVED", "mha", "m");
    write_item_file(&root.join("lm"), "1001", "LANDMARKS", "fcsv", "l");

    let gear = StageGear::new(
        "laplace",
        GearKind::LaplaceSolution,
        root.join("bin/laplace"),
        vec![root.join("cut"), root.join("lm")],
        root.join("heat"),
    )
    .with_args(vec!["--verbose".to_string()]);

    let args = gear.derive_arguments(&WorkItemId::new("1001"))?;
    let [Action::Run(invocation)] = args.actions.as_slice() else {
        panic!("expected one Run action, got {:?}", args.actions);
    };
    let p = |rel: &str| root.join(rel).display().to_string();
    assert_eq!(
        invocation.args,
        vec![
            "--verbose".to_string(),
            "--input".to_string(),
            p("cut/1001_MOUTH_REMOVED.mha"),
            "--landmarks".to_string(),
            p("lm/1001_LANDMARKS.fcsv"),
            "--output".to_string(),
            p("heat/1001_HEATFLOW.mha"),
        ]
    );
    assert_eq!(invocation.produces, vec![root.join("heat/1001_HEATFLOW.mha")]);
    assert_eq!(gear.expected_outputs(&WorkItemId::new("1001")), invocation.produces);
    Ok(())
}

#[test]
fn positional_gears_keep_argument_order() -> TestResult {
    let dir = tempdir()?;
    let root = dir.path();
    write_item_file(&root.join("in"), "7", "LANDMARKS", "fcsv", "l");
    write_item_file(&root.join("in"), "7", "CROSS", "vtp", "c");

    let gear = StageGear::new(
        "extract",
        GearKind::ExtractLandmarks,
        "extract",
        vec![root.join("in")],
        root.join("out"),
    );
    let args = gear.derive_arguments(&WorkItemId::new("7"))?;
    let [Action::Run(invocation)] = args.actions.as_slice() else {
        panic!("expected one Run action");
    };
    let p = |rel: &str| root.join(rel).display().to_string();
    assert_eq!(
        invocation.args,
        vec![
            "--landmarks".to_string(),
            p("in/7_LANDMARKS.fcsv"),
            p("in/7_CROSS.vtp"),
            p("out/7_EXTRACTED_SEGMENTS.vtp"),
        ]
    );
    Ok(())
}

#[test]
fn missing_input_names_the_expected_path() {
    let dir = tempdir().unwrap();
    let gear = StageGear::new(
        "agg",
        GearKind::Aggregate,
        "agg",
        vec![dir.path().join("segments")],
        dir.path().join("out"),
    );
    match gear.derive_arguments(&WorkItemId::new("9")) {
        Err(ItemError::MissingInput(path)) => {
            assert_eq!(path, dir.path().join("segments/9_EXTRACTED_SEGMENTS.vtp"))
        }
        other => panic!("expected MissingInput, got {other:?}"),
    }
}

#[tokio::test]
async fn remove_mouth_copies_inputs_when_there_are_no_clippings() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let root = dir.path();
    for id in ["1001", "1002"] {
        write_item_file(&root.join("seg"), id, "OUTPUT", "mha", &format!("volume {id}"));
        write_item_file(&root.join("seg"), id, "OUTPUT", "vtp", &format!("surface {id}"));
    }
    write_item_file(&root.join("seg"), "1002", "CLIPPINGS", "txt", "planes");
    write_tool(&root.join("bin"), "remove_mouth", "rm v1");

    let cfg = ConfigFileBuilder::new(root)
        .with_stage(
            StageConfigBuilder::new("mouth", GearKind::RemoveMouth, "bin/remove_mouth")
                .track("seg")
                .output_dir("cut")
                .build(),
        )
        .build();
    let invoker = Arc::new(FakeInvoker::new());

    let report = run_stage(&cfg, &invoker, 1).await?;
    assert!(report.all_succeeded());

    // 1001 has no clippings: pure copy, no tool call.
    assert_eq!(invoker.calls_mentioning("1001_"), 0);
    assert_eq!(fs::read_to_string(root.join("cut/1001_MOUTH_REMOVED.mha"))?, "volume 1001");
    assert_eq!(fs::read_to_string(root.join("cut/1001_MOUTH_REMOVED.vtp"))?, "surface 1001");

    // 1002 has clippings: the tool runs with all three inputs.
    let calls = invoker.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].args.contains(&"--clippings".to_string()));
    assert!(calls[0].args.contains(&"--outputGeometry".to_string()));
    Ok(())
}

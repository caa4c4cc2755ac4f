use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use scanflow::config::{load_and_validate, ConfigFile};
use scanflow::errors::ScanflowError;
use scanflow::exec::Invoker;
use scanflow::types::{RunOptions, WorkItemId};
use scanflow::workflow::discover_items;
use scanflow::{clear_workflow_caches, run_config, RunPlan};
use scanflow_test_utils::fake_invoker::{Behaviour, FakeInvoker};
use scanflow_test_utils::{init_tracing, write_item_file, write_tool};

type TestResult = Result<(), Box<dyn Error>>;

/// Two chained stages feeding a per-item workflow:
///
/// seg/ --remove_mouth--> cut/ --laplace_solution--> heat/ --Threshold--> heat/*_THRESHOLDED.vtu
fn write_project(root: &Path) -> Result<ConfigFile, Box<dyn Error>> {
    for id in ["1001", "1002"] {
        write_item_file(&root.join("seg"), id, "OUTPUT", "mha", &format!("vol {id}"));
        write_item_file(&root.join("seg"), id, "OUTPUT", "vtp", &format!("surf {id}"));
        write_item_file(&root.join("lm"), id, "LANDMARKS", "fcsv", &format!("lm {id}"));
    }
    write_tool(&root.join("bin"), "remove_mouth", "rm v1");
    write_tool(&root.join("bin"), "laplace", "lp v1");
    fs::create_dir_all(root.join("cut"))?;

    let config_path = root.join("Scanflow.toml");
    fs::write(
        &config_path,
        r#"
[config]
jobs = 2
timeout = "1m"

[[stage]]
name = "mouth"
kind = "remove_mouth"
executable = "bin/remove_mouth"
track = [{ dir = "seg" }]
output_dir = "cut"

[[stage]]
name = "laplace"
kind = "laplace_solution"
executable = "bin/laplace"
track = [{ dir = "cut", include = ["*_MOUTH_REMOVED.mha"] }, { dir = "lm" }]
output_dir = "heat"

[workflow]
items = ["1001", "1002"]
required = ["lm/{id}_LANDMARKS.fcsv"]

[[workflow.step]]
name = "Threshold"
program = "bin/threshold"
args = ["--in", "{input.0}", "--out", "{output.0}"]
inputs = ["heat/{id}_HEATFLOW.mha"]
outputs = ["heat/{id}_THRESHOLDED.vtu"]
"#,
    )?;
    Ok(load_and_validate(&config_path)?)
}

fn invoker_of(fake: &Arc<FakeInvoker>) -> Arc<dyn Invoker> {
    fake.clone()
}

#[tokio::test]
async fn full_run_then_idle_run() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = write_project(dir.path())?;
    let fake = Arc::new(FakeInvoker::new());

    let summary = run_config(&cfg, &RunPlan::default(), invoker_of(&fake), CancellationToken::new()).await?;
    assert!(summary.all_succeeded());
    assert_eq!(summary.stages.len(), 2);
    assert_eq!(summary.stages[0].records.len(), 2);
    assert_eq!(summary.stages[1].records.len(), 2);
    assert_eq!(summary.workflows.len(), 2);

    // No clippings: remove_mouth copied; laplace + threshold ran per item.
    assert_eq!(fake.calls_mentioning("remove_mouth"), 0);
    assert_eq!(fake.calls_mentioning("laplace"), 2);
    assert_eq!(fake.calls_mentioning("threshold"), 2);
    assert!(dir.path().join("heat/1001_THRESHOLDED.vtu").is_file());

    let workflow_log = fs::read_to_string(dir.path().join("logs/workflow.log"))?;
    assert_eq!(workflow_log.lines().count(), 2);
    assert!(fs::read_to_string(dir.path().join("logs/workflow.failures"))?.is_empty());

    let idle = run_config(&cfg, &RunPlan::default(), invoker_of(&fake), CancellationToken::new()).await?;
    assert!(idle.all_succeeded());
    assert!(idle.stages.iter().all(|s| s.records.is_empty()));
    assert!(idle.workflows.iter().all(|w| w.records.is_empty()));
    assert_eq!(fake.call_count(), 4);
    Ok(())
}

#[tokio::test]
async fn upstream_change_flows_through_every_layer() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = write_project(dir.path())?;
    let fake = Arc::new(FakeInvoker::new());
    run_config(&cfg, &RunPlan::default(), invoker_of(&fake), CancellationToken::new()).await?;

    fs::write(dir.path().join("seg/1002_OUTPUT.mha"), "vol 1002 fixed")?;
    let summary = run_config(&cfg, &RunPlan::default(), invoker_of(&fake), CancellationToken::new()).await?;

    assert_eq!(summary.stages[0].records.len(), 1);
    assert_eq!(summary.stages[1].records.len(), 1);
    assert_eq!(summary.stages[1].records[0].item.as_str(), "1002");
    assert!(summary.workflows[0].records.is_empty());
    assert_eq!(summary.workflows[1].records.len(), 1);
    Ok(())
}

#[tokio::test]
async fn workflow_failures_are_logged_with_item_and_step() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = write_project(dir.path())?;
    let fake = Arc::new(FakeInvoker::new().when("1002_THRESHOLDED", Behaviour::Fail(4)));

    let summary = run_config(&cfg, &RunPlan::default(), invoker_of(&fake), CancellationToken::new()).await?;
    assert!(!summary.all_succeeded());

    let failures = fs::read_to_string(dir.path().join("logs/workflow.failures"))?;
    assert_eq!(failures, "1002 Threshold-1002\n");
    Ok(())
}

#[tokio::test]
async fn single_stage_skips_the_workflow() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = write_project(dir.path())?;
    let fake = Arc::new(FakeInvoker::new());

    let plan = RunPlan {
        stage: Some("mouth".to_string()),
        ..RunPlan::default()
    };
    let summary = run_config(&cfg, &plan, invoker_of(&fake), CancellationToken::new()).await?;
    assert_eq!(summary.stages.len(), 1);
    assert_eq!(summary.stages[0].stage, "mouth");
    assert!(summary.workflows.is_empty());

    let unknown = RunPlan {
        stage: Some("nope".to_string()),
        ..RunPlan::default()
    };
    let err = run_config(&cfg, &unknown, invoker_of(&fake), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ScanflowError::ConfigError(_)));
    Ok(())
}

#[tokio::test]
async fn item_filter_and_dry_run() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = write_project(dir.path())?;
    let fake = Arc::new(FakeInvoker::new());

    let plan = RunPlan {
        options: RunOptions {
            dry_run: true,
            ..RunOptions::default()
        },
        items: vec!["1002".to_string()],
        ..RunPlan::default()
    };
    let summary = run_config(&cfg, &plan, invoker_of(&fake), CancellationToken::new()).await?;
    assert_eq!(fake.call_count(), 0);
    assert_eq!(summary.workflows.len(), 1);
    assert_eq!(summary.workflows[0].item.as_str(), "1002");
    assert!(!dir.path().join("logs").exists());
    assert!(!dir.path().join("cut/.scanflow").exists());
    Ok(())
}

#[tokio::test]
async fn clear_cache_resets_every_selected_item() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = write_project(dir.path())?;
    let fake = Arc::new(FakeInvoker::new());
    run_config(&cfg, &RunPlan::default(), invoker_of(&fake), CancellationToken::new()).await?;

    // A corrupt cache can still be cleared.
    let cache_1002 = cfg.workflow_cache_path("1002");
    fs::write(&cache_1002, "garbage")?;

    clear_workflow_caches(&cfg, &RunPlan::default())?;
    let summary = run_config(&cfg, &RunPlan::default(), invoker_of(&fake), CancellationToken::new()).await?;
    assert_eq!(summary.workflows[0].records.len(), 1);
    assert_eq!(summary.workflows[1].records.len(), 1);
    // Stages are untouched by clearing workflow caches.
    assert!(summary.stages.iter().all(|s| s.records.is_empty()));
    Ok(())
}

#[tokio::test]
async fn jobs_override_must_be_positive() -> TestResult {
    let dir = tempdir()?;
    let cfg = write_project(dir.path())?;
    let plan = RunPlan {
        jobs: Some(0),
        ..RunPlan::default()
    };
    let fake = Arc::new(FakeInvoker::new());
    let result = run_config(&cfg, &plan, invoker_of(&fake), CancellationToken::new()).await;
    assert!(matches!(result, Err(ScanflowError::ConfigError(_))));
    Ok(())
}

#[tokio::test]
async fn failure_log_survives_a_run_where_nothing_executes() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let cfg = write_project(dir.path())?;
    let fake = Arc::new(FakeInvoker::new().when("1002_THRESHOLDED", Behaviour::Fail(4)));
    run_config(&cfg, &RunPlan::default(), invoker_of(&fake), CancellationToken::new()).await?;

    let only_1001 = RunPlan {
        items: vec!["1001".to_string()],
        ..RunPlan::default()
    };
    let idle = run_config(&cfg, &only_1001, invoker_of(&fake), CancellationToken::new()).await?;
    assert!(idle.workflows[0].records.is_empty());

    let failures = fs::read_to_string(dir.path().join("logs/workflow.failures"))?;
    assert_eq!(failures, "1002 Threshold-1002\n");
    Ok(())
}

fn write_scan_dirs(root: &Path, ids: &[&str]) {
    for id in ids {
        write_item_file(&root.join("scans").join(id), id, "HEATFLOW", "mha", &format!("heat {id}"));
    }
}

fn glob_config(root: &Path, items: &str) -> Result<ConfigFile, Box<dyn Error>> {
    let config_path = root.join("Scanflow.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[workflow]
items = [{items}]
item_glob = "scans/*"

[[workflow.step]]
name = "Threshold"
program = "bin/threshold"
inputs = ["scans/{{id}}/{{id}}_HEATFLOW.mha"]
outputs = ["scans/{{id}}/{{id}}_THRESHOLDED.vtu"]
"#
        ),
    )?;
    Ok(load_and_validate(&config_path)?)
}

#[tokio::test]
async fn item_glob_picks_up_every_scan_directory() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    write_scan_dirs(dir.path(), &["1002", "1001"]);
    fs::create_dir_all(dir.path().join("scans/.trash/1003"))?;
    fs::write(dir.path().join("scans/README"), "not a scan")?;
    let cfg = glob_config(dir.path(), r#""1002""#)?;
    let fake = Arc::new(FakeInvoker::new());

    let summary = run_config(&cfg, &RunPlan::default(), invoker_of(&fake), CancellationToken::new()).await?;
    let items: Vec<&str> = summary.workflows.iter().map(|w| w.item.as_str()).collect();
    // Listed items first, then discovered ones not already listed.
    assert_eq!(items, vec!["1002", "1001"]);
    assert!(summary.all_succeeded());
    assert_eq!(fake.calls_mentioning("threshold"), 2);
    Ok(())
}

#[tokio::test]
async fn item_glob_without_matches_runs_nothing() -> TestResult {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("scans"))?;
    let cfg = glob_config(dir.path(), "")?;
    let fake = Arc::new(FakeInvoker::new());

    let summary = run_config(&cfg, &RunPlan::default(), invoker_of(&fake), CancellationToken::new()).await?;
    assert!(summary.workflows.is_empty());
    assert_eq!(fake.call_count(), 0);
    Ok(())
}

#[test]
fn discovered_items_respect_separators_and_depth() -> TestResult {
    let dir = tempdir()?;
    let root = dir.path();
    for rel in ["data/1001", "data/1002", "data/nested/1003", "other/1004"] {
        fs::create_dir_all(root.join(rel))?;
    }
    let names = |ids: Vec<WorkItemId>| ids.into_iter().map(|i| i.to_string()).collect::<Vec<_>>();

    assert_eq!(names(discover_items(root, "data/1*")?), vec!["1001", "1002"]);
    assert_eq!(names(discover_items(root, "data/**/1*/")?), vec!["1001", "1002", "1003"]);
    assert!(discover_items(root, "missing/*")?.is_empty());
    Ok(())
}

// src/main.rs

use scanflow::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("scanflow error: {err:?}");
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the run completed but some items failed.
async fn run_main() -> anyhow::Result<bool> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    let summary = run(args).await?;
    Ok(summary.all_succeeded())
}

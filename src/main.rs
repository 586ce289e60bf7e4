use anyhow::{Context, bail};
use log::{error, info};
use payroll_panel::{Pipeline, PipelineConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

#[global_allocator]
static ALLOC: snmalloc_rs::SnMalloc = snmalloc_rs::SnMalloc;

fn run() -> anyhow::Result<()> {
    let Some(config_path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        bail!("usage: payroll-panel <config.json>");
    };

    let config = PipelineConfig::from_json_file(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    let output_dir = config.output_dir.clone();

    let start = Instant::now();
    let summary = Pipeline::new(config)
        .run()
        .context("pipeline run failed")?;

    info!(
        "Wrote {} tables from {} client-month records to {} in {:?}",
        summary.tables.len(),
        summary.client_months,
        output_dir.display(),
        start.elapsed()
    );
    if !summary.rake.converged {
        info!(
            "Raking hit the iteration cap ({} iterations, max change {:.3e})",
            summary.rake.iterations, summary.rake.max_change
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

mod pipelines;
mod utils;
mod config;
mod cli;

use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use log::{LevelFilter, debug, info, error};
use env_logger::Builder;
use crate::cli::parse;
use crate::config::defs::{absolute_path, PipelineError, RunConfig};
use crate::utils::system::detect_cores_and_load;
use pipelines::alignment;
use pipelines::summary;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n STAR two-pass\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}\n", dir);

    let (max_cores, cpu_load) = detect_cores_and_load().await?;
    debug!("Detected {} physical cores; CPU load {}%", max_cores, cpu_load);

    let working_dir = resolve_dir(args.working_dir.as_deref(), &dir);
    let report_dir = resolve_dir(args.report_dir.as_deref(), &working_dir);
    info!("Working directory: {}", working_dir.display());

    let module = args.module.clone();
    let run_config = Arc::new(RunConfig {
        cwd: dir,
        working_dir,
        report_dir,
        args,
        max_cores,
    });

    if let Err(e) = match module.as_str() {
        "first_pass" => first_pass_run(run_config).await,
        "second_pass" => second_pass_run(run_config).await,
        "two_pass" => alignment::run(run_config).await,
        "report" => summary::run(run_config).await,
        "full" => full_run(run_config).await,
        _ => Err(PipelineError::InvalidConfig(format!("Invalid module: {}", module))),
    } {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


async fn first_pass_run(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    alignment::first_pass_run(run_config).await.map(|_| ())
}

async fn second_pass_run(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    alignment::second_pass_run(run_config).await.map(|_| ())
}

async fn full_run(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    alignment::run(run_config.clone()).await?;
    summary::run(run_config).await
}


/// Resolves an optional directory argument against `base`, defaulting to `base`.
fn resolve_dir(arg: Option<&str>, base: &PathBuf) -> PathBuf {
    match arg {
        Some(path) => absolute_path(path, base),
        None => base.clone(),
    }
}

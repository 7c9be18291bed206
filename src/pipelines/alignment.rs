use std::path::{Path, PathBuf};
use std::sync::Arc;
use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::fs;
use tokio::sync::Semaphore;
use crate::config::defs::{absolute_path, Pass, PipelineError, RunConfig, StarConfig, FIRST_PASS_DIR, SJ_SUFFIX, STAR_TAG};
use crate::utils::command::check_version;
use crate::utils::command::command_line;
use crate::utils::command::star::{InvocationOutcome, StarInvocation};
use crate::utils::file::{find_files_with_suffix, is_gzipped};
use crate::utils::system::oversubscribed;


/// Outcomes of every STAR invocation in one pass.
#[derive(Debug)]
pub struct PassReport {
    pub pass: Pass,
    pub pass_dir: PathBuf,
    pub outcomes: Vec<InvocationOutcome>,
}

impl PassReport {
    pub fn failures(&self) -> Vec<&InvocationOutcome> {
        self.outcomes.iter().filter(|o| !o.success).collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }
}


/// All `*SJ.out.tab` junction tables below `root`, sorted.
pub async fn collect_junctions(root: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    find_files_with_suffix(root, SJ_SUFFIX, true).await
}


/// Runs STAR once per read file found directly under `working_dir`.
///
/// With a non-empty `sjdb_list` this is the second pass: every invocation gets
/// the junction tables and output goes to `second_pass`. Otherwise output goes
/// to `first_pass`. The pass directory must not exist yet.
///
/// # Arguments
///
/// * `star` - Validated StarConfig.
/// * `working_dir` - Directory holding the read files.
/// * `sjdb_list` - Junction tables from the first pass, if any.
/// * `jobs` - Maximum concurrent STAR processes.
///
/// # Returns
/// PassReport with one outcome per read file, in read file order.
pub async fn run_aligner(
    star: &StarConfig,
    working_dir: &Path,
    sjdb_list: Option<&[PathBuf]>,
    jobs: usize,
) -> Result<PassReport, PipelineError> {
    if !working_dir.is_dir() {
        return Err(PipelineError::missing("working directory", working_dir));
    }
    // Children run inside the pass directory, so every path they see must be absolute
    let working_dir = fs::canonicalize(working_dir)
        .await
        .map_err(|e| PipelineError::io(working_dir, e))?;
    let sjdb_files: Vec<PathBuf> = sjdb_list
        .unwrap_or(&[])
        .iter()
        .map(|p| absolute_path(p, &working_dir))
        .collect();
    let pass = if sjdb_files.is_empty() { Pass::First } else { Pass::Second };

    let version = check_version(STAR_TAG, &star.star_path).await.map_err(|e| {
        error!("{:#}", e);
        match e.downcast_ref::<std::io::Error>() {
            Some(io) if io.kind() == std::io::ErrorKind::NotFound => {
                PipelineError::missing("aligner executable", &star.star_path)
            }
            _ => PipelineError::ToolExecution { tool: STAR_TAG.to_string(), error: format!("{:#}", e) },
        }
    })?;
    info!("Using STAR {} at {}", version, star.star_path.display());

    let read_files = find_files_with_suffix(&working_dir, &star.read_suffix, false).await?;
    if star.read_suffix.ends_with(".gz") {
        for read_file in &read_files {
            match is_gzipped(read_file).await {
                Ok(true) => {}
                Ok(false) => warn!("{} does not look gzip compressed", read_file.display()),
                Err(e) => warn!("Could not inspect {}: {}", read_file.display(), e),
            }
        }
    }

    let pass_dir = working_dir.join(pass.dir_name());
    fs::create_dir(&pass_dir).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => PipelineError::PassDirectoryExists(pass_dir.clone()),
        _ => PipelineError::io(&pass_dir, e),
    })?;

    info!("Running {} alignment with {} as working directory", pass, pass_dir.display());
    if read_files.is_empty() {
        warn!("No '*{}' read files found in {}", star.read_suffix, working_dir.display());
    }

    let invocations: Vec<StarInvocation> = read_files
        .iter()
        .map(|read_file| StarInvocation::new(star, read_file, &sjdb_files))
        .collect();

    let semaphore = Semaphore::new(jobs.max(1));
    let semaphore = &semaphore;
    let pass_dir_ref = &pass_dir;
    let runs = invocations.iter().map(|invocation| async move {
        let _permit = semaphore.acquire().await.map_err(|e| PipelineError::ToolExecution {
            tool: STAR_TAG.to_string(),
            error: e.to_string(),
        })?;
        info!("Aligning {}", invocation.read_file.display());
        debug!("{}", command_line(&invocation.program, &invocation.args));
        let outcome = invocation.run(pass_dir_ref).await?;
        Ok::<InvocationOutcome, PipelineError>(outcome)
    });

    let outcomes = join_all(runs)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    for outcome in &outcomes {
        if outcome.success {
            info!("{} finished", outcome.prefix);
        } else {
            error!("{} failed with exit code {:?}", outcome.prefix, outcome.exit_code);
        }
    }

    Ok(PassReport { pass, pass_dir, outcomes })
}


/// Turns failed invocations into an error unless the run should keep going.
pub fn check_pass(report: &PassReport, keep_going: bool) -> Result<(), PipelineError> {
    let failed = report.failures().len();
    if failed == 0 {
        return Ok(());
    }
    if keep_going {
        warn!("{} of {} invocations failed in the {}; continuing", failed, report.outcomes.len(), report.pass);
        return Ok(());
    }
    Err(PipelineError::PassFailed { pass: report.pass, failed, total: report.outcomes.len() })
}


fn star_config(config: &RunConfig) -> Result<StarConfig, PipelineError> {
    let star = StarConfig::from_args(&config.args, &config.cwd)?;
    if config.args.jobs == 0 {
        return Err(PipelineError::InvalidConfig("--jobs must be at least 1".to_string()));
    }
    if oversubscribed(config.args.jobs, star.threads, config.max_cores) {
        warn!(
            "{} jobs x {} threads exceeds the {} physical cores detected",
            config.args.jobs, star.threads, config.max_cores
        );
    }
    Ok(star)
}


pub async fn first_pass_run(config: Arc<RunConfig>) -> Result<PassReport, PipelineError> {
    println!("\n-------------\n STAR first pass\n-------------\n");
    let star = star_config(&config)?;
    let report = run_aligner(&star, &config.working_dir, None, config.args.jobs).await?;
    check_pass(&report, config.args.keep_going)?;
    Ok(report)
}


pub async fn second_pass_run(config: Arc<RunConfig>) -> Result<PassReport, PipelineError> {
    println!("\n-------------\n STAR second pass\n-------------\n");
    let star = star_config(&config)?;

    let first_pass_dir = config.working_dir.join(FIRST_PASS_DIR);
    if !first_pass_dir.is_dir() {
        return Err(PipelineError::NoJunctions(first_pass_dir));
    }
    let junctions = collect_junctions(&first_pass_dir).await?;
    if junctions.is_empty() {
        return Err(PipelineError::NoJunctions(first_pass_dir));
    }
    info!("Collected {} splice junction files from {}", junctions.len(), first_pass_dir.display());

    let report = run_aligner(&star, &config.working_dir, Some(junctions.as_slice()), config.args.jobs).await?;
    check_pass(&report, config.args.keep_going)?;
    Ok(report)
}


pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    first_pass_run(config.clone()).await?;
    second_pass_run(config).await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(prefix: &str, success: bool) -> InvocationOutcome {
        InvocationOutcome {
            read_file: PathBuf::from(format!("/w/{}.fq.gz", prefix)),
            prefix: prefix.to_string(),
            exit_code: Some(if success { 0 } else { 1 }),
            success,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    #[test]
    fn test_check_pass() {
        let report = PassReport {
            pass: Pass::First,
            pass_dir: PathBuf::from("/w/first_pass"),
            outcomes: vec![outcome("s1", true), outcome("s2", false)],
        };
        assert!(!report.is_success());
        assert_eq!(report.failures().len(), 1);
        assert!(check_pass(&report, true).is_ok());
        match check_pass(&report, false) {
            Err(PipelineError::PassFailed { pass, failed, total }) => {
                assert_eq!(pass, Pass::First);
                assert_eq!(failed, 1);
                assert_eq!(total, 2);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_check_pass_empty_is_ok() {
        let report = PassReport { pass: Pass::Second, pass_dir: PathBuf::from("/w/second_pass"), outcomes: vec![] };
        assert!(report.is_success());
        assert!(check_pass(&report, false).is_ok());
    }

    #[tokio::test]
    async fn test_run_aligner_missing_working_dir() {
        let star = StarConfig {
            star_path: PathBuf::from("STAR"),
            genome_dir: PathBuf::from("/ref"),
            gtf_file: PathBuf::from("/ref/genes.gtf"),
            threads: 1,
            sjdb_overhang: 100,
            sam_attributes: vec!["NH".to_string()],
            sam_type: vec!["SAM".to_string()],
            read_files_command: "zcat".to_string(),
            read_suffix: ".fq.gz".to_string(),
        };
        let result = run_aligner(&star, Path::new("/no/such/working/dir"), None, 1).await;
        assert!(matches!(result, Err(PipelineError::MissingInput { .. })));
    }
}

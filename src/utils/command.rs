/// Functions and structs for building and running aligner command lines

use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use crate::config::defs::STAR_TAG;


pub mod star {
    use std::path::{Path, PathBuf};
    use std::process::Stdio;
    use anyhow::{anyhow, Context};
    use log::{debug, warn};
    use tokio::process::Command;
    use crate::config::defs::{
        PipelineError, StarConfig, STAR_GENOME_DIR, STAR_GTF, STAR_PREFIX, STAR_READS_IN,
        STAR_READ_COMMAND, STAR_SAM_ATTRIBUTES, STAR_SAM_TYPE, STAR_SJDB_FILES,
        STAR_SJDB_OVERHANG, STAR_TAG, STAR_THREADS,
    };
    use crate::utils::file::output_prefix;
    use crate::utils::streams::wait_with_output_lines;

    /// One STAR command line, bound to a single read file.
    #[derive(Debug, Clone, PartialEq)]
    pub struct StarInvocation {
        pub program: PathBuf,
        pub read_file: PathBuf,
        pub prefix: String,
        pub args: Vec<String>,
    }

    /// What came back from running a `StarInvocation`.
    #[derive(Debug, Clone)]
    pub struct InvocationOutcome {
        pub read_file: PathBuf,
        pub prefix: String,
        pub exit_code: Option<i32>,
        pub success: bool,
        pub stdout: Vec<String>,
        pub stderr: Vec<String>,
    }

    /// Runs `STAR --version` and returns the version token.
    ///
    /// A spawn failure keeps the underlying io::Error so callers can tell a
    /// missing binary from one that runs but misbehaves.
    pub async fn star_presence_check(star_path: &Path) -> anyhow::Result<String> {
        let child = Command::new(star_path)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}. Is STAR installed?", star_path.display()))?;

        let output = wait_with_output_lines(child).await?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} --version exited with {}: {}",
                star_path.display(),
                output.status,
                output.stderr.join(" ")
            ));
        }
        let first_line = output
            .stdout
            .iter()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| anyhow!("No output from {} --version", star_path.display()))?;
        let version = first_line
            .split_whitespace()
            .last()
            .ok_or_else(|| anyhow!("Invalid STAR --version output: {}", first_line))?
            .to_string();
        Ok(version)
    }

    /// Builds the STAR argument list for one read file.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated StarConfig; all paths absolute.
    /// * `read_file` - Absolute path of the compressed reads.
    /// * `sjdb_files` - First pass junction tables. Empty for a first pass.
    ///
    /// # Returns
    /// Argument vector, without the program itself.
    pub fn arg_generator(config: &StarConfig, read_file: &Path, sjdb_files: &[PathBuf]) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();

        args_vec.push(STAR_GENOME_DIR.to_string());
        args_vec.push(config.genome_dir.to_string_lossy().to_string());
        args_vec.push(STAR_GTF.to_string());
        args_vec.push(config.gtf_file.to_string_lossy().to_string());
        args_vec.push(STAR_READS_IN.to_string());
        args_vec.push(read_file.to_string_lossy().to_string());
        args_vec.push(STAR_PREFIX.to_string());
        args_vec.push(output_prefix(read_file));

        args_vec.push(STAR_SAM_ATTRIBUTES.to_string());
        args_vec.extend(config.sam_attributes.iter().cloned());
        args_vec.push(STAR_SJDB_OVERHANG.to_string());
        args_vec.push(config.sjdb_overhang.to_string());
        args_vec.push(STAR_SAM_TYPE.to_string());
        args_vec.extend(config.sam_type.iter().cloned());
        args_vec.push(STAR_THREADS.to_string());
        args_vec.push(config.threads.to_string());
        args_vec.push(STAR_READ_COMMAND.to_string());
        args_vec.push(config.read_files_command.clone());

        if !sjdb_files.is_empty() {
            args_vec.push(STAR_SJDB_FILES.to_string());
            args_vec.extend(sjdb_files.iter().map(|p| p.to_string_lossy().to_string()));
        }

        args_vec
    }

    impl StarInvocation {
        pub fn new(config: &StarConfig, read_file: &Path, sjdb_files: &[PathBuf]) -> Self {
            StarInvocation {
                program: config.star_path.clone(),
                read_file: read_file.to_path_buf(),
                prefix: output_prefix(read_file),
                args: arg_generator(config, read_file, sjdb_files),
            }
        }

        /// Runs STAR to completion inside `cwd`.
        ///
        /// A non-zero exit is not an error here; it is recorded in the outcome.
        /// Failing to spawn the program is.
        pub async fn run(&self, cwd: &Path) -> Result<InvocationOutcome, PipelineError> {
            debug!("{} {} (cwd {})", self.program.display(), self.args.join(" "), cwd.display());

            let child = Command::new(&self.program)
                .args(&self.args)
                .current_dir(cwd)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| PipelineError::ToolExecution {
                    tool: STAR_TAG.to_string(),
                    error: format!("failed to spawn {}: {}", self.program.display(), e),
                })?;

            let output = wait_with_output_lines(child)
                .await
                .map_err(|e| PipelineError::ToolExecution {
                    tool: STAR_TAG.to_string(),
                    error: e.to_string(),
                })?;

            for line in &output.stdout {
                debug!("[{}] {}", self.prefix, line);
            }
            let success = output.status.success();
            if !success {
                for line in &output.stderr {
                    warn!("[{}] {}", self.prefix, line);
                }
            }

            Ok(InvocationOutcome {
                read_file: self.read_file.clone(),
                prefix: self.prefix.clone(),
                exit_code: output.status.code(),
                success,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }
}


pub async fn check_version(tool: &str, program: &Path) -> Result<String> {
    let version = match tool {
        STAR_TAG => star::star_presence_check(program).await,
        _ => return Err(anyhow!("Unknown tool: {}", tool)),
    };
    Ok(version?)
}


/// Full command line for logging, program first.
pub fn command_line(program: &PathBuf, args: &[String]) -> String {
    let mut parts = vec![program.to_string_lossy().to_string()];
    parts.extend(args.iter().cloned());
    parts.join(" ")
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::star::{arg_generator, StarInvocation};
    use crate::config::defs::StarConfig;

    fn star_config() -> StarConfig {
        StarConfig {
            star_path: PathBuf::from("/opt/STAR/STAR"),
            genome_dir: PathBuf::from("/ref/Mm_m38/STAR_ix"),
            gtf_file: PathBuf::from("/ref/Mm_m38/genes.gtf"),
            threads: 10,
            sjdb_overhang: 100,
            sam_attributes: vec!["NH", "HI", "AS", "nM", "XS"].into_iter().map(String::from).collect(),
            sam_type: vec!["BAM".to_string(), "SortedByCoordinate".to_string()],
            read_files_command: "zcat".to_string(),
            read_suffix: ".fq.gz".to_string(),
        }
    }

    #[test]
    fn test_arg_generator_first_pass() {
        let args = arg_generator(&star_config(), Path::new("/data/s1.R1.fq.gz"), &[]);
        let expected: Vec<String> = vec![
            "--genomeDir", "/ref/Mm_m38/STAR_ix",
            "--sjdbGTFfile", "/ref/Mm_m38/genes.gtf",
            "--readFilesIn", "/data/s1.R1.fq.gz",
            "--outFileNamePrefix", "s1",
            "--outSAMattributes", "NH", "HI", "AS", "nM", "XS",
            "--sjdbOverhang", "100",
            "--outSAMtype", "BAM", "SortedByCoordinate",
            "--runThreadN", "10",
            "--readFilesCommand", "zcat",
        ].into_iter().map(String::from).collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_arg_generator_second_pass_appends_junctions() {
        let sjdb = vec![
            PathBuf::from("/w/first_pass/s1SJ.out.tab"),
            PathBuf::from("/w/first_pass/s2SJ.out.tab"),
        ];
        let args = arg_generator(&star_config(), Path::new("/data/s1.fq.gz"), &sjdb);
        let tail: Vec<&str> = args[args.len() - 3..].iter().map(|s| s.as_str()).collect();
        assert_eq!(tail, vec!["--sjdbFileChrStartEnd", "/w/first_pass/s1SJ.out.tab", "/w/first_pass/s2SJ.out.tab"]);
    }

    #[test]
    fn test_invocation_prefix_and_command_line() {
        let invocation = StarInvocation::new(&star_config(), Path::new("/data/mouse_liver.fq.gz"), &[]);
        assert_eq!(invocation.prefix, "mouse_liver");
        let line = command_line(&invocation.program, &invocation.args);
        assert!(line.starts_with("/opt/STAR/STAR --genomeDir /ref/Mm_m38/STAR_ix"));
    }

    #[tokio::test]
    async fn test_check_version_unknown_tool() {
        assert!(check_version("bowtie2", Path::new("bowtie2")).await.is_err());
    }
}

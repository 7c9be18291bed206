use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::cli::Arguments;

// External software
pub const STAR_TAG: &str = "STAR";
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

// STAR flags
pub const STAR_GENOME_DIR: &str = "--genomeDir";
pub const STAR_GTF: &str = "--sjdbGTFfile";
pub const STAR_READS_IN: &str = "--readFilesIn";
pub const STAR_PREFIX: &str = "--outFileNamePrefix";
pub const STAR_SAM_ATTRIBUTES: &str = "--outSAMattributes";
pub const STAR_SJDB_OVERHANG: &str = "--sjdbOverhang";
pub const STAR_SAM_TYPE: &str = "--outSAMtype";
pub const STAR_THREADS: &str = "--runThreadN";
pub const STAR_READ_COMMAND: &str = "--readFilesCommand";
pub const STAR_SJDB_FILES: &str = "--sjdbFileChrStartEnd";

// Static Filenames
pub const FIRST_PASS_DIR: &str = "first_pass";
pub const SECOND_PASS_DIR: &str = "second_pass";
pub const SJ_SUFFIX: &str = "SJ.out.tab";
pub const REPORT_SUFFIX: &str = "final.out";
pub const REPORT_KEY_SUFFIX: &str = "Log.final.out";
pub const SUMMARY_PLOT: &str = "star_alignment_summary.png";
pub const SUMMARY_TABLE: &str = "star_alignment_summary.tsv";
pub const MISSING_VALUE: &str = "NA";

// Report fields
pub const GENERAL_FIELDS: &[&'static str] = &[
    "Number of input reads",
    "Uniquely mapped reads %",
    "% of reads mapped to multiple loci",
    "% of reads mapped to too many loci",
];
pub const SPLICE_FIELDS: &[&'static str] = &[
    "Number of splices: Total",
    "Number of splices: GT/AG",
    "Number of splices: GC/AG",
    "Number of splices: AT/AC",
    "Number of splices: Non-canonical",
];


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    First,
    Second,
}

impl Pass {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Pass::First => FIRST_PASS_DIR,
            Pass::Second => SECOND_PASS_DIR,
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::First => write!(f, "first pass"),
            Pass::Second => write!(f, "second pass"),
        }
    }
}


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing {what}: {path}")]
    MissingInput { what: String, path: PathBuf },

    #[error("Pass directory already exists: {0}")]
    PassDirectoryExists(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Tool execution failed for {tool}: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("{failed} of {total} invocations failed in the {pass}")]
    PassFailed { pass: Pass, failed: usize, total: usize },

    #[error("No splice junction files found under {0}")]
    NoJunctions(PathBuf),

    #[error("No report files found under {0}")]
    NoReports(PathBuf),

    #[error("None of the requested fields were found in the reports under {0}")]
    NoFields(PathBuf),

    #[error("Malformed report {path} line {line}: '{field}' matched but no '|' delimiter")]
    MalformedReport { path: PathBuf, line: usize, field: String },

    #[error("Missing value for field '{field}' in sample '{sample}'")]
    MissingValue { field: String, sample: String },

    #[error("Non-numeric value '{value}' for field '{field}' in sample '{sample}'")]
    NonNumericValue { field: String, sample: String, value: String },

    #[error("Plotting failed: {0}")]
    Plot(String),

    #[error("Table export failed: {0}")]
    Table(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io { path: path.into(), source }
    }

    pub fn missing(what: &str, path: impl Into<PathBuf>) -> Self {
        PipelineError::MissingInput { what: what.to_string(), path: path.into() }
    }
}


/// Everything STAR needs that is organism or environment specific.
/// Built from `Arguments` by `StarConfig::from_args`, which makes the paths
/// absolute since each invocation runs inside its pass directory.
#[derive(Debug, Clone, PartialEq)]
pub struct StarConfig {
    pub star_path: PathBuf,
    pub genome_dir: PathBuf,
    pub gtf_file: PathBuf,
    pub threads: usize,
    pub sjdb_overhang: usize,
    pub sam_attributes: Vec<String>,
    pub sam_type: Vec<String>,
    pub read_files_command: String,
    pub read_suffix: String,
}

impl StarConfig {
    pub fn from_args(args: &Arguments, cwd: &PathBuf) -> Result<Self, PipelineError> {
        let genome_dir = args.genome_dir.as_ref()
            .ok_or_else(|| PipelineError::InvalidConfig("--genome-dir is required for alignment".to_string()))?;
        let gtf_file = args.gtf.as_ref()
            .ok_or_else(|| PipelineError::InvalidConfig("--gtf is required for alignment".to_string()))?;

        if args.threads == 0 {
            return Err(PipelineError::InvalidConfig("--threads must be at least 1".to_string()));
        }
        if args.sam_attributes.is_empty() || args.sam_type.is_empty() {
            return Err(PipelineError::InvalidConfig("--sam-attributes and --sam-type need at least one value".to_string()));
        }
        if args.read_suffix.is_empty() {
            return Err(PipelineError::InvalidConfig("--read-suffix must not be empty".to_string()));
        }

        let genome_dir = absolute_path(genome_dir, cwd);
        if !genome_dir.is_dir() {
            return Err(PipelineError::missing("genome index directory", genome_dir));
        }
        let gtf_file = absolute_path(gtf_file, cwd);
        if !gtf_file.is_file() {
            return Err(PipelineError::missing("annotation file", gtf_file));
        }

        // Bare names are left for PATH lookup at spawn time
        let star_path = PathBuf::from(&args.star);
        let star_path = if star_path.components().count() > 1 {
            let star_path = absolute_path(&args.star, cwd);
            if !star_path.is_file() {
                return Err(PipelineError::missing("aligner executable", star_path));
            }
            star_path
        } else {
            star_path
        };

        Ok(StarConfig {
            star_path,
            genome_dir,
            gtf_file,
            threads: args.threads,
            sjdb_overhang: args.sjdb_overhang,
            sam_attributes: args.sam_attributes.clone(),
            sam_type: args.sam_type.clone(),
            read_files_command: args.read_files_command.clone(),
            read_suffix: args.read_suffix.clone(),
        })
    }
}


pub struct RunConfig {
    pub cwd: PathBuf,
    pub working_dir: PathBuf,
    pub report_dir: PathBuf,
    pub args: Arguments,
    pub max_cores: usize,
}


/// Resolves `path` against `base` when it is relative.
pub fn absolute_path(path: impl AsRef<Path>, base: &Path) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

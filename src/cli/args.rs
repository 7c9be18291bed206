use clap::{Parser, ValueEnum};
use crate::config::defs::{GENERAL_FIELDS, SPLICE_FIELDS, STAR_TAG};

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum FieldGroup {
    General,
    Splice,
    #[default]
    All,
}

impl FieldGroup {
    pub fn labels(&self) -> Vec<String> {
        let labels: Vec<&str> = match self {
            FieldGroup::General => GENERAL_FIELDS.to_vec(),
            FieldGroup::Splice => SPLICE_FIELDS.to_vec(),
            FieldGroup::All => GENERAL_FIELDS.iter().chain(SPLICE_FIELDS.iter()).copied().collect(),
        };
        labels.into_iter().map(String::from).collect()
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "star-twopass-pipelines", version, about = "Two-pass STAR alignment runner and Log.final.out report plotter")]
pub struct Arguments {

    #[arg(short, long, help = "One of: first_pass, second_pass, two_pass, report, full")]
    pub module: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(short = 'w', long = "working-dir", help = "Directory holding the read files and the pass directories. Defaults to the current directory.")]
    pub working_dir: Option<String>,

    #[arg(long, default_value = STAR_TAG, help = "STAR executable, looked up on PATH when given as a bare name")]
    pub star: String,

    #[arg(short = 'g', long = "genome-dir")]
    pub genome_dir: Option<String>,

    #[arg(short = 'a', long = "gtf")]
    pub gtf: Option<String>,

    #[arg(long, default_value_t = 10)]
    pub threads: usize,

    #[arg(long, default_value_t = 100)]
    pub sjdb_overhang: usize,

    #[arg(long, value_delimiter = ',', default_value = "NH,HI,AS,nM,XS")]
    pub sam_attributes: Vec<String>,

    #[arg(long, value_delimiter = ',', default_value = "BAM,SortedByCoordinate")]
    pub sam_type: Vec<String>,

    #[arg(long, default_value = "zcat")]
    pub read_files_command: String,

    #[arg(long, default_value = ".fq.gz")]
    pub read_suffix: String,

    #[arg(long, default_value_t = 1, help = "Maximum concurrent STAR invocations within one pass")]
    pub jobs: usize,

    #[arg(long, default_value_t = false, help = "Continue after failed STAR invocations instead of aborting")]
    pub keep_going: bool,

    #[arg(short = 'r', long = "report-dir", help = "Root directory searched for *final.out reports. Defaults to the working directory.")]
    pub report_dir: Option<String>,

    #[arg(long = "fields", default_value = "all", value_enum)]
    pub fields: FieldGroup,

    #[arg(long, help = "Output figure (.png or .svg). Defaults to star_alignment_summary.png in the report directory.")]
    pub plot: Option<String>,

    #[arg(long, help = "Output TSV table. Defaults to star_alignment_summary.tsv in the report directory.")]
    pub table: Option<String>,
}

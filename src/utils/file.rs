use std::path::{Path, PathBuf};
use glob::{glob, Pattern};
use log::{debug, warn};
use tokio::fs;
use tokio::task;
use tokio::io::AsyncReadExt;
use crate::config::defs::{PipelineError, GZIP_MAGIC, REPORT_KEY_SUFFIX};


/// Checks the first two bytes of a file for the gzip magic number.
pub async fn is_gzipped(path: &Path) -> std::io::Result<bool> {
    let mut file = fs::File::open(path).await?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer).await {
        Ok(_) => Ok(buffer == GZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}


/// Lists files whose name ends with `suffix`.
///
/// # Arguments
///
/// * `root` - Directory to search.
/// * `suffix` - Literal suffix of the file name; glob metacharacters are escaped.
/// * `recursive` - Match `root/**/*suffix` instead of `root/*suffix`.
///
/// # Returns
/// Matching paths, sorted. An empty Vec when nothing matches.
/// A missing or unreadable `root` is an error; unreadable entries below it are skipped with a warning.
pub async fn find_files_with_suffix(root: &Path, suffix: &str, recursive: bool) -> Result<Vec<PathBuf>, PipelineError> {
    let metadata = fs::metadata(root).await.map_err(|e| PipelineError::io(root, e))?;
    if !metadata.is_dir() {
        return Err(PipelineError::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
        ));
    }

    let base = Pattern::escape(&root.to_string_lossy());
    let pattern = if recursive {
        format!("{}/**/*{}", base, Pattern::escape(suffix))
    } else {
        format!("{}/*{}", base, Pattern::escape(suffix))
    };

    let found = task::spawn_blocking(move || -> Result<Vec<PathBuf>, PipelineError> {
        let entries = glob(&pattern)
            .map_err(|e| PipelineError::InvalidConfig(format!("bad file pattern '{}': {}", pattern, e)))?;
        let mut found = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if !path.is_dir() => found.push(path),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable path {}: {}", e.path().display(), e.error()),
            }
        }
        found.sort();
        Ok(found)
    })
        .await
        .map_err(|e| PipelineError::io(root, std::io::Error::other(e)))??;

    debug!("Found {} '*{}' files under {}", found.len(), suffix, root.display());
    Ok(found)
}


/// STAR output prefix for a read file: the file name up to its first '.'.
/// `/data/sampleA.R1.fq.gz` gives `sampleA`.
pub fn output_prefix(read_file: &Path) -> String {
    let file_name = read_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.split_once('.') {
        Some((prefix, _)) => prefix.to_string(),
        None => file_name,
    }
}


/// Key identifying a report as `<pass dir>/<sample>`.
///
/// The file name loses a trailing `Log.final.out` and nothing else, so STAR's
/// `sampleX.Log.final.out` keeps its dot: `first_pass/sampleX.Log.final.out`
/// gives `first_pass/sampleX.`. A report with no parent directory yields only
/// the stripped file name.
pub fn sample_key(report: &Path) -> String {
    let file_name = report
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sample = file_name.strip_suffix(REPORT_KEY_SUFFIX).unwrap_or(&file_name);

    match report.parent().and_then(|parent| parent.file_name()) {
        Some(pass) => format!("{}/{}", pass.to_string_lossy(), sample),
        None => sample.to_string(),
    }
}


/// Splits a sample key into (pass, sample) on its first '/'.
/// A key without a '/' has an empty pass.
pub fn split_sample_key(key: &str) -> (&str, &str) {
    match key.split_once('/') {
        Some((pass, sample)) => (pass, sample),
        None => ("", key),
    }
}

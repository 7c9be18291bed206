use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::info;
use tokio::task;
use crate::config::defs::{absolute_path, PipelineError, RunConfig, REPORT_SUFFIX, SUMMARY_PLOT, SUMMARY_TABLE};
use crate::utils::file::find_files_with_suffix;
use crate::utils::plotting::plot_merged_dataset;
use crate::cli::FieldGroup;
use crate::utils::report::{merge_reports, parse_reports, write_summary_table, FieldPatterns, MergedDataset, DEFAULT_PATTERNS};


/// All `*final.out` reports below `root`, sorted.
pub async fn discover_reports(root: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    find_files_with_suffix(root, REPORT_SUFFIX, true).await
}


/// Compiled patterns for a field group; the full group reuses the built-in set.
pub fn field_patterns(group: FieldGroup) -> Result<Cow<'static, FieldPatterns>, PipelineError> {
    match group {
        FieldGroup::All => Ok(Cow::Borrowed(&*DEFAULT_PATTERNS)),
        other => Ok(Cow::Owned(FieldPatterns::new(&other.labels())?)),
    }
}


/// Parses and merges already discovered reports.
pub async fn build_dataset(reports: &[PathBuf], patterns: &FieldPatterns) -> Result<MergedDataset, PipelineError> {
    let parsed = parse_reports(reports, patterns).await?;
    Ok(merge_reports(&parsed, patterns.labels()))
}


/// Discovery, parsing and merging in one step.
///
/// # Arguments
///
/// * `root` - Directory searched recursively for reports.
/// * `patterns` - Field patterns to extract.
///
/// # Returns
/// MergedDataset; empty when no reports exist.
pub async fn collect_dataset(root: &Path, patterns: &FieldPatterns) -> Result<MergedDataset, PipelineError> {
    let reports = discover_reports(root).await?;
    info!("Found {} report files under {}", reports.len(), root.display());
    build_dataset(&reports, patterns).await
}


pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    println!("\n-------------\n Alignment report\n-------------\n");

    let root = &config.report_dir;
    let reports = discover_reports(root).await?;
    if reports.is_empty() {
        return Err(PipelineError::NoReports(root.clone()));
    }
    info!("Found {} report files under {}", reports.len(), root.display());

    let patterns = field_patterns(config.args.fields)?;
    let dataset = build_dataset(&reports, &patterns).await?;
    if dataset.is_empty() {
        return Err(PipelineError::NoFields(root.clone()));
    }
    info!("Merged {} fields across {} samples", dataset.len(), dataset.samples().len());

    let table_path = match &config.args.table {
        Some(path) => absolute_path(path, &config.cwd),
        None => root.join(SUMMARY_TABLE),
    };
    let plot_path = match &config.args.plot {
        Some(path) => absolute_path(path, &config.cwd),
        None => root.join(SUMMARY_PLOT),
    };

    task::spawn_blocking(move || -> Result<(), PipelineError> {
        write_summary_table(&dataset, &table_path)?;
        info!("Wrote summary table to {}", table_path.display());
        plot_merged_dataset(&dataset, &plot_path)?;
        info!("Wrote summary figure to {}", plot_path.display());
        Ok(())
    })
        .await
        .map_err(|e| PipelineError::Plot(e.to_string()))??;

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_patterns_per_group() -> anyhow::Result<()> {
        let all = field_patterns(FieldGroup::All)?;
        assert!(matches!(all, Cow::Borrowed(_)));
        assert_eq!(all.labels().collect::<Vec<_>>(), DEFAULT_PATTERNS.labels().collect::<Vec<_>>());

        let general = field_patterns(FieldGroup::General)?;
        assert_eq!(general.len(), 4);
        assert_eq!(general.labels().next(), Some("Number of input reads"));
        Ok(())
    }
}

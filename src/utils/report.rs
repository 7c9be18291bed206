/// Extraction of labelled fields from STAR `Log.final.out` reports,
/// and reshaping them into per-field tables.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use crate::config::defs::{PipelineError, GENERAL_FIELDS, MISSING_VALUE, SPLICE_FIELDS};
use crate::utils::file::sample_key;


lazy_static! {
    pub static ref DEFAULT_PATTERNS: FieldPatterns = {
        let labels: Vec<String> = GENERAL_FIELDS
            .iter()
            .chain(SPLICE_FIELDS.iter())
            .map(|label| label.to_string())
            .collect();
        FieldPatterns::new(&labels).expect("built-in field patterns compile")
    };
}

/// Field label -> raw value, for one report.
pub type FieldMap = HashMap<String, String>;

/// Sample key -> FieldMap.
pub type ParsedReports = BTreeMap<String, FieldMap>;


/// Field labels compiled for line searching. The label doubles as the field name.
#[derive(Debug, Clone)]
pub struct FieldPatterns {
    patterns: Vec<(String, Regex)>,
}

impl FieldPatterns {
    pub fn new(labels: &[String]) -> Result<Self, PipelineError> {
        let patterns = labels
            .iter()
            .map(|label| {
                Regex::new(label)
                    .map(|re| (label.clone(), re))
                    .map_err(|e| PipelineError::InvalidConfig(format!("bad field pattern '{}': {}", label, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FieldPatterns { patterns })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(label, _)| label.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}


/// Value of a `<label> | <value>` line: the text between the first and the
/// next '|', trimmed, with every '%' removed. None when the line has no '|'.
pub fn extract_value(line: &str) -> Option<String> {
    line.split('|')
        .nth(1)
        .map(|value| value.trim().replace('%', ""))
}


/// Scans one report and pulls out every field whose pattern matches a line.
///
/// Searching is unanchored. When several lines match the same pattern, the
/// last one wins. Fields that never match are simply absent.
///
/// # Arguments
///
/// * `path` - Report file.
/// * `patterns` - Compiled field labels.
///
/// # Returns
/// FieldMap of label to text value (percent signs stripped).
pub async fn parse_report(path: &Path, patterns: &FieldPatterns) -> Result<FieldMap, PipelineError> {
    let file = File::open(path).await.map_err(|e| PipelineError::io(path, e))?;
    let mut lines = BufReader::new(file).lines();
    let mut fields = FieldMap::new();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await.map_err(|e| PipelineError::io(path, e))? {
        line_number += 1;
        for (label, re) in &patterns.patterns {
            if !re.is_match(&line) {
                continue;
            }
            let value = extract_value(&line).ok_or_else(|| PipelineError::MalformedReport {
                path: path.to_path_buf(),
                line: line_number,
                field: label.clone(),
            })?;
            fields.insert(label.clone(), value);
        }
    }

    debug!("Parsed {} of {} fields from {}", fields.len(), patterns.len(), path.display());
    Ok(fields)
}


/// Parses every report, keyed by `sample_key`.
///
/// Reports are visited in the given order; on a key collision the later
/// report replaces the earlier one.
pub async fn parse_reports(paths: &[PathBuf], patterns: &FieldPatterns) -> Result<ParsedReports, PipelineError> {
    let mut reports = ParsedReports::new();
    for path in paths {
        let key = sample_key(path);
        let fields = parse_report(path, patterns).await?;
        if reports.insert(key.clone(), fields).is_some() {
            warn!("Sample key '{}' seen more than once; keeping {}", key, path.display());
        }
    }
    Ok(reports)
}


/// Per-field view of a set of parsed reports: field -> (sample key -> value).
///
/// Every field lists every sample. A sample whose report lacked the field maps
/// to None.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedDataset {
    entries: Vec<(String, BTreeMap<String, Option<String>>)>,
}

impl MergedDataset {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(field, _)| field.as_str())
    }

    pub fn get(&self, field: &str) -> Option<&BTreeMap<String, Option<String>>> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, samples)| samples)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Option<String>>)> {
        self.entries.iter().map(|(field, samples)| (field.as_str(), samples))
    }

    /// Sample keys, sorted. Identical for every field.
    pub fn samples(&self) -> Vec<&str> {
        self.entries
            .first()
            .map(|(_, samples)| samples.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default()
    }
}


/// Transposes sample -> field into field -> sample over the union of fields.
///
/// # Arguments
///
/// * `reports` - Output of `parse_reports`.
/// * `field_order` - Preferred field order; fields not listed follow in the
///   order they are first seen.
///
/// # Returns
/// MergedDataset with one entry per field present in any report.
pub fn merge_reports<'a>(reports: &ParsedReports, field_order: impl IntoIterator<Item = &'a str>) -> MergedDataset {
    let mut fields: Vec<String> = Vec::new();
    for field in field_order {
        if reports.values().any(|map| map.contains_key(field)) && !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
    }
    for map in reports.values() {
        let mut extra: Vec<&String> = map.keys().filter(|k| !fields.contains(*k)).collect();
        extra.sort();
        fields.extend(extra.into_iter().cloned());
    }

    let entries = fields
        .into_iter()
        .map(|field| {
            let samples = reports
                .iter()
                .map(|(sample, map)| (sample.clone(), map.get(&field).cloned()))
                .collect();
            (field, samples)
        })
        .collect();

    MergedDataset { entries }
}


/// Writes the dataset as TSV: a `sample` column, then one column per field.
/// Absent values are written as `NA`.
pub fn write_summary_table(dataset: &MergedDataset, out_path: &Path) -> Result<(), PipelineError> {
    let table_err = |e: csv::Error| PipelineError::Table(format!("{}: {}", out_path.display(), e));

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(out_path)
        .map_err(table_err)?;

    let mut header = vec!["sample"];
    header.extend(dataset.fields());
    writer.write_record(&header).map_err(table_err)?;

    for sample in dataset.samples() {
        let mut row = vec![sample.to_string()];
        for (_, values) in dataset.iter() {
            let value = values
                .get(sample)
                .and_then(|v| v.clone())
                .unwrap_or_else(|| MISSING_VALUE.to_string());
            row.push(value);
        }
        writer.write_record(&row).map_err(table_err)?;
    }

    writer.flush().map_err(|e| PipelineError::io(out_path, e))?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const REPORT: &str = "                                 Started job on |\tJun 04 10:12:01
                          Number of input reads |\t20000000
                      Average input read length |\t150
                                    UNIQUE READS:
                   Uniquely mapped reads number |\t18500000
                        Uniquely mapped reads % |\t92.50%
                       Number of splices: Total |\t9000000
            Number of splices: Annotated (sjdb) |\t8900000
                       Number of splices: GT/AG |\t8900000
                       Number of splices: GC/AG |\t70000
                       Number of splices: AT/AC |\t9000
               Number of splices: Non-canonical |\t21000
                                MULTI-MAPPING READS:
        Number of reads mapped to multiple loci |\t900000
             % of reads mapped to multiple loci |\t4.50%
        Number of reads mapped to too many loci |\t10000
             % of reads mapped to too many loci |\t0.05%
";

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn report_file(contents: &str) -> std::io::Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(contents.as_bytes())?;
        tmp.flush()?;
        Ok(tmp)
    }

    #[test]
    fn test_extract_value() {
        assert_eq!(extract_value("Number of input reads |  20000000"), Some("20000000".to_string()));
        assert_eq!(extract_value("Uniquely mapped reads % |  92.50%"), Some("92.50".to_string()));
        assert_eq!(extract_value("a | b | c"), Some("b".to_string()));
        assert_eq!(extract_value("UNIQUE READS:"), None);
    }

    #[tokio::test]
    async fn test_parse_report_all_fields() -> anyhow::Result<()> {
        let tmp = report_file(REPORT)?;
        let fields = parse_report(tmp.path(), &DEFAULT_PATTERNS).await?;

        assert_eq!(fields.len(), 9);
        assert_eq!(fields["Number of input reads"], "20000000");
        assert_eq!(fields["Uniquely mapped reads %"], "92.50");
        assert_eq!(fields["% of reads mapped to multiple loci"], "4.50");
        assert_eq!(fields["% of reads mapped to too many loci"], "0.05");
        assert_eq!(fields["Number of splices: Total"], "9000000");
        assert_eq!(fields["Number of splices: Non-canonical"], "21000");
        Ok(())
    }

    #[tokio::test]
    async fn test_parse_report_last_match_wins_and_missing_is_absent() -> anyhow::Result<()> {
        let tmp = report_file("Number of input reads | 10\nNumber of input reads | 20\n")?;
        let patterns = FieldPatterns::new(&labels(&["Number of input reads", "Uniquely mapped reads %"]))?;
        let fields = parse_report(tmp.path(), &patterns).await?;
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["Number of input reads"], "20");
        Ok(())
    }

    #[tokio::test]
    async fn test_parse_report_malformed_line() -> anyhow::Result<()> {
        let tmp = report_file("header\nNumber of input reads 20\n")?;
        let patterns = FieldPatterns::new(&labels(&["Number of input reads"]))?;
        match parse_report(tmp.path(), &patterns).await {
            Err(PipelineError::MalformedReport { line, field, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(field, "Number of input reads");
            }
            other => panic!("unexpected result {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_parse_report_missing_file() {
        let result = parse_report(Path::new("/no/such/Log.final.out"), &DEFAULT_PATTERNS).await;
        assert!(matches!(result, Err(PipelineError::Io { .. })));
    }

    #[test]
    fn test_field_patterns_reject_bad_regex() {
        assert!(matches!(FieldPatterns::new(&labels(&["(unclosed"])), Err(PipelineError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_parse_reports_keys() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let first = tmp.path().join("first_pass");
        std::fs::create_dir(&first)?;
        let path = first.join("sampleX.Log.final.out");
        std::fs::write(&path, REPORT)?;

        let reports = parse_reports(&[path], &DEFAULT_PATTERNS).await?;
        assert_eq!(reports.keys().collect::<Vec<_>>(), vec!["first_pass/sampleX."]);
        Ok(())
    }

    #[test]
    fn test_merge_reports_transposes() {
        let mut reports = ParsedReports::new();
        reports.insert("s1".to_string(), FieldMap::from([("A".to_string(), "1".to_string()), ("B".to_string(), "2".to_string())]));
        reports.insert("s2".to_string(), FieldMap::from([("A".to_string(), "3".to_string()), ("B".to_string(), "4".to_string())]));

        let merged = merge_reports(&reports, ["A", "B"]);
        assert_eq!(merged.fields().collect::<Vec<_>>(), vec!["A", "B"]);
        let a = merged.get("A").unwrap();
        assert_eq!(a["s1"], Some("1".to_string()));
        assert_eq!(a["s2"], Some("3".to_string()));
        let b = merged.get("B").unwrap();
        assert_eq!(b["s1"], Some("2".to_string()));
        assert_eq!(b["s2"], Some("4".to_string()));
    }

    #[test]
    fn test_merge_reports_union_of_fields() {
        let mut reports = ParsedReports::new();
        reports.insert("s1".to_string(), FieldMap::from([("A".to_string(), "1".to_string())]));
        reports.insert("s2".to_string(), FieldMap::from([("A".to_string(), "3".to_string()), ("C".to_string(), "9".to_string())]));

        let merged = merge_reports(&reports, ["A"]);
        assert_eq!(merged.fields().collect::<Vec<_>>(), vec!["A", "C"]);
        let c = merged.get("C").unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c["s1"], None);
        assert_eq!(c["s2"], Some("9".to_string()));
    }

    #[test]
    fn test_merge_reports_empty() {
        let merged = merge_reports(&ParsedReports::new(), DEFAULT_PATTERNS.labels());
        assert!(merged.is_empty());
        assert!(merged.samples().is_empty());
    }

    #[test]
    fn test_write_summary_table() -> anyhow::Result<()> {
        let mut reports = ParsedReports::new();
        reports.insert("first_pass/s1".to_string(), FieldMap::from([("A".to_string(), "1".to_string())]));
        reports.insert("second_pass/s1".to_string(), FieldMap::from([("A".to_string(), "2".to_string()), ("B".to_string(), "7".to_string())]));
        let merged = merge_reports(&reports, ["A", "B"]);

        let tmp = TempDir::new()?;
        let out = tmp.path().join("summary.tsv");
        write_summary_table(&merged, &out)?;

        let text = std::fs::read_to_string(&out)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["sample\tA\tB", "first_pass/s1\t1\tNA", "second_pass/s1\t2\t7"]);
        Ok(())
    }
}

//! Reportable-finding export.
//!
//! Only ERROR findings are exported. Order follows the aggregated set, with
//! exact duplicates collapsed onto their first occurrence. Every file is
//! written next to its destination and renamed into place.
//!
//! The tabular report is plain CSV, which has no cell styling, so ERROR rows
//! are not highlighted. The `severity` column carries the same signal for
//! spreadsheet conditional formatting, and every exported row is ERROR.
use crate::error::PipelineError;
use crate::model::{AggregatedResultSet, EnrichedFinding, Severity};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Where and how to export one run.
pub struct ExportTarget<'a> {
    pub report_dir: &'a Path,
    pub cluster_name: &'a str,
    pub emit_json: bool,
}

impl ExportTarget<'_> {
    pub fn tabular_path(&self) -> PathBuf {
        self.report_dir
            .join(format!("{}-audit-report.csv", file_stem(self.cluster_name)))
    }

    pub fn json_path(&self) -> PathBuf {
        self.report_dir
            .join(format!("{}-audit-report.json", file_stem(self.cluster_name)))
    }

    pub fn assertions_path(&self) -> PathBuf {
        self.report_dir
            .join(format!("{}-assertions.xml", file_stem(self.cluster_name)))
    }
}

/// Paths written by [`export`].
#[derive(Debug)]
pub struct ExportSummary {
    pub tabular_report: PathBuf,
    pub json_report: Option<PathBuf>,
    pub rows: usize,
}

#[derive(Serialize)]
struct ReportRow<'a> {
    cluster: &'a str,
    namespace: &'a str,
    workload: &'a str,
    rule_id: &'a str,
    severity: Severity,
    auditor: Option<&'a str>,
    details: Option<&'a str>,
    description: Option<&'a str>,
    auditor_docs: Option<&'a str>,
    benchmark_id: Option<&'a str>,
    benchmark_url: Option<&'a str>,
    source: &'a str,
    message_defects: String,
}

impl<'a> From<&'a EnrichedFinding> for ReportRow<'a> {
    fn from(finding: &'a EnrichedFinding) -> Self {
        ReportRow {
            cluster: &finding.cluster_name,
            namespace: &finding.namespace,
            workload: &finding.workload_name,
            rule_id: &finding.finding.rule_id,
            severity: finding.finding.severity,
            auditor: finding.finding.auditor_name.as_deref(),
            details: finding.finding.detail_text.as_deref(),
            description: finding.finding.description_text.as_deref(),
            auditor_docs: finding.finding.documentation_url.as_deref(),
            benchmark_id: finding.benchmark_id.as_deref(),
            benchmark_url: finding.benchmark_url.as_deref(),
            source: &finding.finding.source_artifact_path,
            message_defects: finding.finding.message_defects.join("; "),
        }
    }
}

/// ERROR findings in aggregated order with exact duplicates removed.
pub fn reportable(results: &AggregatedResultSet) -> Vec<&EnrichedFinding> {
    let mut seen = HashSet::new();
    results
        .findings()
        .iter()
        .filter(|finding| finding.severity() == Severity::Error)
        .filter(|finding| seen.insert(*finding))
        .collect()
}

/// Write the tabular report and, when requested, the JSON report.
pub fn export(
    findings: &[&EnrichedFinding],
    target: &ExportTarget<'_>,
) -> Result<ExportSummary, PipelineError> {
    let tabular_report = target.tabular_path();
    let tabular = render_tabular(findings).map_err(|reason| PipelineError::Export {
        path: tabular_report.clone(),
        reason,
    })?;
    write_replacing(&tabular_report, &tabular)?;

    let json_report = if target.emit_json {
        let path = target.json_path();
        let bytes = serde_json::to_vec_pretty(findings).map_err(|err| PipelineError::Export {
            path: path.clone(),
            reason: format!("serialize JSON report: {err}"),
        })?;
        write_replacing(&path, &bytes)?;
        Some(path)
    } else {
        None
    };

    Ok(ExportSummary {
        tabular_report,
        json_report,
        rows: findings.len(),
    })
}

fn render_tabular(findings: &[&EnrichedFinding]) -> Result<Vec<u8>, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if findings.is_empty() {
        writer
            .write_record(HEADER)
            .map_err(|err| format!("write CSV header: {err}"))?;
    }
    for finding in findings {
        writer
            .serialize(ReportRow::from(*finding))
            .map_err(|err| format!("write CSV row: {err}"))?;
    }
    writer
        .into_inner()
        .map_err(|err| format!("flush CSV: {err}"))
}

const HEADER: [&str; 13] = [
    "cluster",
    "namespace",
    "workload",
    "rule_id",
    "severity",
    "auditor",
    "details",
    "description",
    "auditor_docs",
    "benchmark_id",
    "benchmark_url",
    "source",
    "message_defects",
];

/// Write `bytes` to a temp sibling of `dest` and rename it over `dest`.
pub(crate) fn write_replacing(dest: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let export_error = |reason: String| PipelineError::Export {
        path: dest.to_path_buf(),
        reason,
    };
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .map_err(|err| export_error(format!("create {}: {err}", parent.display())))?;
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("report");
    let tmp_path = parent.join(format!(".{file_name}.tmp"));
    fs::write(&tmp_path, bytes)
        .map_err(|err| export_error(format!("write {}: {err}", tmp_path.display())))?;
    if let Err(err) = fs::rename(&tmp_path, dest) {
        let _ = fs::remove_file(&tmp_path);
        return Err(export_error(format!("replace: {err}")));
    }
    Ok(())
}

fn file_stem(cluster_name: &str) -> String {
    let stem: String = cluster_name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if stem.trim_matches('.').is_empty() {
        "cluster".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{enrich, BenchmarkTable, EnrichmentContext};
    use crate::model::{StructuredFinding, WorkloadRef};

    fn finding(workload: &str, severity: Severity, detail: Option<&str>) -> EnrichedFinding {
        EnrichedFinding {
            cluster_name: "prod".to_string(),
            namespace: "shop".to_string(),
            workload_name: workload.to_string(),
            finding: StructuredFinding {
                rule_id: "PrivilegedTrue".to_string(),
                severity,
                auditor_name: Some("privileged".to_string()),
                detail_text: detail.map(str::to_string),
                description_text: Some("Privileged, with \"quotes\", and commas".to_string()),
                documentation_url: None,
                source_artifact_path: format!("{workload}.yaml"),
                artifact_workload: Some(workload.to_string()),
                message_defects: Vec::new(),
            },
            benchmark_id: Some("CIS 5.2.2".to_string()),
            benchmark_url: None,
        }
    }

    fn results(findings: Vec<EnrichedFinding>) -> AggregatedResultSet {
        let mut set = AggregatedResultSet::default();
        set.extend(findings);
        set
    }

    #[test]
    fn only_errors_are_reportable_and_duplicates_collapse() {
        let set = results(vec![
            finding("web-1", Severity::Error, Some("privileged")),
            finding("web-0", Severity::Warning, Some("apparmor")),
            finding("web-0", Severity::Error, Some("privileged")),
            finding("web-1", Severity::Error, Some("privileged")),
            finding("web-2", Severity::Note, None),
        ]);
        let rows = reportable(&set);
        let workloads: Vec<_> = rows.iter().map(|f| f.workload_name.as_str()).collect();
        assert_eq!(workloads, vec!["web-1", "web-0"]);
    }

    #[test]
    fn tabular_report_has_header_and_rows() {
        let temp = tempfile::tempdir().expect("temp dir");
        let set = results(vec![finding("web-0", Severity::Error, Some("privileged"))]);
        let rows = reportable(&set);
        let target = ExportTarget {
            report_dir: temp.path(),
            cluster_name: "prod",
            emit_json: false,
        };
        let summary = export(&rows, &target).expect("export");
        assert_eq!(summary.rows, 1);
        assert!(summary.json_report.is_none());
        let text = std::fs::read_to_string(&summary.tabular_report).expect("read report");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(HEADER.join(",").as_str()));
        let row = lines.next().expect("data row");
        assert!(row.starts_with("prod,shop,web-0,PrivilegedTrue,ERROR,privileged,privileged,"));
        assert!(row.contains("\"Privileged, with \"\"quotes\"\", and commas\""));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn empty_report_still_has_header() {
        let temp = tempfile::tempdir().expect("temp dir");
        let target = ExportTarget {
            report_dir: temp.path(),
            cluster_name: "prod",
            emit_json: true,
        };
        let summary = export(&[], &target).expect("export");
        let text = std::fs::read_to_string(&summary.tabular_report).expect("read report");
        assert_eq!(text.trim_end(), HEADER.join(","));
        let json = std::fs::read_to_string(summary.json_report.expect("json path")).expect("read");
        assert_eq!(json, "[]");
    }

    #[test]
    fn re_export_replaces_with_identical_bytes() {
        let temp = tempfile::tempdir().expect("temp dir");
        let set = results(vec![
            finding("web-0", Severity::Error, Some("privileged")),
            finding("web-1", Severity::Error, None),
        ]);
        let target = ExportTarget {
            report_dir: temp.path(),
            cluster_name: "prod",
            emit_json: true,
        };
        std::fs::write(target.tabular_path(), "stale").expect("seed stale report");
        let first = export(&reportable(&set), &target).expect("first export");
        let first_bytes = std::fs::read(&first.tabular_report).expect("read first");
        let second = export(&reportable(&set), &target).expect("second export");
        let second_bytes = std::fs::read(&second.tabular_report).expect("read second");
        assert_eq!(first_bytes, second_bytes);
        assert!(!String::from_utf8_lossy(&first_bytes).contains("stale"));
    }

    #[test]
    fn json_report_serializes_enriched_fields() {
        let temp = tempfile::tempdir().expect("temp dir");
        let set = results(vec![finding("web-0", Severity::Error, None)]);
        let target = ExportTarget {
            report_dir: temp.path(),
            cluster_name: "prod",
            emit_json: true,
        };
        let summary = export(&reportable(&set), &target).expect("export");
        let text = std::fs::read_to_string(summary.json_report.expect("json path")).expect("read");
        let value: serde_json::Value = serde_json::from_str(&text).expect("parse json");
        let row = &value[0];
        assert_eq!(row["namespace"], "shop");
        assert_eq!(row["rule_id"], "PrivilegedTrue");
        assert_eq!(row["severity"], "ERROR");
        assert_eq!(row["detail_text"], serde_json::Value::Null);
        assert_eq!(row["benchmark_id"], "CIS 5.2.2");
    }

    #[test]
    fn unwritable_destination_is_export_error() {
        let temp = tempfile::tempdir().expect("temp dir");
        let blocker = temp.path().join("reports");
        std::fs::write(&blocker, "not a directory").expect("write blocker");
        let target = ExportTarget {
            report_dir: &blocker,
            cluster_name: "prod",
            emit_json: false,
        };
        let err = export(&[], &target).expect_err("export fails");
        assert_eq!(err.kind(), "export");
    }

    #[test]
    fn cluster_names_are_made_file_safe() {
        assert_eq!(file_stem("gke_proj_europe-west1_prod"), "gke_proj_europe-west1_prod");
        assert_eq!(
            file_stem("arn:aws:eks:eu-west-1:1234:cluster/prod"),
            "arn_aws_eks_eu-west-1_1234_cluster_prod"
        );
        assert_eq!(file_stem(".."), "cluster");
    }

    #[test]
    fn json_report_has_one_workload_key_when_artifact_is_unknown() {
        let temp = tempfile::tempdir().expect("temp dir");
        let workload = WorkloadRef::new("shop", "web-0");
        let context = EnrichmentContext {
            cluster_name: "kind-test",
            workload: &workload,
        };
        let parsed = StructuredFinding {
            rule_id: "PrivilegedTrue".to_string(),
            severity: Severity::Error,
            auditor_name: Some("privileged".to_string()),
            detail_text: Some("privileged is set to true".to_string()),
            description_text: None,
            documentation_url: None,
            source_artifact_path: String::new(),
            artifact_workload: None,
            message_defects: Vec::new(),
        };
        let set = results(vec![enrich(parsed, &context, &BenchmarkTable::default())]);
        let target = ExportTarget {
            report_dir: temp.path(),
            cluster_name: "kind-test",
            emit_json: true,
        };
        let summary = export(&reportable(&set), &target).expect("export");
        let text = std::fs::read_to_string(summary.json_report.expect("json path")).expect("read");
        assert_eq!(text.matches("\"workload_name\"").count(), 1, "json: {text}");
        let value: serde_json::Value = serde_json::from_str(&text).expect("parse json");
        assert_eq!(value[0]["workload_name"], "web-0");
        assert_eq!(value[0]["artifact_workload"], serde_json::Value::Null);
    }

    #[test]
    fn message_defects_are_exported_as_a_column() {
        let temp = tempfile::tempdir().expect("temp dir");
        let mut malformed = finding("web-0", Severity::Error, None);
        malformed.finding.message_defects = vec!["Details missing colon".to_string(), "noise".to_string()];
        let set = results(vec![malformed]);
        let target = ExportTarget {
            report_dir: temp.path(),
            cluster_name: "prod",
            emit_json: false,
        };
        let summary = export(&reportable(&set), &target).expect("export");
        let mut reader = csv::Reader::from_path(&summary.tabular_report).expect("open report");
        let record = reader
            .records()
            .next()
            .expect("data row")
            .expect("valid row");
        assert_eq!(&record[12], "Details missing colon; noise");
    }
}

//! Records that flow through the audit pipeline.
//!
//! Everything here is scoped to a single run: workloads are enumerated, their
//! findings are parsed and enriched, and the accumulated set is handed to the
//! report and assertion writers.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A schedulable unit identified by namespace + name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
}

impl WorkloadRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A manifest written to scratch storage for one workload.
#[derive(Debug, Clone)]
pub struct ManifestHandle {
    pub workload: WorkloadRef,
    pub path: PathBuf,
}

impl ManifestHandle {
    /// Directory the auditor is bound to.
    pub fn dir(&self) -> Option<&std::path::Path> {
        self.path.parent()
    }

    /// Manifest path relative to [`ManifestHandle::dir`].
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// Raw diagnostics text captured from one auditor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDiagnostics(pub String);

impl RawDiagnostics {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Finding severity. Ordering follows escalating seriousness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl Severity {
    /// Parse a diagnostics `level`, ignoring case. SARIF `none` maps to NOTE.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            "note" | "none" => Some(Severity::Note),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Note => "NOTE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized diagnostic entry.
///
/// `rule_id` and `severity` are always present. The remaining text fields come
/// from the key/value block embedded in the diagnostic message and stay `None`
/// when that block did not provide them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StructuredFinding {
    pub rule_id: String,
    pub severity: Severity,
    pub auditor_name: Option<String>,
    pub detail_text: Option<String>,
    pub description_text: Option<String>,
    pub documentation_url: Option<String>,
    pub source_artifact_path: String,
    /// Workload recovered from the artifact file name.
    pub artifact_workload: Option<String>,
    /// Message lines that did not follow the `Key: Value` grammar. A finding
    /// with defects may be missing fields its message meant to carry.
    pub message_defects: Vec<String>,
}

/// A finding plus run, placement, and benchmark context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EnrichedFinding {
    pub cluster_name: String,
    pub namespace: String,
    pub workload_name: String,
    #[serde(flatten)]
    pub finding: StructuredFinding,
    pub benchmark_id: Option<String>,
    pub benchmark_url: Option<String>,
}

impl EnrichedFinding {
    pub fn severity(&self) -> Severity {
        self.finding.severity
    }

    /// Key used to group assertions: the auditor name, or the rule id when the
    /// message did not name one.
    pub fn auditor_or_rule(&self) -> &str {
        self.finding
            .auditor_name
            .as_deref()
            .unwrap_or(&self.finding.rule_id)
    }
}

/// Cross-reference from an auditor name to a compliance control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkEntry {
    pub auditor: String,
    pub benchmark_id: String,
    pub reference_url: String,
}

/// Findings accumulated over one run, in namespace-then-workload order.
///
/// Append-only while the orchestrator runs; handed out read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct AggregatedResultSet {
    findings: Vec<EnrichedFinding>,
}

impl AggregatedResultSet {
    pub(crate) fn extend(&mut self, findings: Vec<EnrichedFinding>) {
        self.findings.extend(findings);
    }

    pub fn findings(&self) -> &[EnrichedFinding] {
        &self.findings
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }
}

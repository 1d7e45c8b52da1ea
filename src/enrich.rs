//! Finding enrichment with run context and benchmark cross-references.
use crate::model::{BenchmarkEntry, EnrichedFinding, StructuredFinding, WorkloadRef};
use crate::templates;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Static auditor → benchmark table, loaded once per run.
#[derive(Debug, Default, Clone)]
pub struct BenchmarkTable {
    entries: BTreeMap<String, BenchmarkEntry>,
}

impl BenchmarkTable {
    /// Build a table, rejecting duplicate, empty, or whitespace-padded
    /// auditor names. Lookups match the auditor name exactly.
    pub fn from_entries(entries: Vec<BenchmarkEntry>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for entry in entries {
            let auditor = entry.auditor.clone();
            if auditor.trim().is_empty() {
                return Err(anyhow!("benchmark entry with empty auditor name"));
            }
            if auditor.trim() != auditor {
                return Err(anyhow!(
                    "benchmark auditor name {auditor:?} has surrounding whitespace"
                ));
            }
            if table.insert(auditor.clone(), entry).is_some() {
                return Err(anyhow!("duplicate benchmark entry for auditor {auditor:?}"));
            }
        }
        Ok(Self { entries: table })
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let entries: Vec<BenchmarkEntry> =
            serde_yaml::from_str(text).context("parse benchmark table YAML")?;
        Self::from_entries(entries)
    }

    /// Table shipped with the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_yaml(templates::DEFAULT_BENCHMARKS_YAML)
    }

    /// Load from `path`, or fall back to the embedded table.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::embedded();
        };
        let text =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("load benchmarks {}", path.display()))
    }

    pub fn lookup(&self, auditor: &str) -> Option<&BenchmarkEntry> {
        self.entries.get(auditor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Placement of the workload whose findings are being enriched.
pub struct EnrichmentContext<'a> {
    pub cluster_name: &'a str,
    pub workload: &'a WorkloadRef,
}

/// Attach cluster, namespace, workload, and benchmark metadata.
///
/// Never fails. The workload name recovered from the artifact wins over the
/// one being processed; benchmark fields stay empty without a table match.
pub fn enrich(
    finding: StructuredFinding,
    context: &EnrichmentContext<'_>,
    table: &BenchmarkTable,
) -> EnrichedFinding {
    let benchmark = finding
        .auditor_name
        .as_deref()
        .and_then(|auditor| table.lookup(auditor));
    let benchmark_id = benchmark.map(|entry| entry.benchmark_id.clone());
    let benchmark_url = benchmark.map(|entry| entry.reference_url.clone());
    let workload_name = finding
        .artifact_workload
        .clone()
        .unwrap_or_else(|| context.workload.name.clone());
    EnrichedFinding {
        cluster_name: context.cluster_name.to_string(),
        namespace: context.workload.namespace.clone(),
        workload_name,
        finding,
        benchmark_id,
        benchmark_url,
    }
}

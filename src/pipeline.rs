//! Run orchestration: enumerate → extract → audit → parse → enrich → accumulate.
//!
//! Namespaces are processed one at a time and the manifests written for a
//! namespace are removed before the next begins. A workload that fails at any stage is
//! recorded and skipped; it never stops its siblings.
use crate::auditor::Auditor;
use crate::cluster::Cluster;
use crate::enrich::{enrich, BenchmarkTable, EnrichmentContext};
use crate::enumerate;
use crate::error::{NamespaceFailure, PipelineError, Stage, WorkloadFailure};
use crate::manifest::{self, ScratchBatch};
use crate::model::{AggregatedResultSet, EnrichedFinding, WorkloadRef};
use crate::sarif;
use std::path::Path;
use std::time::Instant;

/// Per-workload progress through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadState {
    Pending,
    ManifestWritten,
    Audited,
    Parsed,
    Enriched,
    Accumulated,
    Failed { stage: Stage, reason: String },
}

impl WorkloadState {
    /// Stage that moves this state forward, `None` once terminal.
    pub fn pending_stage(&self) -> Option<Stage> {
        match self {
            WorkloadState::Pending => Some(Stage::Extract),
            WorkloadState::ManifestWritten => Some(Stage::Audit),
            WorkloadState::Audited => Some(Stage::Parse),
            WorkloadState::Parsed => Some(Stage::Enrich),
            WorkloadState::Enriched => Some(Stage::Accumulate),
            WorkloadState::Accumulated | WorkloadState::Failed { .. } => None,
        }
    }
}

/// Terminal state of one workload.
#[derive(Debug)]
pub struct WorkloadOutcome {
    pub workload: WorkloadRef,
    pub state: WorkloadState,
    pub findings: usize,
}

/// Everything a run produced.
#[derive(Debug, Default)]
pub struct RunReport {
    pub results: AggregatedResultSet,
    pub outcomes: Vec<WorkloadOutcome>,
    pub workload_failures: Vec<WorkloadFailure>,
    pub namespace_failures: Vec<NamespaceFailure>,
}

impl RunReport {
    pub fn accumulated_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.state == WorkloadState::Accumulated)
            .count()
    }
}

/// Collaborators and settings for one run.
pub struct Pipeline<'a> {
    pub cluster: &'a dyn Cluster,
    pub auditor: &'a dyn Auditor,
    pub benchmarks: &'a BenchmarkTable,
    pub cluster_name: &'a str,
    pub scratch_root: &'a Path,
}

impl Pipeline<'_> {
    /// Process every namespace in order and return the aggregated run.
    ///
    /// With a single namespace, an enumeration failure aborts the run. With
    /// several, it is recorded and the remaining namespaces still run.
    pub fn run(&self, namespaces: &[String]) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::default();
        let single = namespaces.len() == 1;
        for namespace in namespaces {
            let workloads = match enumerate::list(self.cluster, namespace) {
                Ok(workloads) => workloads,
                Err(error) if single => return Err(error),
                Err(error) => {
                    tracing::warn!(namespace = %namespace, kind = error.kind(), "{error}");
                    report.namespace_failures.push(NamespaceFailure {
                        namespace: namespace.clone(),
                        error,
                    });
                    continue;
                }
            };
            tracing::info!(namespace = %namespace, workloads = workloads.len(), "auditing namespace");
            self.run_namespace(namespace, &workloads, &mut report);
        }
        Ok(report)
    }

    fn run_namespace(&self, namespace: &str, workloads: &[WorkloadRef], report: &mut RunReport) {
        let mut batch = ScratchBatch::open(self.scratch_root.join(namespace));
        for workload in workloads {
            let start = Instant::now();
            match self.process_workload(workload, &mut batch) {
                Ok(findings) => {
                    let count = findings.len();
                    report.results.extend(findings);
                    transition(workload, &WorkloadState::Accumulated);
                    tracing::info!(
                        workload = %workload,
                        findings = count,
                        elapsed_ms = start.elapsed().as_millis(),
                        "workload audited"
                    );
                    report.outcomes.push(WorkloadOutcome {
                        workload: workload.clone(),
                        state: WorkloadState::Accumulated,
                        findings: count,
                    });
                }
                Err(failure) => {
                    tracing::warn!(
                        workload = %failure.workload,
                        stage = %failure.stage,
                        kind = failure.error.kind(),
                        "workload failed: {}",
                        failure.error
                    );
                    report.outcomes.push(WorkloadOutcome {
                        workload: workload.clone(),
                        state: WorkloadState::Failed {
                            stage: failure.stage,
                            reason: failure.error.to_string(),
                        },
                        findings: 0,
                    });
                    report.workload_failures.push(failure);
                }
            }
        }
        for (path, err) in batch.cleanup() {
            tracing::warn!(
                namespace = %namespace,
                path = %path.display(),
                "manifest cleanup failed: {err}"
            );
        }
    }

    fn process_workload(
        &self,
        workload: &WorkloadRef,
        batch: &mut ScratchBatch,
    ) -> Result<Vec<EnrichedFinding>, WorkloadFailure> {
        let mut state = WorkloadState::Pending;
        let fail = |state: &WorkloadState, error: PipelineError| WorkloadFailure {
            workload: workload.clone(),
            stage: state.pending_stage().unwrap_or(Stage::Accumulate),
            error,
        };

        let handle = manifest::materialize(self.cluster, workload, batch.dir())
            .map_err(|error| fail(&state, error))?;
        batch.record(&handle);
        state = WorkloadState::ManifestWritten;
        transition(workload, &state);

        let raw = self
            .auditor
            .run(&handle)
            .map_err(|error| fail(&state, error))?;
        state = WorkloadState::Audited;
        transition(workload, &state);

        let findings = sarif::parse_document(raw.as_str()).map_err(|error| fail(&state, error))?;
        state = WorkloadState::Parsed;
        transition(workload, &state);

        let context = EnrichmentContext {
            cluster_name: self.cluster_name,
            workload,
        };
        let enriched: Vec<EnrichedFinding> = findings
            .into_iter()
            .map(|finding| enrich(finding, &context, self.benchmarks))
            .collect();
        for finding in &enriched {
            if finding.workload_name != workload.name {
                tracing::debug!(
                    workload = %workload,
                    attributed = %finding.workload_name,
                    "finding attributed to a different manifest"
                );
            }
        }
        state = WorkloadState::Enriched;
        transition(workload, &state);
        Ok(enriched)
    }
}

fn transition(workload: &WorkloadRef, state: &WorkloadState) {
    tracing::debug!(workload = %workload, state = ?state, "workload state");
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

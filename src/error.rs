//! Pipeline error taxonomy and failure records.
use crate::model::WorkloadRef;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("listing workloads in namespace {namespace} failed: {reason}")]
    Enumeration { namespace: String, reason: String },

    #[error("namespace {namespace} has no running workloads")]
    EmptyNamespace { namespace: String },

    #[error("writing manifest for {workload} failed: {reason}")]
    Extraction {
        workload: WorkloadRef,
        reason: String,
    },

    #[error("auditor could not be started for {workload}: {reason}")]
    Invocation {
        workload: WorkloadRef,
        reason: String,
    },

    #[error("diagnostics document is not valid: {reason}")]
    DocumentFormat { reason: String },

    #[error("rule {rule_id}: malformed message line {line:?}")]
    MessageParse { rule_id: String, line: String },

    #[error("writing report {} failed: {reason}", path.display())]
    Export { path: PathBuf, reason: String },
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Enumeration { .. } => "enumeration",
            PipelineError::EmptyNamespace { .. } => "empty_namespace",
            PipelineError::Extraction { .. } => "extraction",
            PipelineError::Invocation { .. } => "invocation",
            PipelineError::DocumentFormat { .. } => "document_format",
            PipelineError::MessageParse { .. } => "message_parse",
            PipelineError::Export { .. } => "export",
        }
    }
}

/// Stage a workload was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Audit,
    Parse,
    Enrich,
    Accumulate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Extract => "extract",
            Stage::Audit => "audit",
            Stage::Parse => "parse",
            Stage::Enrich => "enrich",
            Stage::Accumulate => "accumulate",
        };
        f.write_str(label)
    }
}

/// A workload that reached `FAILED(stage, reason)`.
#[derive(Debug)]
pub struct WorkloadFailure {
    pub workload: WorkloadRef,
    pub stage: Stage,
    pub error: PipelineError,
}

/// A namespace that could not be enumerated.
#[derive(Debug)]
pub struct NamespaceFailure {
    pub namespace: String,
    pub error: PipelineError,
}

//! Diagnostics document parsing.
//!
//! The auditor emits a SARIF-shaped document: `runs[].results[]`, where each
//! result carries a rule id, a level, a free-text message, and the artifact
//! that was audited. The message text embeds a `Key: Value` block that holds
//! the auditor name, detail, description, and documentation link.
use crate::error::PipelineError;
use crate::manifest::workload_name_from_artifact;
use crate::model::{Severity, StructuredFinding};
use serde::Deserialize;

const MESSAGE_LINE_DELIMITER: char = '\n';

const KEY_AUDITOR: &str = "Auditor";
const KEY_DETAILS: &str = "Details";
const KEY_DESCRIPTION: &str = "Description";
const KEY_AUDITOR_DOCS: &str = "Auditor docs";

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    runs: Option<Vec<Run>>,
}

#[derive(Deserialize)]
struct Run {
    #[serde(default)]
    results: Option<Vec<ResultEntry>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultEntry {
    #[serde(default)]
    rule_id: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    locations: Vec<Location>,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Location {
    #[serde(default)]
    physical_location: Option<PhysicalLocation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhysicalLocation {
    #[serde(default)]
    artifact_location: Option<ArtifactLocation>,
}

#[derive(Deserialize)]
struct ArtifactLocation {
    #[serde(default)]
    uri: Option<String>,
}

/// Fields recovered from a message's embedded key/value block.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MessageFields {
    pub auditor: Option<String>,
    pub details: Option<String>,
    pub description: Option<String>,
    pub auditor_docs: Option<String>,
}

/// Parse a message block into recognized fields.
///
/// Lines are `Key: Value`, split at the first colon. Lines without a colon or
/// with an empty key are returned as rejected; unknown keys are ignored, the
/// last duplicate wins, and empty values count as absent.
pub fn parse_message(text: &str) -> (MessageFields, Vec<String>) {
    let mut fields = MessageFields::default();
    let mut rejected = Vec::new();
    for line in text.split(MESSAGE_LINE_DELIMITER) {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            rejected.push(line.to_string());
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            rejected.push(line.to_string());
            continue;
        }
        let value = value.trim();
        let value = (!value.is_empty()).then(|| value.to_string());
        match key {
            KEY_AUDITOR => fields.auditor = value,
            KEY_DETAILS => fields.details = value,
            KEY_DESCRIPTION => fields.description = value,
            KEY_AUDITOR_DOCS => fields.auditor_docs = value,
            _ => {}
        }
    }
    (fields, rejected)
}

/// Parse one diagnostics document into structured findings.
///
/// A document with no runs or no results yields an empty list. Entries without
/// a rule id or with an unrecognized level are skipped and logged; malformed
/// message lines degrade to missing fields on that entry only.
pub fn parse_document(document: &str) -> Result<Vec<StructuredFinding>, PipelineError> {
    if document.trim().is_empty() {
        return Err(PipelineError::DocumentFormat {
            reason: "document is empty".to_string(),
        });
    }
    let parsed: Document =
        serde_json::from_str(document).map_err(|err| PipelineError::DocumentFormat {
            reason: err.to_string(),
        })?;

    let entries = parsed
        .runs
        .unwrap_or_default()
        .into_iter()
        .flat_map(|run| run.results.unwrap_or_default());

    let mut findings = Vec::new();
    for entry in entries {
        if let Some(finding) = finding_from_entry(entry) {
            findings.push(finding);
        }
    }
    Ok(findings)
}

fn finding_from_entry(entry: ResultEntry) -> Option<StructuredFinding> {
    let Some(rule_id) = entry.rule_id.filter(|id| !id.trim().is_empty()) else {
        tracing::warn!("skipping diagnostics result without ruleId");
        return None;
    };
    // SARIF defaults a missing level to "warning".
    let severity = match entry.level.as_deref() {
        None => Severity::Warning,
        Some(level) => match Severity::parse(level) {
            Some(severity) => severity,
            None => {
                tracing::warn!(rule_id = %rule_id, level, "skipping result with unknown level");
                return None;
            }
        },
    };

    let text = entry
        .message
        .and_then(|message| message.text)
        .unwrap_or_default();
    let (fields, message_defects) = parse_message(&text);
    for line in &message_defects {
        let defect = PipelineError::MessageParse {
            rule_id: rule_id.clone(),
            line: line.clone(),
        };
        tracing::warn!(kind = defect.kind(), "{defect}");
    }
    if fields.auditor.is_none() {
        tracing::debug!(rule_id = %rule_id, "message block does not name an auditor");
    }

    let source_artifact_path = entry
        .locations
        .into_iter()
        .filter_map(|location| location.physical_location)
        .filter_map(|physical| physical.artifact_location)
        .find_map(|artifact| artifact.uri)
        .unwrap_or_default();
    let artifact_workload = workload_name_from_artifact(&source_artifact_path);

    Some(StructuredFinding {
        rule_id,
        severity,
        auditor_name: fields.auditor,
        detail_text: fields.details,
        description_text: fields.description,
        documentation_url: fields.auditor_docs,
        source_artifact_path,
        artifact_workload,
        message_defects,
    })
}

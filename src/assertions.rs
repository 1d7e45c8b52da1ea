//! Pass/fail assertions over reportable findings.
//!
//! Each finding becomes one check asserting that its detail text is empty, so
//! a check fails exactly when the auditor explained something to fix. A
//! finding whose message block was malformed cannot be judged and is reported
//! as an error instead of a pass. Checks are grouped by (namespace, workload,
//! auditor) and written as JUnit XML for generic test-report viewers.
use crate::error::PipelineError;
use crate::model::EnrichedFinding;
use crate::report::write_replacing;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    Error,
}

/// One "detail text is empty" check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assertion {
    pub rule_id: String,
    pub detail_text: Option<String>,
    pub message_defects: Vec<String>,
}

impl Assertion {
    pub fn verdict(&self) -> Verdict {
        if !self.message_defects.is_empty() {
            Verdict::Error
        } else if self.detail_text.is_some() {
            Verdict::Fail
        } else {
            Verdict::Pass
        }
    }
}

/// Checks sharing a namespace, workload, and auditor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionGroup {
    pub namespace: String,
    pub workload: String,
    pub auditor: String,
    pub assertions: Vec<Assertion>,
}

impl AssertionGroup {
    pub fn failures(&self) -> usize {
        self.count(Verdict::Fail)
    }

    pub fn errors(&self) -> usize {
        self.count(Verdict::Error)
    }

    fn count(&self, verdict: Verdict) -> usize {
        self.assertions
            .iter()
            .filter(|a| a.verdict() == verdict)
            .count()
    }

    fn name(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.workload, self.auditor)
    }
}

/// Group reportable findings into assertions, keeping first-seen order.
pub fn generate(findings: &[&EnrichedFinding]) -> Vec<AssertionGroup> {
    let mut groups: IndexMap<(&str, &str, &str), AssertionGroup> = IndexMap::new();
    for finding in findings {
        let key = (
            finding.namespace.as_str(),
            finding.workload_name.as_str(),
            finding.auditor_or_rule(),
        );
        groups
            .entry(key)
            .or_insert_with(|| AssertionGroup {
                namespace: finding.namespace.clone(),
                workload: finding.workload_name.clone(),
                auditor: finding.auditor_or_rule().to_string(),
                assertions: Vec::new(),
            })
            .assertions
            .push(Assertion {
                rule_id: finding.finding.rule_id.clone(),
                detail_text: finding.finding.detail_text.clone(),
                message_defects: finding.finding.message_defects.clone(),
            });
    }
    groups.into_values().collect()
}

/// Render groups as a JUnit `<testsuites>` document.
pub fn render_junit(groups: &[AssertionGroup]) -> String {
    let tests: usize = groups.iter().map(|g| g.assertions.len()).sum();
    let failures: usize = groups.iter().map(AssertionGroup::failures).sum();
    let errors: usize = groups.iter().map(AssertionGroup::errors).sum();
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<testsuites name=\"ksweep\" tests=\"{tests}\" failures=\"{failures}\" errors=\"{errors}\">"
    );
    for group in groups {
        let _ = writeln!(
            xml,
            "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"{}\">",
            escape_xml(&group.name()),
            group.assertions.len(),
            group.failures(),
            group.errors()
        );
        for assertion in &group.assertions {
            let _ = write!(
                xml,
                "    <testcase classname=\"{}\" name=\"{}: detail text is empty\"",
                escape_xml(&group.name()),
                escape_xml(&assertion.rule_id)
            );
            match (assertion.verdict(), &assertion.detail_text) {
                (Verdict::Pass, _) => xml.push_str("/>\n"),
                (Verdict::Error, _) => {
                    let message = format!(
                        "malformed message block: {}",
                        assertion.message_defects.join("; ")
                    );
                    let _ = writeln!(
                        xml,
                        ">\n      <error message=\"{}\"/>\n    </testcase>",
                        escape_xml(&message)
                    );
                }
                (Verdict::Fail, detail) => {
                    let _ = writeln!(
                        xml,
                        ">\n      <failure message=\"{}\"/>\n    </testcase>",
                        escape_xml(detail.as_deref().unwrap_or_default())
                    );
                }
            }
        }
        xml.push_str("  </testsuite>\n");
    }
    xml.push_str("</testsuites>\n");
    xml
}

/// Write the JUnit document, replacing any previous one.
pub fn write_junit(path: &Path, groups: &[AssertionGroup]) -> Result<(), PipelineError> {
    write_replacing(path, render_junit(groups).as_bytes())
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\n' => escaped.push_str("&#10;"),
            ch if ch.is_control() && ch != '\t' => {}
            ch => escaped.push(ch),
        }
    }
    escaped
}

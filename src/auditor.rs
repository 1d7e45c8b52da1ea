//! External auditor invocation.
//!
//! The auditor runs once per manifest with its working directory bound to the
//! manifest's directory. Only stdout is kept; exit status is ignored because
//! the auditor exits non-zero whenever it reports an error-level finding.
use crate::error::PipelineError;
use crate::model::{ManifestHandle, RawDiagnostics};
use anyhow::{anyhow, Context, Result};
use std::process::{Command, Stdio};
use std::time::Instant;

pub const DEFAULT_AUDITOR_IMAGE: &str = "shopify/kubeaudit:v0.22.1";

/// Default argv template. `{dir}`, `{manifest}`, and `{image}` are expanded per
/// invocation.
pub const DEFAULT_AUDITOR_COMMAND: &str =
    "docker run --rm -v {dir}:/manifests -w /manifests {image} all -f {manifest} --format=sarif";

const PLACEHOLDER_DIR: &str = "{dir}";
const PLACEHOLDER_MANIFEST: &str = "{manifest}";
const PLACEHOLDER_IMAGE: &str = "{image}";

/// Produces a diagnostics document for one manifest.
pub trait Auditor {
    fn run(&self, manifest: &ManifestHandle) -> Result<RawDiagnostics, PipelineError>;
}

/// [`Auditor`] that spawns a configurable command line.
#[derive(Debug, Clone)]
pub struct CommandAuditor {
    argv: Vec<String>,
    image: String,
}

impl CommandAuditor {
    /// Parse a shell-words command template.
    pub fn from_template(template: &str, image: &str) -> Result<Self> {
        let argv = shell_words::split(template)
            .with_context(|| format!("parse auditor command: {template}"))?;
        if argv.is_empty() {
            return Err(anyhow!("auditor command is empty"));
        }
        if !argv.iter().any(|arg| arg.contains(PLACEHOLDER_MANIFEST)) {
            return Err(anyhow!(
                "auditor command must reference {PLACEHOLDER_MANIFEST}: {template}"
            ));
        }
        Ok(Self {
            argv,
            image: image.to_string(),
        })
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    fn expand(&self, dir: &str, manifest: &str) -> Vec<String> {
        self.argv
            .iter()
            .map(|arg| {
                arg.replace(PLACEHOLDER_DIR, dir)
                    .replace(PLACEHOLDER_MANIFEST, manifest)
                    .replace(PLACEHOLDER_IMAGE, &self.image)
            })
            .collect()
    }
}

impl Auditor for CommandAuditor {
    fn run(&self, manifest: &ManifestHandle) -> Result<RawDiagnostics, PipelineError> {
        let invocation_error = |reason: String| PipelineError::Invocation {
            workload: manifest.workload.clone(),
            reason,
        };
        let dir = manifest
            .dir()
            .ok_or_else(|| invocation_error("manifest has no parent directory".to_string()))?;
        let file_name = manifest
            .file_name()
            .ok_or_else(|| invocation_error("manifest file name is not UTF-8".to_string()))?;
        let dir_text = dir
            .to_str()
            .ok_or_else(|| invocation_error("manifest directory is not UTF-8".to_string()))?;

        let argv = self.expand(dir_text, file_name);
        let start = Instant::now();
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .map_err(|err| invocation_error(format!("spawn {}: {err}", argv[0])))?;
        let elapsed_ms = start.elapsed().as_millis();

        tracing::debug!(
            workload = %manifest.workload,
            elapsed_ms,
            exit_code = output.status.code(),
            stdout_bytes = output.stdout.len(),
            "auditor complete"
        );

        Ok(RawDiagnostics(join_output_lines(&output.stdout)))
    }
}

/// Concatenate auditor stdout into one contiguous document.
///
/// The diagnostics document is not line-delimited; decoding it line by line
/// silently yields the wrong records.
pub fn join_output_lines(stdout: &[u8]) -> String {
    String::from_utf8_lossy(stdout).lines().collect()
}

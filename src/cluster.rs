//! Cluster access through `kubectl`.
//!
//! The pipeline only needs three things from the cluster: the running pods in
//! a namespace, one pod's manifest, and the current context name. Everything
//! else about the API stays behind this trait.
use crate::model::WorkloadRef;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

/// Read-only view of the cluster used by the enumerator and extractor.
pub trait Cluster {
    /// Names of running workloads in `namespace`, in any order.
    fn list_workloads(&self, namespace: &str) -> Result<Vec<String>>;

    /// Full declarative definition of one workload as YAML text.
    fn export_manifest(&self, workload: &WorkloadRef) -> Result<String>;

    /// Name of the cluster context the client is pointed at.
    fn current_context(&self) -> Result<String>;
}

#[derive(Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodItem>,
}

#[derive(Deserialize)]
struct PodItem {
    metadata: PodMetadata,
}

#[derive(Deserialize)]
struct PodMetadata {
    name: String,
}

/// [`Cluster`] backed by the `kubectl` CLI.
pub struct KubectlCluster {
    program: PathBuf,
}

impl KubectlCluster {
    /// Resolve `program` on `PATH` (or as a path) and wrap it.
    pub fn locate(program: &str) -> Result<Self> {
        let program =
            which::which(program).with_context(|| format!("locate kubectl binary {program:?}"))?;
        Ok(Self { program })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let start = Instant::now();
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("run {}", self.program.display()))?;
        let elapsed_ms = start.elapsed().as_millis();

        tracing::debug!(
            elapsed_ms,
            stdout_bytes = output.stdout.len(),
            command = %args.join(" "),
            "kubectl complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim().lines().next().unwrap_or_default();
            return Err(anyhow!(
                "kubectl {} failed with status {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                detail
            ));
        }
        Ok(output.stdout)
    }
}

impl Cluster for KubectlCluster {
    fn list_workloads(&self, namespace: &str) -> Result<Vec<String>> {
        let stdout = self.run(&[
            "get",
            "pods",
            "--namespace",
            namespace,
            "--field-selector=status.phase=Running",
            "--output",
            "json",
        ])?;
        parse_pod_list(&stdout)
    }

    fn export_manifest(&self, workload: &WorkloadRef) -> Result<String> {
        let stdout = self.run(&[
            "get",
            "pod",
            &workload.name,
            "--namespace",
            &workload.namespace,
            "--output",
            "yaml",
        ])?;
        String::from_utf8(stdout).context("manifest is not valid UTF-8")
    }

    fn current_context(&self) -> Result<String> {
        let stdout = self.run(&["config", "current-context"])?;
        let name = String::from_utf8_lossy(&stdout).trim().to_string();
        if name.is_empty() {
            return Err(anyhow!("kubectl reported an empty current context"));
        }
        Ok(name)
    }
}

fn parse_pod_list(bytes: &[u8]) -> Result<Vec<String>> {
    let list: PodList = serde_json::from_slice(bytes).context("parse pod list JSON")?;
    Ok(list
        .items
        .into_iter()
        .map(|item| item.metadata.name)
        .collect())
}

//! Manifest scratch files.
//!
//! Each workload's definition is written to `<dir>/<workload>.yaml`. The file
//! name is the only thing the auditor reports back about where a finding came
//! from, so the same rule is used in reverse to reattribute findings.
use crate::cluster::Cluster;
use crate::error::PipelineError;
use crate::model::{ManifestHandle, WorkloadRef};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const MANIFEST_EXTENSION: &str = ".yaml";

/// File name used for a workload's manifest.
///
/// Names that already contain `.yaml` are rejected: stripping the extension
/// would not recover them unambiguously.
pub fn manifest_file_name(workload_name: &str) -> Result<String, String> {
    if workload_name.is_empty() {
        return Err("workload name is empty".to_string());
    }
    if workload_name.contains(MANIFEST_EXTENSION) {
        return Err(format!(
            "unsupported workload name {workload_name:?}: contains {MANIFEST_EXTENSION:?}"
        ));
    }
    if workload_name.contains(['/', '\\']) || workload_name == "." || workload_name == ".." {
        return Err(format!(
            "unsupported workload name {workload_name:?}: not a plain file name"
        ));
    }
    Ok(format!("{workload_name}{MANIFEST_EXTENSION}"))
}

/// Recover a workload name from an artifact URI reported by the auditor.
///
/// Only the final path component is used and only a trailing `.yaml` is
/// stripped. Returns `None` when the URI does not name a manifest.
pub fn workload_name_from_artifact(uri: &str) -> Option<String> {
    let file_name = uri.rsplit(['/', '\\']).next()?;
    let name = file_name.strip_suffix(MANIFEST_EXTENSION)?;
    (!name.is_empty()).then(|| name.to_string())
}

/// Export a workload's manifest and write it under `destination_dir`.
pub fn materialize(
    cluster: &dyn Cluster,
    workload: &WorkloadRef,
    destination_dir: &Path,
) -> Result<ManifestHandle, PipelineError> {
    let extraction_error = |reason: String| PipelineError::Extraction {
        workload: workload.clone(),
        reason,
    };
    let file_name = manifest_file_name(&workload.name).map_err(extraction_error)?;
    let manifest = cluster
        .export_manifest(workload)
        .map_err(|err| extraction_error(format!("export manifest: {err:#}")))?;

    fs::create_dir_all(destination_dir).map_err(|err| {
        extraction_error(format!("create {}: {err}", destination_dir.display()))
    })?;
    let path = destination_dir.join(file_name);
    fs::write(&path, manifest.as_bytes())
        .map_err(|err| extraction_error(format!("write {}: {err}", path.display())))?;

    Ok(ManifestHandle {
        workload: workload.clone(),
        path,
    })
}

/// Manifests written into one namespace's scratch directory.
///
/// Cleanup removes only the recorded files. The directory itself is removed
/// only when this batch created it and nothing else is left inside.
#[derive(Debug)]
pub struct ScratchBatch {
    dir: PathBuf,
    created_dir: bool,
    written: Vec<PathBuf>,
}

impl ScratchBatch {
    pub fn open(dir: PathBuf) -> Self {
        let created_dir = !dir.exists();
        Self {
            dir,
            created_dir,
            written: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record(&mut self, handle: &ManifestHandle) {
        self.written.push(handle.path.clone());
    }

    /// Remove the recorded manifests; returns the paths that could not be
    /// removed. Files already gone count as removed.
    pub fn cleanup(self) -> Vec<(PathBuf, io::Error)> {
        let mut failures = Vec::new();
        for path in self.written {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => failures.push((path, err)),
            }
        }
        if self.created_dir && is_empty_dir(&self.dir) {
            if let Err(err) = fs::remove_dir(&self.dir) {
                failures.push((self.dir, err));
            }
        }
        failures
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

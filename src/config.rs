//! Run configuration.
//!
//! A YAML file supplies defaults; command-line flags override individual
//! fields. Validation happens once, after overrides are applied.
use crate::auditor::DEFAULT_AUDITOR_IMAGE;
use crate::cli::RunArgs;
use crate::templates;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.yaml";
const APP_DIR: &str = "ksweep";

/// Kubernetes namespace names are RFC 1123 labels.
const NAMESPACE_PATTERN: &str = r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$";

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_auditor_image() -> String {
    DEFAULT_AUDITOR_IMAGE.to_string()
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    #[serde(default = "default_auditor_image")]
    pub auditor_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auditor_command: Option<String>,
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
    #[serde(default)]
    pub emit_json: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmarks: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            namespaces: Vec::new(),
            cluster_name: None,
            scratch_dir: None,
            report_dir: default_report_dir(),
            auditor_image: default_auditor_image(),
            auditor_command: None,
            kubectl: default_kubectl(),
            emit_json: false,
            benchmarks: None,
        }
    }
}

/// `<config_dir>/ksweep/config.yaml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE_NAME))
}

pub fn load_config(path: &Path) -> Result<RunConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let config: RunConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("parse config {}", path.display()))?;
    Ok(config)
}

/// Load the explicit config, else the per-user one, else defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<RunConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match default_config_path() {
        Some(path) if path.is_file() => {
            tracing::debug!(path = %path.display(), "using per-user config");
            load_config(&path)
        }
        _ => Ok(RunConfig::default()),
    }
}

/// Apply command-line overrides on top of a loaded config.
pub fn apply_overrides(mut config: RunConfig, args: &RunArgs) -> RunConfig {
    if !args.namespace.is_empty() {
        config.namespaces = args.namespace.clone();
    }
    if let Some(name) = &args.cluster_name {
        config.cluster_name = Some(name.clone());
    }
    if let Some(dir) = &args.scratch_dir {
        config.scratch_dir = Some(dir.clone());
    }
    if let Some(dir) = &args.report_dir {
        config.report_dir = dir.clone();
    }
    if let Some(image) = &args.auditor_image {
        config.auditor_image = image.clone();
    }
    if let Some(command) = &args.auditor_command {
        config.auditor_command = Some(command.clone());
    }
    if let Some(kubectl) = &args.kubectl {
        config.kubectl = kubectl.clone();
    }
    if args.json {
        config.emit_json = true;
    }
    if let Some(path) = &args.benchmarks {
        config.benchmarks = Some(path.clone());
    }
    config
}

pub fn validate_config(config: &RunConfig) -> Result<()> {
    if config.namespaces.is_empty() {
        return Err(anyhow!(
            "no namespaces to audit; pass --namespace or set namespaces in the config"
        ));
    }
    let pattern = Regex::new(NAMESPACE_PATTERN).context("compile namespace pattern")?;
    let mut seen = BTreeSet::new();
    for namespace in &config.namespaces {
        if !pattern.is_match(namespace) {
            return Err(anyhow!("invalid namespace name {namespace:?}"));
        }
        if !seen.insert(namespace.as_str()) {
            return Err(anyhow!("namespace {namespace:?} listed more than once"));
        }
    }
    if config.report_dir.as_os_str().is_empty() {
        return Err(anyhow!("report_dir must be non-empty"));
    }
    if config.auditor_image.trim().is_empty() {
        return Err(anyhow!("auditor_image must be non-empty"));
    }
    if config.kubectl.trim().is_empty() {
        return Err(anyhow!("kubectl must be non-empty"));
    }
    if let Some(command) = config.auditor_command.as_deref() {
        if !command.contains("{manifest}") {
            return Err(anyhow!("auditor_command must reference {{manifest}}"));
        }
    }
    Ok(())
}

/// Write the commented config template to `path`.
pub fn write_config_stub(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        ));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, templates::CONFIG_YAML.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["run"];
        full.extend_from_slice(argv);
        RunArgs::parse_from(full)
    }

    #[test]
    fn template_parses_to_defaults_with_default_namespace() {
        let config: RunConfig = serde_yaml::from_str(templates::CONFIG_YAML).expect("parse template");
        assert_eq!(config.namespaces, vec!["default".to_string()]);
        assert_eq!(config.auditor_image, DEFAULT_AUDITOR_IMAGE);
        assert_eq!(config.report_dir, PathBuf::from("reports"));
        assert!(!config.emit_json);
        validate_config(&config).expect("template validates");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = serde_yaml::from_str::<RunConfig>("namespaces: [a]\nnamespace: b\n")
            .expect_err("unknown key");
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn cli_flags_override_file_values() {
        let config = RunConfig {
            namespaces: vec!["default".to_string()],
            report_dir: PathBuf::from("out"),
            ..RunConfig::default()
        };
        let args = run_args(&[
            "--namespace",
            "shop",
            "--namespace",
            "billing",
            "--json",
            "--cluster-name",
            "prod",
        ]);
        let merged = apply_overrides(config, &args);
        assert_eq!(merged.namespaces, vec!["shop".to_string(), "billing".to_string()]);
        assert_eq!(merged.report_dir, PathBuf::from("out"));
        assert_eq!(merged.cluster_name.as_deref(), Some("prod"));
        assert!(merged.emit_json);
    }

    #[test]
    fn validation_rejects_bad_namespaces() {
        let mut config = RunConfig::default();
        assert!(validate_config(&config).is_err());
        config.namespaces = vec!["Shop_Front".to_string()];
        assert!(validate_config(&config).is_err());
        config.namespaces = vec!["shop".to_string(), "shop".to_string()];
        assert!(validate_config(&config)
            .expect_err("duplicate")
            .to_string()
            .contains("more than once"));
        config.namespaces = vec!["shop".to_string()];
        validate_config(&config).expect("valid");
    }

    #[test]
    fn auditor_command_must_reference_manifest() {
        let config = RunConfig {
            namespaces: vec!["shop".to_string()],
            auditor_command: Some("kubeaudit all --format=sarif".to_string()),
            ..RunConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn stub_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("nested").join("config.yaml");
        write_config_stub(&path, false).expect("first write");
        assert!(write_config_stub(&path, false).is_err());
        write_config_stub(&path, true).expect("forced write");
        load_config(&path).expect("stub loads");
    }
}

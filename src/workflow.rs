//! Command handlers: `run`, `parse`, and `init`.
use crate::assertions;
use crate::auditor::{join_output_lines, CommandAuditor, DEFAULT_AUDITOR_COMMAND};
use crate::cli::{InitArgs, ParseArgs, RunArgs};
use crate::cluster::{Cluster, KubectlCluster};
use crate::config::{
    apply_overrides, default_config_path, resolve_config, validate_config, write_config_stub,
    RunConfig,
};
use crate::enrich::BenchmarkTable;
use crate::pipeline::{Pipeline, RunReport, WorkloadState};
use crate::report::{self, ExportSummary, ExportTarget};
use crate::sarif;
use crate::util::display_path;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const UNKNOWN_CLUSTER: &str = "unknown";

/// Scratch space for manifests: either a configured directory or a temp dir
/// removed when the run ends.
enum ScratchSpace {
    Configured(PathBuf),
    Temporary(tempfile::TempDir),
}

impl ScratchSpace {
    fn prepare(configured: Option<&Path>) -> Result<Self> {
        match configured {
            Some(dir) => {
                fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
                Ok(ScratchSpace::Configured(dir.to_path_buf()))
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("ksweep-")
                    .tempdir()
                    .context("create scratch dir")?;
                Ok(ScratchSpace::Temporary(dir))
            }
        }
    }

    fn path(&self) -> &Path {
        match self {
            ScratchSpace::Configured(path) => path,
            ScratchSpace::Temporary(dir) => dir.path(),
        }
    }
}

pub fn run_run(args: &RunArgs) -> Result<()> {
    let config = resolve_config(args.config.as_deref())?;
    let config = apply_overrides(config, args);
    validate_config(&config)?;

    let cluster = KubectlCluster::locate(&config.kubectl)?;
    tracing::debug!(kubectl = %cluster.program().display(), "resolved kubectl");
    let cluster_name = resolve_cluster_name(&config, &cluster);

    let benchmarks = BenchmarkTable::load(config.benchmarks.as_deref())?;
    if benchmarks.is_empty() {
        tracing::warn!("benchmark table is empty; findings will carry no benchmark ids");
    } else {
        tracing::debug!(entries = benchmarks.len(), "loaded benchmark table");
    }

    let template = config
        .auditor_command
        .as_deref()
        .unwrap_or(DEFAULT_AUDITOR_COMMAND);
    let auditor = CommandAuditor::from_template(template, &config.auditor_image)?;
    if which::which(auditor.program()).is_err() {
        tracing::warn!(
            program = auditor.program(),
            "auditor program not found on PATH; every workload will fail to audit"
        );
    }

    let scratch = ScratchSpace::prepare(config.scratch_dir.as_deref())?;
    let pipeline = Pipeline {
        cluster: &cluster,
        auditor: &auditor,
        benchmarks: &benchmarks,
        cluster_name: &cluster_name,
        scratch_root: scratch.path(),
    };
    let run = pipeline
        .run(&config.namespaces)
        .with_context(|| format!("audit namespace {}", config.namespaces.join(",")))?;

    let target = ExportTarget {
        report_dir: &config.report_dir,
        cluster_name: &cluster_name,
        emit_json: config.emit_json,
    };
    let reportable = report::reportable(&run.results);
    let summary = report::export(&reportable, &target)?;
    let groups = assertions::generate(&reportable);
    let assertions_path = target.assertions_path();
    assertions::write_junit(&assertions_path, &groups)?;

    print_run_summary(&run, &summary, &assertions_path);
    Ok(())
}

fn resolve_cluster_name(config: &RunConfig, cluster: &dyn Cluster) -> String {
    if let Some(name) = config.cluster_name.as_deref() {
        return name.to_string();
    }
    match cluster.current_context() {
        Ok(name) => name,
        Err(err) => {
            tracing::warn!("could not resolve cluster name, using {UNKNOWN_CLUSTER:?}: {err:#}");
            UNKNOWN_CLUSTER.to_string()
        }
    }
}

fn print_run_summary(run: &RunReport, summary: &ExportSummary, assertions_path: &Path) {
    let cwd = std::env::current_dir().ok();
    let base = cwd.as_deref();
    for outcome in &run.outcomes {
        let label = outcome.workload.to_string();
        match &outcome.state {
            WorkloadState::Failed { stage, reason } => {
                println!("  {label:<48} failed at {stage}: {reason}");
            }
            _ => println!("  {label:<48} {} finding(s)", outcome.findings),
        }
    }
    for failure in &run.namespace_failures {
        println!("namespace {} skipped: {}", failure.namespace, failure.error);
    }
    if run.results.is_empty() {
        println!("no findings");
    }
    println!(
        "audited {} workload(s), {} failed: {} findings, {} reportable",
        run.accumulated_count(),
        run.workload_failures.len(),
        run.results.len(),
        summary.rows
    );
    println!("wrote {}", display_path(&summary.tabular_report, base));
    if let Some(path) = &summary.json_report {
        println!("wrote {}", display_path(path, base));
    }
    println!("wrote {}", display_path(assertions_path, base));
}

pub fn run_parse(args: &ParseArgs) -> Result<()> {
    let bytes = fs::read(&args.document)
        .with_context(|| format!("read {}", args.document.display()))?;
    let document = join_output_lines(&bytes);
    let findings = sarif::parse_document(&document)
        .with_context(|| format!("parse {}", args.document.display()))?;
    let text = serde_json::to_string_pretty(&findings).context("serialize findings")?;
    println!("{text}");
    Ok(())
}

pub fn run_init(args: &InitArgs) -> Result<()> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()
            .ok_or_else(|| anyhow!("no config directory on this platform; pass --config"))?,
    };
    write_config_stub(&path, args.force)?;
    println!("wrote {}", path.display());
    Ok(())
}

//! CLI argument parsing for the audit sweep.
//!
//! The CLI only gathers inputs; configuration merging and the pipeline itself
//! live in their own modules so they can be driven without a process.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "ksweep",
    version,
    about = "Audit running workloads with kubeaudit and export an error report",
    after_help = "Commands:\n  run --namespace <ns>...   Audit namespaces and write reports\n  parse <sarif-file>        Parse a saved diagnostics document\n  init                      Write a default config file\n\nExamples:\n  ksweep run --namespace default --namespace payments --json\n  ksweep run --config ./ksweep.yaml --report-dir /tmp/reports\n  ksweep parse ./web-0.sarif.json\n  ksweep init --config ./ksweep.yaml",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Parse(ParseArgs),
    Init(InitArgs),
}

/// Run command inputs. Unset flags fall back to the config file.
#[derive(Parser, Debug)]
#[command(about = "Audit namespaces and export the reportable findings")]
pub struct RunArgs {
    /// YAML config file (defaults to the per-user config when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Namespace to audit; repeat for several
    #[arg(long, short = 'n', value_name = "NS")]
    pub namespace: Vec<String>,

    /// Cluster name recorded on every finding (defaults to the kubectl context)
    #[arg(long, value_name = "NAME")]
    pub cluster_name: Option<String>,

    /// Directory for manifest scratch files (defaults to a temp dir)
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Directory the reports are written to
    #[arg(long, value_name = "DIR")]
    pub report_dir: Option<PathBuf>,

    /// Auditor container image
    #[arg(long, value_name = "IMAGE")]
    pub auditor_image: Option<String>,

    /// Auditor command template using {dir}, {manifest}, and {image}
    #[arg(long, value_name = "CMD")]
    pub auditor_command: Option<String>,

    /// kubectl binary name or path
    #[arg(long, value_name = "BIN")]
    pub kubectl: Option<String>,

    /// Also write the JSON report
    #[arg(long)]
    pub json: bool,

    /// Benchmark table YAML replacing the built-in one
    #[arg(long, value_name = "FILE")]
    pub benchmarks: Option<PathBuf>,

    /// Emit debug logging
    #[arg(long)]
    pub verbose: bool,
}

/// Parse command inputs.
#[derive(Parser, Debug)]
#[command(about = "Parse a saved diagnostics document and print its findings")]
pub struct ParseArgs {
    /// SARIF document produced by the auditor
    #[arg(value_name = "FILE")]
    pub document: PathBuf,

    /// Emit debug logging
    #[arg(long)]
    pub verbose: bool,
}

/// Init command inputs.
#[derive(Parser, Debug)]
#[command(about = "Write a default config file")]
pub struct InitArgs {
    /// Destination (defaults to the per-user config path)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

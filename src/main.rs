use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod assertions;
mod auditor;
mod cli;
mod cluster;
mod config;
mod enrich;
mod enumerate;
mod error;
mod manifest;
mod model;
mod pipeline;
mod report;
mod sarif;
mod templates;
mod util;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    let verbose = match &args.command {
        Command::Run(run) => run.verbose,
        Command::Parse(parse) => parse.verbose,
        Command::Init(_) => false,
    };
    init_tracing(verbose);

    match args.command {
        Command::Run(args) => workflow::run_run(&args),
        Command::Parse(args) => workflow::run_parse(&args),
        Command::Init(args) => workflow::run_init(&args),
    }
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use splitrt_core::ShutdownPolicy;

/// Split-module runtime tooling.
///
/// Runs the demo workload against the two-context scheduler, or analyzes an
/// `opt --print-callgraph` dump to decide which functions move into the
/// deferred module.
#[derive(Parser, Debug)]
#[command(name = "splitrt", version, about = "Split-module runtime tooling")]
pub struct CliArgs {
    /// Path to a TOML config file (environment only when unset)
    #[arg(long, global = true, env = "SPLITRT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a call graph dump and write the split list
    Callgraph(CallgraphArgs),
    /// Run the five demo tasks on a fresh application
    Demo(DemoArgs),
}

#[derive(clap::Args, Debug)]
pub struct CallgraphArgs {
    /// Splitting strategy (default from config, normally print-callgraph)
    #[arg(long)]
    pub strategy: Option<String>,

    /// File to which the split functions are written, `-` for stdout
    #[arg(short = 'o', long = "output", default_value = "-")]
    pub output: String,

    /// Demangler command, or `none` for raw symbol names
    #[arg(long)]
    pub demangler: Option<String>,

    /// The result of `opt --print-callgraph`
    pub callgraph: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct DemoArgs {
    /// What the worker does with queued tasks at shutdown
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Give up waiting for the demo after this many seconds
    #[arg(long, default_value = "10")]
    pub timeout_secs: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PolicyArg {
    Drain,
    Discard,
}

impl From<PolicyArg> for ShutdownPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Drain => ShutdownPolicy::Drain,
            PolicyArg::Discard => ShutdownPolicy::Discard,
        }
    }
}

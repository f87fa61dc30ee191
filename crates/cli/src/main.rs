mod cli;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use splitrt_callgraph::{analyze_file, demangler_from_command, write_split_list, Strategy};
use splitrt_core::config::load_dotenv;
use splitrt_core::Config;
use splitrt_scheduler::demo::{self, MarkerLog};
use splitrt_scheduler::{EventLoop, Registry};

use crate::cli::{CallgraphArgs, CliArgs, Command, DemoArgs};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    config.log_summary();

    match args.command {
        Command::Callgraph(cg) => run_callgraph(&config, cg),
        Command::Demo(d) => run_demo(&config, d).await,
    }
}

fn run_callgraph(config: &Config, args: CallgraphArgs) -> Result<()> {
    let strategy: Strategy = args
        .strategy
        .as_deref()
        .unwrap_or(config.callgraph.default_strategy.as_str())
        .parse()?;
    let command = args
        .demangler
        .as_deref()
        .unwrap_or(config.callgraph.demangler.as_str());
    let demangler = demangler_from_command(command);

    info!(
        file = %args.callgraph.display(),
        %strategy,
        demangler = command,
        "analyzing call graph"
    );
    let graph = analyze_file(&args.callgraph, &*demangler)
        .with_context(|| format!("failed to analyze {}", args.callgraph.display()))?;

    let split = {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let split = strategy.run(&graph, &mut out)?;
        out.flush()?;
        split
    };

    if split.is_empty() {
        warn!("not splitting any functions");
        return Ok(());
    }
    write_split_list(&args.output, &split)
        .with_context(|| format!("failed to write split list to {}", args.output))?;
    Ok(())
}

async fn run_demo(config: &Config, args: DemoArgs) -> Result<()> {
    let mut scheduler = config.scheduler.clone();
    if let Some(policy) = args.policy {
        scheduler = scheduler.with_policy(policy.into());
    }

    let registry = Registry::global();
    let (dispatch, mut event_loop) = EventLoop::new();
    let id = registry
        .create(&scheduler, dispatch)
        .context("failed to start application")?;
    info!(app = %id, policy = %scheduler.shutdown_policy, "application started");

    let log = MarkerLog::new();
    demo::run_all(&registry.spawner(id)?, &log)?;

    let watch = Arc::clone(&log);
    let waited = event_loop
        .run_until(
            move || watch.len() >= demo::RUN_ALL_MARKERS,
            Duration::from_secs(args.timeout_secs),
        )
        .await;

    registry.destroy(id).context("failed to shut down application")?;
    waited.context("demo did not finish")?;

    let mut stdout = io::stdout().lock();
    for text in log.texts() {
        writeln!(stdout, "{text}")?;
    }
    info!(
        requests = event_loop.requests_handled(),
        main_tasks = event_loop.tasks_run(),
        "demo finished"
    );
    Ok(())
}

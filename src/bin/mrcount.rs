use std::{
    collections::HashMap,
    io::{self, Write},
    path::PathBuf,
};

use anyhow::Context;
use clap::{ArgAction, Parser};
use map_reduce_local::mr::{
    config::{CoordinatorConfig, ReduceStrategy},
    coordinator::Coordinator,
    function::wc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Count the words of the given files with an in-memory map reduce
#[derive(Debug, Parser)]
#[command(name = "mrcount", version)]
struct Args {
    /// Input files, every file becomes one map task
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Reduce keys on the rayon thread pool instead of one after another
    #[arg(long)]
    parallel_reduce: bool,

    /// Increase log verbosity (-v, -vv, -vvv), `RUST_LOG` takes precedence
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 3)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    debug!(?args, "[Configuration] Parsed command line");

    let mut inputs = HashMap::new();
    for path in &args.files {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read input file {}", path.display()))?;
        // Giving the same file twice only yields one input
        inputs.insert(path.display().to_string(), contents);
    }

    let reduce_strategy = if args.parallel_reduce {
        ReduceStrategy::Parallel
    } else {
        ReduceStrategy::Sequential
    };
    info!(
        "[Configuration] #{} Map Tasks | {:?} Reduce",
        inputs.len(),
        reduce_strategy
    );

    // Ctrl-C stops the map phase instead of killing the process mid-run
    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let config = CoordinatorConfig::default()
        .with_reduce_strategy(reduce_strategy)
        .with_cancellation(token);
    let result = Coordinator::with_config(inputs, wc::map, wc::reduce, config)
        .run()
        .await
        .context("word count failed")?;

    // The result map has no order of its own, sort for stable output
    let mut lines = result.into_iter().collect::<Vec<(String, String)>>();
    lines.sort();

    let mut out = io::stdout().lock();
    for (key, value) in lines {
        writeln!(out, "{} {}", key, value)?;
    }

    Ok(())
}

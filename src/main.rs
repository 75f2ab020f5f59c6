//! Command-line front end.

use anyhow::{Context, Result};
use clap::Parser;
use predprey::{Ecosystem, Engine, PreyPolicy, RunOptions};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    /// Initial ecosystem file.
    #[arg(long)]
    input: PathBuf,

    /// Final ecosystem file.
    #[arg(long, default_value = "output.txt")]
    output: PathBuf,

    /// Number of worker threads for the movement phases.
    #[arg(long, default_value_t = 1)]
    threads: usize,

    #[arg(long, value_enum, default_value_t = PreyPolicy::EmptyOnly)]
    prey_policy: PreyPolicy,

    /// Write one MessagePack record per generation to this file.
    #[arg(long)]
    trajectory: Option<PathBuf>,

    /// Write a TOML summary of the run to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Do not print the grid before and after the run.
    #[arg(long)]
    quiet: bool,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let opts = RunOptions::new(args.threads, args.prey_policy).context("invalid run options")?;

    let eco = Ecosystem::from_file(&args.input).context("failed to load ecosystem")?;
    log::info!("{:#?}", eco.cfg);

    let mut engine = Engine::new(eco, opts).context("failed to construct engine")?;
    if !args.quiet {
        println!("{}", engine.world());
    }

    let summary = engine
        .perform_simulation(args.trajectory.as_deref())
        .context("failed to perform simulation")?;
    log::info!(
        "finished after {} generations with {} prey and {} predators",
        engine.i_gen(),
        engine.prey().len(),
        engine.predators().len()
    );
    log::info!("{:#?}", summary.totals());

    if !args.quiet {
        println!("{}", engine.world());
    }

    if let Some(report) = &args.report {
        summary
            .save(report)
            .with_context(|| format!("failed to save report to {report:?}"))?;
    }

    engine
        .save_state(&args.output)
        .with_context(|| format!("failed to save final state to {:?}", args.output))?;

    Ok(())
}

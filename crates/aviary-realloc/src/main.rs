//! Aviary Reallocation CLI.
//!
//! Commands:
//! - run: Flag immutable aviaries, optimize territories, export results
//! - flag: Apply immutability rules only and export the flagged table
//! - summarize: Per-extensionist summary of an already optimized table

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use aviary_realloc::export::write_units;
use aviary_realloc::loader::load_units;
use aviary_realloc::pipeline::{Pipeline, SUMMARY_FILE};
use aviary_realloc::summary::{summarize, write_summary};
use aviary_realloc::{HeaderAliases, RunConfig};

#[derive(Parser)]
#[command(name = "aviary-realloc")]
#[command(version)]
#[command(about = "Reallocate aviaries among field extensionists")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,

    /// Also write logs to a timestamped file in this directory
    #[arg(long, env = "AVIARY_REALLOC_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full reallocation pipeline.
    Run {
        /// Aviary export (CSV, ';'-delimited)
        #[arg(short, long, default_value = "assets/exportation.csv")]
        input: PathBuf,
        /// Run configuration (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory roster files are resolved against
        #[arg(long, default_value = "assets")]
        assets_dir: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = "exports")]
        output_dir: PathBuf,
        /// Override the minimum average aviaries per extensionist
        #[arg(long)]
        target_min: Option<usize>,
        /// Override the maximum average aviaries per extensionist
        #[arg(long)]
        target_max: Option<usize>,
        /// Override the desired average aviaries per extensionist
        #[arg(long)]
        desired_avg: Option<f64>,
        /// Override the partitioner seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Apply immutability rules and export the flagged table.
    Flag {
        /// Aviary export (CSV, ';'-delimited)
        #[arg(short, long, default_value = "assets/exportation.csv")]
        input: PathBuf,
        /// Run configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory roster files are resolved against
        #[arg(long, default_value = "assets")]
        assets_dir: PathBuf,
        /// Output file
        #[arg(short, long, default_value = "exports/flagged_allocation.csv")]
        output: PathBuf,
    },

    /// Summarize an optimized allocation by proposed extensionist.
    Summarize {
        /// Optimized allocation (CSV, ';'-delimited)
        #[arg(short, long, default_value = "exports/final_optimized_allocation.csv")]
        input: PathBuf,
        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    match path {
        Some(path) => RunConfig::load(path),
        None => Ok(RunConfig::default()),
    }
}

/// Install the console subscriber, plus a file sink when `log_dir` is set.
///
/// The returned guard flushes the file sink on drop.
fn init_tracing(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_name = format!("reallocation_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Run {
            input,
            config,
            assets_dir,
            output_dir,
            target_min,
            target_max,
            desired_avg,
            seed,
        } => {
            let mut config = load_config(config.as_deref())?;
            let allocation = &mut config.allocation;
            if let Some(min) = target_min {
                allocation.target_min = min;
            }
            if let Some(max) = target_max {
                allocation.target_max = max;
            }
            if desired_avg.is_some() {
                allocation.desired_avg = desired_avg;
            }
            if let Some(seed) = seed {
                allocation.partitioner.seed = seed;
            }

            info!(input = %input.display(), "Starting reallocation");
            let pipeline = Pipeline::new(config, assets_dir);
            let report = pipeline.run(&input, &output_dir)?;

            println!("\n=== Reallocation Complete ===");
            println!("Run: {}", report.run_id);
            println!("Aviaries: {}", report.total_units);
            println!("Immutable: {}", report.immutable_units);
            println!("Current extensionists: {}", report.current_agents);
            println!("Territories kept by an extensionist: {}", report.kept_agents);
            println!("New territories: {}", report.synthesized_territories);
            println!("Aviaries reassigned: {}", report.reassigned_units);
            if let Some(search) = &report.search {
                println!(
                    "Search: k0={} k={} rounds={} stop={:?} avg={:.1}",
                    search.k0, search.k, search.rounds, search.stop, search.avg_group_size
                );
            }
            println!("\nOutputs:");
            for path in &report.outputs {
                println!("  {}", path.display());
            }
        }

        Commands::Flag {
            input,
            config,
            assets_dir,
            output,
        } => {
            let config = load_config(config.as_deref())?;
            let pipeline = Pipeline::new(config, assets_dir);
            let flagged = pipeline.flag(&input)?;
            write_units(&output, &flagged)?;

            println!("\n=== Immutability Applied ===");
            println!("Aviaries: {}", flagged.len());
            println!("Immutable: {}", flagged.immutable_count());
            println!("Output: {}", output.display());
        }

        Commands::Summarize { input, output } => {
            let table = load_units(&input, &HeaderAliases::default())?;
            if table.units().iter().all(|u| u.proposed_agent.is_none()) {
                bail!("{} has no proposed allocation", input.display());
            }
            let summaries = summarize(&table);
            let output = output.unwrap_or_else(|| {
                input
                    .parent()
                    .unwrap_or(Path::new("."))
                    .join(SUMMARY_FILE)
            });
            write_summary(&output, &summaries)?;

            println!(
                "  {:<30} {:>9} {:>8} {:>7} {:>6}",
                "Extensionist", "Producers", "Proposed", "Current", "Delta"
            );
            for s in &summaries {
                println!(
                    "  {:<30} {:>9} {:>8} {:>7} {:>+6}",
                    s.agent, s.unique_producers, s.proposed_units, s.current_units, s.delta
                );
            }
            println!("\nSummary saved to: {}", output.display());
        }
    }

    Ok(())
}

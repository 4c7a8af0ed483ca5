//! mltrack CLI - training metrics tracking
//!
//! Usage:
//!   mltrack init                 Write a default mltrack.toml
//!   mltrack demo                 Simulate a training run end to end
//!   mltrack show <report>        Print a saved report's summary
//!   mltrack compare <a> <b>      Compare two saved reports

mod demo;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use mltrack_core::config::CONFIG_FILE_NAME;
use mltrack_core::TrackingConfig;
use mltrack_metrics::MetricsTable;
use mltrack_tracker::{RunComparison, SvgPlotRenderer, TrainingReport, TrainingSummary};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "mltrack")]
#[command(author, version, about = "Training metrics tracking for ML experiments")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Target directory (defaults to current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Experiment name stored in the config
        #[arg(long, default_value = "experiment")]
        experiment: String,
    },

    /// Simulate a training run with the default policies and sinks
    Demo {
        /// Config file (defaults to ./mltrack.toml when present)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Experiment name override
        #[arg(long)]
        experiment: Option<String>,

        /// Number of epochs to simulate
        #[arg(long, default_value = "20")]
        epochs: u64,

        /// Batches per epoch
        #[arg(long, default_value = "10")]
        steps_per_epoch: u64,

        /// Log directory override
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Seed for the simulated metric noise
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Skip the JSON report and plots
        #[arg(long)]
        no_report: bool,
    },

    /// Print the summary of a saved report
    Show {
        /// Report JSON file
        report: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two saved reports
    Compare {
        /// First report
        first: PathBuf,

        /// Second report
        second: PathBuf,

        /// Also draw both loss curves into this SVG file
        #[arg(long, value_name = "FILE")]
        plot: Option<PathBuf>,
    },
}

/// Install the global subscriber: stdout, plus a plain-text file when given
fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(file_layer)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, experiment } => {
            init_logging(cli.verbose, None)?;
            cmd_init(&path, &experiment)
        }
        Commands::Demo {
            config,
            experiment,
            epochs,
            steps_per_epoch,
            log_dir,
            seed,
            no_report,
        } => {
            let config = resolve_config(config.as_deref(), experiment, log_dir)?;
            let log_file = config.log_dir.join(format!(
                "{}_{}.log",
                config.experiment_name,
                Utc::now().format("%Y%m%d_%H%M%S")
            ));
            init_logging(cli.verbose, Some(&log_file))?;
            demo::run(config, epochs, steps_per_epoch, seed, !no_report).await
        }
        Commands::Show { report, json } => {
            init_logging(cli.verbose, None)?;
            cmd_show(&report, json).await
        }
        Commands::Compare {
            first,
            second,
            plot,
        } => {
            init_logging(cli.verbose, None)?;
            cmd_compare(&first, &second, plot.as_deref()).await
        }
    }
}

fn cmd_init(path: &Path, experiment: &str) -> Result<()> {
    let config_path = path.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        anyhow::bail!("{} already exists", config_path.display());
    }

    let written = TrackingConfig::write_default(path, experiment)
        .with_context(|| format!("Failed to write config into {}", path.display()))?;
    info!("Wrote default config to {}", written.display());
    println!("Created {}", written.display());
    Ok(())
}

/// Config file (explicit or ./mltrack.toml) with command-line overrides applied
fn resolve_config(
    path: Option<&Path>,
    experiment: Option<String>,
    log_dir: Option<PathBuf>,
) -> Result<TrackingConfig> {
    let mut config = match path {
        Some(path) => TrackingConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TrackingConfig::load_or_default(Path::new("."), "demo")
            .context("Failed to load ./mltrack.toml")?,
    };

    if let Some(name) = experiment {
        config.experiment_name = name;
    }
    if let Some(dir) = log_dir {
        config.log_dir = dir;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn load_report(path: &Path) -> Result<TrainingReport> {
    TrainingReport::load(path)
        .await
        .with_context(|| format!("Failed to read report {}", path.display()))
}

fn print_summary(summary: &TrainingSummary) {
    let best = |v: Option<mltrack_core::BestValue>| {
        v.map_or_else(
            || "N/A".to_string(),
            |b| format!("{:.4} (epoch {}, step {})", b.value, b.epoch, b.step),
        )
    };

    println!("Experiment: {}", summary.experiment_name);
    println!("  Model:         {} ({})", summary.model_name, summary.framework);
    println!("  Run:           {}", summary.run_id);
    println!("  Epochs:        {}", summary.total_epochs);
    println!("  Steps:         {}", summary.total_steps);
    println!("  Best loss:     {}", best(summary.best_metrics.best_loss));
    println!("  Best accuracy: {}", best(summary.best_metrics.best_accuracy));
    match summary.training_duration_secs {
        Some(secs) => println!("  Duration:      {:.2}s", secs),
        None => println!("  Duration:      N/A"),
    }
}

async fn cmd_show(path: &Path, json: bool) -> Result<()> {
    let report = load_report(path).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.summary)?);
    } else {
        print_summary(&report.summary);
        println!("  Rows:          {}", report.metrics.len());
        println!("  Plots:         {}", report.plots_directory);
    }
    Ok(())
}

async fn cmd_compare(first: &Path, second: &Path, plot: Option<&Path>) -> Result<()> {
    let a = load_report(first).await?;
    let b = load_report(second).await?;

    println!("{}", RunComparison::between(&a.summary, &b.summary));

    if let Some(plot) = plot {
        let a_table = MetricsTable::from_rows(a.metrics);
        let b_table = MetricsTable::from_rows(b.metrics);
        let written = SvgPlotRenderer::new()
            .render_comparison(
                (a.summary.experiment_name.as_str(), &a_table),
                (b.summary.experiment_name.as_str(), &b_table),
                plot,
            )
            .await
            .with_context(|| format!("Failed to write {}", plot.display()))?;
        println!("Comparison plot: {}", written.display());
    }
    Ok(())
}

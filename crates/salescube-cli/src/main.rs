//! Salescube CLI - build the sales cube and extract ranked reports

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use salescube_core::config::{LoggingConfig, CONFIG_FILE};
use salescube_core::{Pipeline, PipelineConfig, RankReport};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "salescube")]
#[command(version = salescube_core::VERSION)]
#[command(about = "Multidimensional OLAP cubing and ranking for smart-sales data", long_about = None)]
struct Cli {
    /// Log filter (e.g. "debug", "salescube_core=trace"); overrides RUST_LOG and the config
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load facts, derive calendar dimensions, and write the cube
    Cube {
        /// Config file (defaults to ./salescube.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run ranking policies over a written cube
    Rank {
        /// Config file (defaults to ./salescube.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cube artifact to rank (defaults to the cube stage's output)
        #[arg(long)]
        cube: Option<PathBuf>,

        /// Only run these policies (repeatable)
        #[arg(long = "policy")]
        policies: Vec<String>,
    },

    /// Build the cube, then run every ranking policy
    Run {
        /// Config file (defaults to ./salescube.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List the ranking policies
    Policies {
        /// Config file (defaults to ./salescube.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Cube { config } => {
            let config = load_config(config.as_deref())?;
            let _guard = init_logging(&config.logging, cli.log_level.as_deref())?;

            let pipeline = Pipeline::new(config);
            let (cube, path) = pipeline.cube_stage().inspect_err(log_failure)?;
            println!("Cube with {} rows written to {}", cube.row_count(), path.display());
        }

        Commands::Rank {
            config,
            cube,
            policies,
        } => {
            let mut config = load_config(config.as_deref())?;
            let _guard = init_logging(&config.logging, cli.log_level.as_deref())?;
            if !policies.is_empty() {
                config.ranking.only = policies;
            }

            let selected = config.policies()?;
            let pipeline = Pipeline::new(config);
            let table = pipeline.load_cube(cube.as_deref()).inspect_err(log_failure)?;
            let report = pipeline.rank_stage(&table, &selected);
            summarize(&report)?;
        }

        Commands::Run { config } => {
            let config = load_config(config.as_deref())?;
            let _guard = init_logging(&config.logging, cli.log_level.as_deref())?;

            let report = Pipeline::new(config).run().inspect_err(log_failure)?;
            println!(
                "Cube with {} rows written to {}",
                report.cube_rows,
                report.cube_path.display()
            );
            summarize(&report.rank)?;
        }

        Commands::Policies { config } => {
            let config = load_config(config.as_deref())?;
            for policy in config.policies()? {
                println!("{policy}");
            }
        }
    }

    Ok(())
}

/// Explicit path, else ./salescube.toml if it exists, else the defaults
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let local = Path::new(CONFIG_FILE);
    let path = path.or_else(|| local.is_file().then_some(local));
    PipelineConfig::load(path).context("failed to load configuration")
}

/// Console output always; a file layer too when the config names a log file
///
/// The returned guard flushes the file writer and must outlive the run.
fn init_logging(logging: &LoggingConfig, override_level: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = match override_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?,
    };

    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file '{}' has no file name", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory '{}'", dir.display()))?;

            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;
    Ok(guard)
}

fn log_failure(err: &salescube_core::PipelineError) {
    tracing::error!(error = %err, "stage failed");
}

fn summarize(report: &RankReport) -> Result<()> {
    for path in report.artifacts() {
        println!("Wrote {}", path.display());
    }
    let failed: Vec<&str> = report.failures().map(|(name, _)| name).collect();
    if !failed.is_empty() {
        for (name, err) in report.failures() {
            eprintln!("Policy '{name}' failed: {err}");
        }
        bail!("{} of {} ranking policies failed: {}", failed.len(), report.outcomes.len(), failed.join(", "));
    }
    Ok(())
}

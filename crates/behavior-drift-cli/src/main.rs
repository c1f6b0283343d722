//! Behavior drift CLI: entry point.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::Serialize;

use behavior_drift_cli::commands::{lookup, pipeline};
use behavior_drift_cli::config::{resolve_data_dir, PipelineOverrides};
use behavior_drift_cli::session::DriftStore;
use behavior_drift_cli::types::{ServiceError, ServiceResult};

#[derive(Parser)]
#[command(
    name = "behavior-drift",
    about = "Unsupervised behavioral drift detection and explanation",
    version
)]
struct Cli {
    /// Directory holding the pipeline output tables.
    /// Also reads from BEHAVIOR_DRIFT_DATA_DIR.
    #[arg(long, global = true)]
    data_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build representations, scores, and explanations from observations.
    Run {
        /// Daily observations CSV.
        #[arg(long)]
        observations: PathBuf,

        #[command(flatten)]
        pipeline: PipelineOverrides,
    },

    /// Build the representations table only.
    Represent {
        /// Daily observations CSV.
        #[arg(long)]
        observations: PathBuf,

        #[command(flatten)]
        pipeline: PipelineOverrides,
    },

    /// Score drift from the representations table.
    Score {
        #[command(flatten)]
        pipeline: PipelineOverrides,
    },

    /// Explain scored days from the representations and scores tables.
    Explain {
        #[command(flatten)]
        pipeline: PipelineOverrides,
    },

    /// Check an observations file and print entity and row counts.
    Validate {
        /// Daily observations CSV.
        #[arg(long)]
        observations: PathBuf,

        #[command(flatten)]
        pipeline: PipelineOverrides,
    },

    /// Print an entity's full drift timeline.
    Timeline { entity_id: String },

    /// Print an entity's most recent drift score.
    Latest { entity_id: String },

    /// Print the explanation of an entity's strongest drift day.
    Explanation { entity_id: String },

    /// Print the first day of sustained drift.
    Onset {
        entity_id: String,

        /// Score threshold.
        #[arg(long)]
        threshold: Option<f64>,

        /// Consecutive days above threshold.
        #[arg(long)]
        run_length: Option<usize>,
    },

    /// Print score statistics for an entity.
    Summary {
        entity_id: String,

        /// Onset score threshold.
        #[arg(long)]
        threshold: Option<f64>,

        /// Onset run length.
        #[arg(long)]
        run_length: Option<usize>,
    },

    /// Start the HTTP query service.
    #[cfg(feature = "http")]
    Serve {
        /// Listen address (host:port).
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: String,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   behavior-drift completions bash > ~/.local/share/bash-completion/completions/behavior-drift
    ///   behavior-drift completions zsh > ~/.zfunc/_behavior-drift
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a lookup result, or exit 1 with the error message on stderr.
fn print_lookup<T: Serialize>(result: ServiceResult<T>) -> anyhow::Result<()> {
    match result {
        Ok(value) => print_json(&value),
        Err(e @ ServiceError::NotFound(_)) | Err(e @ ServiceError::InvalidParams(_)) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    let data_dir = resolve_data_dir(cli.data_dir.as_deref());

    match cli.command {
        Commands::Run {
            observations,
            pipeline: overrides,
        } => {
            tracing::info!("Data dir: {}", data_dir.display());
            print_json(&pipeline::run(&observations, &data_dir, &overrides)?)?;
        }

        Commands::Represent {
            observations,
            pipeline: overrides,
        } => {
            print_json(&pipeline::represent(&observations, &data_dir, &overrides)?)?;
        }

        Commands::Score {
            pipeline: overrides,
        } => {
            print_json(&pipeline::score(&data_dir, &overrides)?)?;
        }

        Commands::Explain {
            pipeline: overrides,
        } => {
            print_json(&pipeline::explain(&data_dir, &overrides)?)?;
        }

        Commands::Validate {
            observations,
            pipeline: overrides,
        } => match pipeline::validate(&observations, &overrides) {
            Ok(report) => {
                println!("Valid observations file: {}", observations.display());
                println!("  Entities: {}", report.entities);
                println!("  Features: {}", report.features.join(","));
                println!("  Observations: {}", report.observations.unwrap_or(0));
                println!("  Representations: {}", report.representations.unwrap_or(0));
            }
            Err(e) => {
                eprintln!("Invalid observations file: {e}");
                std::process::exit(1);
            }
        },

        Commands::Timeline { entity_id } => {
            let store = DriftStore::open(&data_dir)?;
            print_lookup(lookup::timeline(&store, &entity_id))?;
        }

        Commands::Latest { entity_id } => {
            let store = DriftStore::open(&data_dir)?;
            print_lookup(lookup::latest(&store, &entity_id))?;
        }

        Commands::Explanation { entity_id } => {
            let store = DriftStore::open(&data_dir)?;
            print_lookup(lookup::explanation(&store, &entity_id))?;
        }

        Commands::Onset {
            entity_id,
            threshold,
            run_length,
        } => {
            let store = DriftStore::open(&data_dir)?;
            print_lookup(
                lookup::onset_rule(threshold, run_length)
                    .and_then(|rule| lookup::onset(&store, &entity_id, rule)),
            )?;
        }

        Commands::Summary {
            entity_id,
            threshold,
            run_length,
        } => {
            let store = DriftStore::open(&data_dir)?;
            print_lookup(
                lookup::onset_rule(threshold, run_length)
                    .and_then(|rule| lookup::summary(&store, &entity_id, rule)),
            )?;
        }

        #[cfg(feature = "http")]
        Commands::Serve { addr } => {
            use behavior_drift_cli::transport::HttpTransport;

            tracing::info!("Behavior drift query service");
            tracing::info!("Data dir: {}", data_dir.display());
            let store = DriftStore::open(&data_dir)?;
            HttpTransport::new(store).run(&addr).await?;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "behavior-drift", &mut std::io::stdout());
        }
    }

    Ok(())
}

//! Glove CLI
//!
//! A command-line tool for recording labeled glove data, training gesture
//! classifiers, reading gestures and checking on a running glove agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{agent, collect, device::DeviceArgs, inspect, predict, scan, train};
use glove_lib::{ModelKind, OptimizerKind, PipelineConfig, ReadPolicy};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Glove gesture pipeline CLI
#[derive(Parser)]
#[command(name = "glovectl")]
#[command(author, version, long_about = None)]
#[command(about = "CLI for the capacitive glove gesture pipeline")]
pub struct Cli {
    /// Pipeline configuration file (defaults to ~/.config/glove/config.toml)
    #[arg(long, short, env = "GLOVE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Glove agent URL
    #[arg(long, env = "GLOVE_AGENT_URL", default_value = "http://localhost:8080")]
    pub agent_url: String,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Log pipeline internals to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for gloves
    Scan {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Record a labeled dataset
    Collect {
        #[command(flatten)]
        device: DeviceArgs,

        /// Dataset CSV to write (defaults to paths.dataset)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Number of passes over the gesture list
        #[arg(long)]
        sets: Option<usize>,

        /// Frames recorded per gesture per set
        #[arg(long)]
        reps: Option<usize>,
    },

    /// Train a classifier on a dataset
    Train {
        /// Dataset CSV to read (defaults to paths.dataset)
        #[arg(long, short)]
        dataset: Option<PathBuf>,

        /// Model artifact to write (defaults to paths.model)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Classifier variant (linear, feed_forward)
        #[arg(long)]
        model: Option<ModelKind>,

        /// Optimizer (sgd, adam)
        #[arg(long)]
        optimizer: Option<OptimizerKind>,

        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        learning_rate: Option<f32>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Read gestures from a glove
    Predict {
        #[command(flatten)]
        device: DeviceArgs,

        /// Number of gestures to read
        #[arg(long, short = 'n', default_value_t = 1)]
        count: usize,

        /// Skip the stale-buffer flush before each read
        #[arg(long)]
        fast: bool,

        /// Print every gesture change until Ctrl-C
        #[arg(long, conflicts_with = "count")]
        watch: bool,
    },

    /// Summarize a collected dataset
    Inspect {
        /// Dataset CSV to read (defaults to paths.dataset)
        #[arg(long, short)]
        dataset: Option<PathBuf>,
    },

    /// Query a running glove agent
    #[command(subcommand)]
    Agent(AgentCommands),
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Show agent health and readiness
    Status,

    /// Show the newest classified gesture
    Gesture,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let format = cli.format;

    match cli.command {
        Commands::Agent(agent_cmd) => {
            let client = client::ApiClient::new(&cli.agent_url)?;
            match agent_cmd {
                AgentCommands::Status => agent::show_status(&client, format).await?,
                AgentCommands::Gesture => agent::show_gesture(&client, format).await?,
            }
        }
        Commands::Scan { device } => {
            let config = config::load_pipeline_config(cli.config.as_deref())?;
            scan::scan(&config, &device, format)?;
        }
        Commands::Collect {
            device,
            output,
            sets,
            reps,
        } => {
            let mut config = config::load_pipeline_config(cli.config.as_deref())?;
            if let Some(sets) = sets {
                config.collection.num_sets = sets;
            }
            if let Some(reps) = reps {
                config.collection.num_reps = reps;
            }
            config.validate()?;
            collect::collect(&config, &device, output.as_deref(), format)?;
        }
        Commands::Train {
            dataset,
            output,
            model,
            optimizer,
            epochs,
            learning_rate,
            batch_size,
            seed,
        } => {
            let mut config = config::load_pipeline_config(cli.config.as_deref())?;
            apply_training_overrides(
                &mut config,
                model,
                optimizer,
                epochs,
                learning_rate,
                batch_size,
                seed,
            );
            config.validate()?;
            train::train(&config, dataset.as_deref(), output.as_deref(), format)?;
        }
        Commands::Predict {
            device,
            count,
            fast,
            watch,
        } => {
            let config = config::load_pipeline_config(cli.config.as_deref())?;
            let policy = if fast {
                ReadPolicy::Fast
            } else {
                ReadPolicy::Accurate
            };
            if watch {
                predict::watch(&config, &device, policy, format).await?;
            } else {
                predict::predict(&config, &device, count, policy, format)?;
            }
        }
        Commands::Inspect { dataset } => {
            let config = config::load_pipeline_config(cli.config.as_deref())?;
            inspect::inspect(&config, dataset.as_deref(), format)?;
        }
    }

    Ok(())
}

fn apply_training_overrides(
    config: &mut PipelineConfig,
    model: Option<ModelKind>,
    optimizer: Option<OptimizerKind>,
    epochs: Option<usize>,
    learning_rate: Option<f32>,
    batch_size: Option<usize>,
    seed: Option<u64>,
) {
    let training = &mut config.training;
    if let Some(model) = model {
        training.model = model;
    }
    if let Some(optimizer) = optimizer {
        training.optimizer = optimizer;
    }
    if let Some(epochs) = epochs {
        training.num_epochs = epochs;
    }
    if let Some(learning_rate) = learning_rate {
        training.learning_rate = learning_rate;
    }
    if let Some(batch_size) = batch_size {
        training.batch_size = batch_size;
    }
    if seed.is_some() {
        training.seed = seed;
    }
}

//! hipposeg CLI: train and evaluate the hippocampus segmentation pipeline.
//!
//! Runs an experiment by default; `config` and `split` subcommands help inspect
//! what a run would use.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// hipposeg: hippocampus segmentation training pipeline
#[derive(Parser, Debug)]
#[command(
    name = "hipposeg",
    version,
    about,
    long_about = None,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    run: RunArgs,

    /// Subcommand (defaults to `run`)
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options for a training run. Unset values fall back to the config layers.
#[derive(clap::Args, Debug, Clone, Default)]
struct RunArgs {
    /// Run label used in the output directory name
    #[arg(long)]
    name: Option<String>,

    /// Dataset root containing images/ and labels/
    #[arg(long)]
    root_dir: Option<PathBuf>,

    /// Number of training epochs
    #[arg(long)]
    n_epochs: Option<usize>,

    /// Optimizer learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Slices per training batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// In-slice size volumes are padded to
    #[arg(long)]
    patch_size: Option<usize>,

    /// Directory that receives run output directories
    #[arg(long)]
    test_results_dir: Option<PathBuf>,

    /// Seed for the split and batch shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Test with parameters from a saved model.json instead of training
    #[arg(long)]
    load_parameters: Option<PathBuf>,

    /// Stop after this many epochs without validation improvement
    #[arg(long)]
    early_stopping_patience: Option<usize>,

    /// Save an intermediate checkpoint every N epochs
    #[arg(long)]
    checkpoint_every: Option<usize>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Train, test and write results.json (the default)
    Run(RunArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the train/val/test split for a dataset of COUNT volumes
    Split {
        /// Number of volumes
        #[arg(long)]
        count: usize,

        /// Seed for a reproducible split
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration
    Init {
        /// Destination file
        #[arg(default_value = hipposeg_ml::config::CONFIG_FILE_NAME)]
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    let log_dir = directories::ProjectDirs::from("dev", "hipposeg", "hipposeg")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "hipposeg.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let command = cli.command.unwrap_or(Commands::Run(cli.run));
    commands::handle_command(command, cli.config.as_deref())
}

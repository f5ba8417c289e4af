use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use seq2seq_tune::logging::init_logging;
use seq2seq_tune::training::{GcsUploader, MetricsWriter, UploadConfig};
use seq2seq_tune::utils::io::{create_dir, get_last_checkpoint_path, load_json};
use seq2seq_tune::RunArguments;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "seq2seq-tune")]
#[command(about = "Run utilities for adapter-based seq2seq fine-tuning", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the newest checkpoint directory of a run
    LastCheckpoint {
        /// Run output directory
        #[arg(short, long)]
        output_dir: PathBuf,
    },

    /// Upload a directory to a GCS bucket with gsutil
    Upload {
        /// Local directory to upload
        #[arg(short, long)]
        dir: PathBuf,

        /// Bucket name
        #[arg(short, long, env = "GCS_BUCKET")]
        bucket: String,

        /// gsutil used for the first attempt
        #[arg(long, default_value = seq2seq_tune::training::upload::DEFAULT_GSUTIL_PATH)]
        gsutil: PathBuf,
    },

    /// Log a metrics JSON file and save it as <split>_results.json
    SaveMetrics {
        /// Split name, e.g. train, val or test
        #[arg(short, long)]
        split: String,

        /// JSON file holding a metrics object
        #[arg(short, long)]
        metrics: PathBuf,

        /// Run output directory
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Bucket receiving a copy of the output directory
        #[arg(short, long, env = "GCS_BUCKET")]
        bucket: Option<String>,
    },

    /// Flatten a run arguments file into training_arguments.json
    DumpArgs {
        /// Run arguments file (JSON, YAML or TOML)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show version information
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet, cli.json)?;

    match cli.command {
        Commands::LastCheckpoint { output_dir } => {
            let path = get_last_checkpoint_path(&output_dir)
                .with_context(|| format!("Failed to scan {}", output_dir.display()))?;
            println!("{}", path.display());
        }

        Commands::Upload { dir, bucket, gsutil } => {
            let config = UploadConfig {
                gsutil_path: gsutil,
                ..Default::default()
            };
            GcsUploader::system(config)
                .upload(&dir, &bucket)
                .context("Upload failed")?;
        }

        Commands::SaveMetrics {
            split,
            metrics,
            output_dir,
            bucket,
        } => {
            let metrics: Map<String, Value> =
                load_json(&metrics).context("Failed to read metrics file")?;
            create_dir(&output_dir).context("Failed to create output directory")?;
            let path = MetricsWriter::new(&output_dir, bucket).handle_metrics(&split, &metrics)?;
            info!("Metrics saved to {}", path.display());
        }

        Commands::DumpArgs { file } => {
            dump_args(file)?;
        }

        Commands::Info => {
            println!("seq2seq-tune {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Usage:");
            println!("  seq2seq-tune last-checkpoint -o outputs/rte");
            println!("  seq2seq-tune upload -d outputs/rte -b my-bucket");
            println!("  seq2seq-tune save-metrics -s val -m metrics.json -o outputs/rte");
            println!("  seq2seq-tune dump-args -f run.yaml");
        }
    }

    Ok(())
}

fn dump_args(file: PathBuf) -> Result<()> {
    let args = RunArguments::from_file(&file)
        .with_context(|| format!("Failed to load run arguments from {}", file.display()))?;
    let training = &args.training;

    create_dir(&training.output_dir).context("Failed to create output directory")?;
    let flat = args.training_args()?;
    let path = MetricsWriter::new(&training.output_dir, training.gcs_bucket.clone())
        .save_json_file(&flat, "training_arguments.json")?;

    info!("Saved {} arguments to {}", flat.len(), path.display());
    Ok(())
}

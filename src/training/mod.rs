//! Training run side effects
//!
//! Everything a trainer loop hands off while it runs: metrics files,
//! bucket uploads and the callbacks that trigger them.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use seq2seq_tune::training::{MetricsWriter, CheckpointUploadCallback, TrainerCallback};
//!
//! let writer = MetricsWriter::new(&args.training.output_dir, args.training.gcs_bucket.clone());
//! writer.handle_metrics("val", &metrics)?;
//!
//! let mut callback = CheckpointUploadCallback::default();
//! callback.on_save(&args.training, &state)?;
//! ```

pub mod callbacks;
pub mod metrics;
pub mod upload;

pub use callbacks::{CheckpointUploadCallback, TrainerCallback, TrainerState};
pub use metrics::{handle_metrics, save_json_file, MetricsWriter};
pub use upload::{CommandRunner, CommandStatus, GcsUploader, SystemRunner, UploadConfig};

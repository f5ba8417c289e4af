//! seq2seq-tune - run utilities for adapter-based seq2seq fine-tuning
//!
//! This crate covers the bookkeeping around a fine-tuning run: output
//! directories, metrics and argument files, checkpoint discovery, bucket
//! uploads, task-specific generation config and parameter freezing for
//! adapter training. Model definition and the trainer loop live elsewhere.

#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod error;
pub mod freezing;
pub mod logging;
pub mod model;
pub mod tasks;
pub mod training;
pub mod utils;

// Re-exports
pub use config::{
    get_training_args, AdapterArguments, AdapterConfigName, DataTrainingArguments,
    EvaluationStrategy, ModelArguments, RunArguments, TrainingArguments,
};
pub use error::{Error, Result};
pub use freezing::{assert_all_frozen, freeze_embeds, freeze_params, freezing_params, FreezeSummary};
pub use model::{ModelConfig, ModuleKind, ParameterRegistry, Seq2SeqModel};
pub use tasks::{reset_config, use_task_specific_params, TaskRegistry, TaskSpec};
pub use training::{
    handle_metrics, save_json_file, CheckpointUploadCallback, GcsUploader, MetricsWriter,
    TrainerCallback, TrainerState, UploadConfig,
};
pub use utils::io::{create_dir, get_last_checkpoint_path, save_json};

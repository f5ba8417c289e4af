//! Trainer callbacks

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TrainingArguments;
use crate::error::Result;
use crate::training::upload::{CommandRunner, GcsUploader, SystemRunner, UploadConfig};

/// Trainer progress passed to callbacks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainerState {
    /// Optimizer steps taken
    pub global_step: usize,
    /// Fractional epoch
    pub epoch: f64,
    /// Whether this process is the main process of a distributed run
    pub is_world_process_zero: bool,
}

impl Default for TrainerState {
    fn default() -> Self {
        Self {
            global_step: 0,
            epoch: 0.0,
            is_world_process_zero: true,
        }
    }
}

/// Hooks invoked by the trainer loop
pub trait TrainerCallback {
    /// Called after a checkpoint has been written
    fn on_save(&mut self, _args: &TrainingArguments, _state: &TrainerState) -> Result<()> {
        Ok(())
    }
}

/// Uploads the output directory to the bucket after each checkpoint save
#[derive(Debug, Clone)]
pub struct CheckpointUploadCallback<R = SystemRunner> {
    uploader: GcsUploader<R>,
}

impl Default for CheckpointUploadCallback<SystemRunner> {
    fn default() -> Self {
        Self::new(GcsUploader::system(UploadConfig::default()))
    }
}

impl<R: CommandRunner> CheckpointUploadCallback<R> {
    /// Callback using the given uploader
    pub fn new(uploader: GcsUploader<R>) -> Self {
        Self { uploader }
    }
}

impl<R: CommandRunner> TrainerCallback for CheckpointUploadCallback<R> {
    fn on_save(&mut self, args: &TrainingArguments, state: &TrainerState) -> Result<()> {
        if !state.is_world_process_zero {
            return Ok(());
        }
        match &args.gcs_bucket {
            Some(bucket) => {
                debug!("Uploading checkpoint at step {}", state.global_step);
                self.uploader.upload(&args.output_dir, bucket)
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::upload::{CommandStatus, MockCommandRunner};
    use test_case::test_case;

    #[test_case(true, Some("bucket"), 2 ; "main process with bucket uploads")]
    #[test_case(false, Some("bucket"), 0 ; "other processes skip")]
    #[test_case(true, None, 0 ; "no bucket skips")]
    fn test_on_save(is_world_process_zero: bool, bucket: Option<&str>, calls: usize) {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(calls)
            .returning(|_, _| Ok(CommandStatus::ok()));
        let mut callback = CheckpointUploadCallback::new(GcsUploader::new(runner, UploadConfig::default()));

        let args = TrainingArguments {
            gcs_bucket: bucket.map(str::to_string),
            ..Default::default()
        };
        let state = TrainerState {
            global_step: 1000,
            epoch: 1.0,
            is_world_process_zero,
        };
        callback.on_save(&args, &state).unwrap();
    }
}

//! Output directory upload to Google Cloud Storage
//!
//! Uploads shell out to `gsutil`. A remote copy is replaced wholesale: the
//! remote directory is removed first, then the local directory is copied.
//! The first attempt uses the SDK install path; if that attempt fails for
//! any reason the same sequence is retried with `gsutil` from `PATH`.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};

/// Default location of `gsutil` in a Cloud SDK install
pub const DEFAULT_GSUTIL_PATH: &str = "/root/google-cloud-sdk/bin/gsutil";

/// Outcome of one external command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    /// Whether the command exited successfully
    pub success: bool,
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
}

impl CommandStatus {
    /// Successful exit
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
        }
    }

    /// Failed exit with the given code
    pub fn failed(code: i32) -> Self {
        Self {
            success: false,
            code: Some(code),
        }
    }
}

/// Runs external programs
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Run `program` with `args` to completion. Errors only when the
    /// process cannot be started.
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandStatus>;
}

/// Runs commands with [`std::process::Command`], inheriting stdio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandStatus> {
        let status = Command::new(program).args(args).status()?;
        Ok(CommandStatus {
            success: status.success(),
            code: status.code(),
        })
    }
}

/// Upload settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// `gsutil` used for the first attempt
    pub gsutil_path: PathBuf,
    /// `gsutil` used for the retry, resolved through `PATH`
    pub fallback_program: String,
    /// Pass `-m` for parallel transfers
    pub parallel: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            gsutil_path: PathBuf::from(DEFAULT_GSUTIL_PATH),
            fallback_program: "gsutil".to_string(),
            parallel: true,
        }
    }
}

/// `gs://` URL that mirrors `upload_dir` inside `bucket`
pub fn remote_path(upload_dir: &Path, bucket: &str) -> String {
    let bucket = bucket.trim_start_matches("gs://").trim_end_matches('/');
    let dir = upload_dir.to_string_lossy();
    let dir = dir.trim_start_matches('/').trim_end_matches('/');
    if dir.is_empty() {
        format!("gs://{}", bucket)
    } else {
        format!("gs://{}/{}", bucket, dir)
    }
}

/// Uploads directories to a bucket
#[derive(Debug, Clone, Default)]
pub struct GcsUploader<R = SystemRunner> {
    runner: R,
    config: UploadConfig,
}

impl GcsUploader<SystemRunner> {
    /// Uploader running the real `gsutil`
    pub fn system(config: UploadConfig) -> Self {
        Self::new(SystemRunner, config)
    }
}

impl<R: CommandRunner> GcsUploader<R> {
    /// Create an uploader with a custom command runner
    pub fn new(runner: R, config: UploadConfig) -> Self {
        Self { runner, config }
    }

    /// Upload settings
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Replace the remote copy of `upload_dir` in `gcs_bucket` with the local one.
    #[instrument(skip(self, upload_dir))]
    pub fn upload(&self, upload_dir: impl AsRef<Path>, gcs_bucket: &str) -> Result<()> {
        let upload_dir = upload_dir.as_ref();
        let remote = remote_path(upload_dir, gcs_bucket);
        let primary = self.config.gsutil_path.to_string_lossy().into_owned();

        match self.sync(&primary, upload_dir, &remote) {
            Ok(()) => {
                info!("Uploaded {} to {}", upload_dir.display(), remote);
                Ok(())
            }
            Err(e) => {
                debug!("{} failed ({}), retrying with {}", primary, e, self.config.fallback_program);
                self.sync(&self.config.fallback_program, upload_dir, &remote)
                    .map_err(|e| {
                        warn!("Upload of {} to {} failed: {}", upload_dir.display(), remote, e);
                        e
                    })?;
                info!("Uploaded {} to {}", upload_dir.display(), remote);
                Ok(())
            }
        }
    }

    /// Remove the remote directory, then copy the local one over.
    fn sync(&self, program: &str, upload_dir: &Path, remote: &str) -> Result<()> {
        let rm_args = self.args(&["rm", "-r", remote]);
        let status = self.runner.run(program, &rm_args)?;
        if !status.success {
            // Nothing to remove on the first upload.
            debug!("{} rm exited with {:?}", program, status.code);
        }

        let local = upload_dir.to_string_lossy();
        let cp_args = self.args(&["cp", "-r", &local, remote]);
        let status = self.runner.run(program, &cp_args)?;
        if !status.success {
            return Err(Error::upload(format!(
                "{} cp exited with {:?}",
                program, status.code
            )));
        }
        Ok(())
    }

    fn args(&self, rest: &[&str]) -> Vec<String> {
        let mut args = Vec::with_capacity(rest.len() + 1);
        if self.config.parallel {
            args.push("-m".to_string());
        }
        args.extend(rest.iter().map(|s| s.to_string()));
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;
    use mockall::Sequence;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_remote_path_joins_bucket_and_dir() {
        assert_eq!(remote_path(Path::new("outputs/rte"), "my-bucket"), "gs://my-bucket/outputs/rte");
        assert_eq!(remote_path(Path::new("/abs/out/"), "gs://my-bucket/"), "gs://my-bucket/abs/out");
        assert_eq!(remote_path(Path::new(""), "my-bucket"), "gs://my-bucket");
    }

    #[test]
    fn test_primary_success_runs_rm_then_cp() {
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        runner
            .expect_run()
            .with(eq(DEFAULT_GSUTIL_PATH), eq(strings(&["-m", "rm", "-r", "gs://b/out"])))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(CommandStatus::failed(1)));
        runner
            .expect_run()
            .with(eq(DEFAULT_GSUTIL_PATH), eq(strings(&["-m", "cp", "-r", "out", "gs://b/out"])))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(CommandStatus::ok()));

        let uploader = GcsUploader::new(runner, UploadConfig::default());
        uploader.upload("out", "b").unwrap();
    }

    #[test]
    fn test_failed_copy_retries_with_path_gsutil() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, args| program == DEFAULT_GSUTIL_PATH && args[1] == "rm")
            .times(1)
            .returning(|_, _| Ok(CommandStatus::ok()));
        runner
            .expect_run()
            .withf(|program, args| program == DEFAULT_GSUTIL_PATH && args[1] == "cp")
            .times(1)
            .returning(|_, _| Ok(CommandStatus::failed(127)));
        runner
            .expect_run()
            .withf(|program, _| program == "gsutil")
            .times(2)
            .returning(|_, _| Ok(CommandStatus::ok()));

        let uploader = GcsUploader::new(runner, UploadConfig::default());
        uploader.upload("out", "b").unwrap();
    }

    #[test]
    fn test_missing_primary_binary_retries() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, _| program == DEFAULT_GSUTIL_PATH)
            .times(1)
            .returning(|_, _| Err(std::io::Error::from(std::io::ErrorKind::NotFound)));
        runner
            .expect_run()
            .withf(|program, _| program == "gsutil")
            .times(2)
            .returning(|_, _| Ok(CommandStatus::ok()));

        let uploader = GcsUploader::new(runner, UploadConfig::default());
        uploader.upload("out", "b").unwrap();
    }

    #[test]
    fn test_fallback_failure_is_reported() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, args| {
                if args.contains(&"cp".to_string()) {
                    Ok(CommandStatus::failed(1))
                } else {
                    Ok(CommandStatus::ok())
                }
            });

        let uploader = GcsUploader::new(runner, UploadConfig::default());
        let err = uploader.upload("out", "b").unwrap_err();
        assert!(matches!(err, Error::Upload(_)));
    }

    #[test]
    fn test_system_uploader_defaults() {
        let uploader = GcsUploader::system(UploadConfig::default());
        let config = uploader.config();
        assert_eq!(config.gsutil_path, PathBuf::from(DEFAULT_GSUTIL_PATH));
        assert_eq!(config.fallback_program, "gsutil");
        assert!(config.parallel);
    }

    #[test]
    fn test_serial_transfer_omits_parallel_flag() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, args| args.first().map(String::as_str) != Some("-m"))
            .times(2)
            .returning(|_, _| Ok(CommandStatus::ok()));

        let config = UploadConfig {
            parallel: false,
            ..Default::default()
        };
        GcsUploader::new(runner, config).upload("out", "b").unwrap();
    }
}

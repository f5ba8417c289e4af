//! Metrics logging and result files
//!
//! Results of each split are logged key by key and written to
//! `<output_dir>/<split>_results.json`. When a bucket is configured the
//! whole output directory is uploaded after every write.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::Result;
use crate::training::upload::{CommandRunner, GcsUploader, SystemRunner, UploadConfig};
use crate::utils::io::save_json;

/// Writes metrics and other result dictionaries into a run directory
#[derive(Debug, Clone)]
pub struct MetricsWriter<R = SystemRunner> {
    output_dir: PathBuf,
    gcs_bucket: Option<String>,
    uploader: GcsUploader<R>,
}

impl MetricsWriter<SystemRunner> {
    /// Writer uploading with the system `gsutil`
    pub fn new(output_dir: impl Into<PathBuf>, gcs_bucket: Option<String>) -> Self {
        Self::with_uploader(output_dir, gcs_bucket, GcsUploader::system(UploadConfig::default()))
    }
}

impl<R: CommandRunner> MetricsWriter<R> {
    /// Writer with a custom uploader
    pub fn with_uploader(
        output_dir: impl Into<PathBuf>,
        gcs_bucket: Option<String>,
        uploader: GcsUploader<R>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            gcs_bucket,
            uploader,
        }
    }

    /// Run directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Log `metrics` for `split` in key order and save them as
    /// `<split>_results.json`.
    pub fn handle_metrics(&self, split: &str, metrics: &Map<String, Value>) -> Result<PathBuf> {
        info!("***** {} metrics *****", split);
        let mut keys: Vec<&String> = metrics.keys().collect();
        keys.sort();
        for key in keys {
            info!("  {} = {}", key, display_value(&metrics[key]));
        }
        self.save_json_file(metrics, &format!("{}_results.json", split))
    }

    /// Save `content` as `outfile_name` in the run directory, then upload the
    /// directory if a bucket is configured.
    pub fn save_json_file<T>(&self, content: &T, outfile_name: &str) -> Result<PathBuf>
    where
        T: Serialize + ?Sized,
    {
        let path = self.output_dir.join(outfile_name);
        save_json(content, &path)?;
        if let Some(bucket) = &self.gcs_bucket {
            info!("***** Uploading results into gs-bucket *****");
            self.uploader.upload(&self.output_dir, bucket)?;
        }
        Ok(path)
    }
}

/// Log and save split metrics, uploading with the system `gsutil`
pub fn handle_metrics(
    split: &str,
    metrics: &Map<String, Value>,
    output_dir: impl AsRef<Path>,
    gcs_bucket: Option<&str>,
) -> Result<PathBuf> {
    MetricsWriter::new(output_dir.as_ref(), gcs_bucket.map(str::to_string))
        .handle_metrics(split, metrics)
}

/// Save a JSON file into `output_dir`, uploading with the system `gsutil`
pub fn save_json_file<T>(
    content: &T,
    outfile_name: &str,
    output_dir: impl AsRef<Path>,
    gcs_bucket: Option<&str>,
) -> Result<PathBuf>
where
    T: Serialize + ?Sized,
{
    MetricsWriter::new(output_dir.as_ref(), gcs_bucket.map(str::to_string))
        .save_json_file(content, outfile_name)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

//! Utility functions for run directories and JSON files

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Prefix of checkpoint directories written by the trainer
pub const CHECKPOINT_PREFIX: &str = "checkpoint-";

/// File I/O utilities
pub mod io {
    use super::*;
    use serde::Serialize;
    use serde_json::ser::PrettyFormatter;
    use tracing::debug;

    /// Create `output_dir` and its parents unless the path already exists.
    pub fn create_dir<P: AsRef<Path>>(output_dir: P) -> Result<()> {
        let path = output_dir.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)?;
            debug!("Created directory {}", path.display());
        }
        Ok(())
    }

    /// Serialize `content` as JSON with 4-space indentation and write it to `path`.
    pub fn save_json<T, P>(content: &T, path: P) -> Result<()>
    where
        T: Serialize + ?Sized,
        P: AsRef<Path>,
    {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        content.serialize(&mut serializer)?;
        fs::write(path.as_ref(), buf)?;
        Ok(())
    }

    /// Read a JSON file into any deserializable type
    pub fn load_json<T, P>(path: P) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        P: AsRef<Path>,
    {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Find the newest `checkpoint-<step>` entry under `output_dir`.
    ///
    /// Falls back to `output_dir` itself when no checkpoint exists, so the
    /// result can always be handed to a "resume from" option.
    pub fn get_last_checkpoint_path<P: AsRef<Path>>(output_dir: P) -> Result<PathBuf> {
        let output_dir = output_dir.as_ref();
        let entries = match fs::read_dir(output_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(output_dir.to_path_buf());
            }
            Err(e) => return Err(e.into()),
        };

        let mut last_step: Option<u64> = None;
        for entry in entries {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(CHECKPOINT_PREFIX) {
                continue;
            }
            match checkpoint_step(&name) {
                Some(step) => last_step = Some(last_step.map_or(step, |s| s.max(step))),
                None => debug!("Skipping {} with non-numeric step", name),
            }
        }

        Ok(match last_step {
            Some(step) => output_dir.join(format!("{}{}", CHECKPOINT_PREFIX, step)),
            None => output_dir.to_path_buf(),
        })
    }

    /// Step number encoded after the last `-` of a checkpoint name
    pub fn checkpoint_step(name: &str) -> Option<u64> {
        name.rsplit('-').next()?.parse().ok()
    }
}

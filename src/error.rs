//! Error types for seq2seq-tune

use thiserror::Error;

/// Main error type for run utilities
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Tensor operation error
    #[error("Tensor operation error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Task name missing from the task registry
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// Model does not declare a module the operation needs
    #[error("Model has no {0} module")]
    MissingModule(String),

    /// Parameters expected to be frozen still require gradients
    #[error("{count} parameters of {module} are not frozen: {names:?}")]
    NotFrozen {
        /// Module that was checked
        module: String,
        /// Number of trainable parameters found
        count: usize,
        /// Names of the trainable parameters
        names: Vec<String>,
    },

    /// Bucket upload failed
    #[error("Upload error: {0}")]
    Upload(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for run utilities
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a missing module error
    pub fn missing_module(module: impl Into<String>) -> Self {
        Self::MissingModule(module.into())
    }

    /// Create an upload error
    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

//! Handle on an externally built seq2seq model
//!
//! The model architecture lives elsewhere. Run utilities only need its
//! configuration and its parameters grouped by module role, which is what
//! [`Seq2SeqModel`] carries.

pub mod config;
pub mod registry;

pub use config::ModelConfig;
pub use registry::{ModuleInfo, ModuleKind, ParameterRegistry};

/// Model configuration plus parameters
#[derive(Debug, Clone, Default)]
pub struct Seq2SeqModel {
    /// Generation and architecture config
    pub config: ModelConfig,
    /// Parameters and module layout
    pub params: ParameterRegistry,
}

impl Seq2SeqModel {
    /// Create a model handle
    pub fn new(config: ModelConfig, params: ParameterRegistry) -> Self {
        Self { config, params }
    }
}

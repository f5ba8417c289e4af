//! Run argument groups for adapter fine-tuning
//!
//! The four argument groups mirror how a fine-tuning run is described:
//! model selection and freezing flags, data limits, trainer settings and
//! adapter settings. They load together from a single file with
//! environment overrides and flatten into one JSON map for persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// Environment prefix for argument overrides, e.g. `SEQ2SEQ__TRAINING__GCS_BUCKET`
pub const ENV_PREFIX: &str = "SEQ2SEQ";

/// Key dropped from flattened arguments
pub const EVALUATION_STRATEGY_KEY: &str = "evaluation_strategy";

/// All argument groups of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunArguments {
    /// Model arguments
    pub model: ModelArguments,
    /// Data arguments
    pub data: DataTrainingArguments,
    /// Trainer arguments
    pub training: TrainingArguments,
    /// Adapter arguments
    pub adapter: AdapterArguments,
}

impl RunArguments {
    /// Load arguments from a JSON/YAML/TOML file, then apply `SEQ2SEQ__*`
    /// environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let args: Self = settings.try_deserialize()?;
        args.validate()?;
        debug!("Loaded run arguments from {}", path.display());
        Ok(args)
    }

    /// Validate argument values
    pub fn validate(&self) -> Result<()> {
        if self.training.output_dir.as_os_str().is_empty() {
            return Err(Error::config("training.output_dir must not be empty"));
        }
        if self.model.model_name_or_path.is_empty() {
            return Err(Error::config("model.model_name_or_path must not be empty"));
        }
        if self.adapter.reduction_factor == 0 {
            return Err(Error::config("adapter.reduction_factor must be > 0"));
        }
        Ok(())
    }

    /// Flatten all groups into one JSON map suitable for `training_arguments.json`
    pub fn training_args(&self) -> Result<Map<String, Value>> {
        get_training_args(&[
            serde_json::to_value(&self.model)?,
            serde_json::to_value(&self.data)?,
            serde_json::to_value(&self.training)?,
            serde_json::to_value(&self.adapter)?,
        ])
    }
}

/// Merge argument groups into a single map, later groups overriding earlier
/// keys, without the evaluation strategy.
pub fn get_training_args(groups: &[Value]) -> Result<Map<String, Value>> {
    let mut all_arguments = Map::new();
    for group in groups {
        let object = group.as_object().ok_or_else(|| {
            Error::invalid_input(format!("argument group is not an object: {}", group))
        })?;
        for (key, value) in object {
            all_arguments.insert(key.clone(), value.clone());
        }
    }
    all_arguments.remove(EVALUATION_STRATEGY_KEY);
    Ok(all_arguments)
}

/// Model selection and freezing flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelArguments {
    /// Pretrained model name or local path
    pub model_name_or_path: String,
    /// Config name if different from the model
    pub config_name: Option<String>,
    /// Tokenizer name if different from the model
    pub tokenizer_name: Option<String>,
    /// Cache directory for pretrained weights
    pub cache_dir: Option<PathBuf>,
    /// Freeze the whole encoder stack
    pub freeze_encoder: bool,
    /// Freeze token and position embeddings
    pub freeze_embeds: bool,
    /// Freeze every parameter
    pub freeze_model: bool,
    /// Freeze every parameter except the LM head
    pub freeze_model_but_lm_head: bool,
    /// Unfreeze the LM head after other freezing
    pub unfreeze_lm_head: bool,
    /// Freeze every parameter except parametric task embeddings
    pub freeze_model_but_task_embeddings: bool,
    /// Unfreeze all layer norms after other freezing
    pub unfreeze_layer_norms: bool,
}

impl Default for ModelArguments {
    fn default() -> Self {
        Self {
            model_name_or_path: "t5-base".to_string(),
            config_name: None,
            tokenizer_name: None,
            cache_dir: None,
            freeze_encoder: false,
            freeze_embeds: false,
            freeze_model: false,
            freeze_model_but_lm_head: false,
            unfreeze_lm_head: false,
            freeze_model_but_task_embeddings: false,
            unfreeze_layer_norms: false,
        }
    }
}

/// Dataset selection and sequence limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataTrainingArguments {
    /// Tasks to train on
    pub tasks: Vec<String>,
    /// Tasks to evaluate on
    pub eval_tasks: Vec<String>,
    /// Max tokenized source length
    pub max_source_length: usize,
    /// Max tokenized target length
    pub max_target_length: usize,
    /// Max target length during validation
    pub val_max_target_length: usize,
    /// Max target length during test
    pub test_max_target_length: usize,
    /// Limit on training examples per task
    pub n_train: Option<usize>,
    /// Limit on validation examples per task
    pub n_val: Option<usize>,
    /// Limit on test examples per task
    pub n_test: Option<usize>,
    /// Beams used during evaluation generation
    pub eval_beams: Option<usize>,
    /// Ignore pad tokens in the loss
    pub ignore_pad_token_for_loss: bool,
    /// Seed for data shuffling
    pub data_seed: u64,
}

impl Default for DataTrainingArguments {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            eval_tasks: Vec::new(),
            max_source_length: 128,
            max_target_length: 128,
            val_max_target_length: 128,
            test_max_target_length: 128,
            n_train: None,
            n_val: None,
            n_test: None,
            eval_beams: None,
            ignore_pad_token_for_loss: true,
            data_seed: 42,
        }
    }
}

/// When the trainer evaluates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStrategy {
    /// Never evaluate during training
    #[default]
    No,
    /// Evaluate every `eval_steps`
    Steps,
    /// Evaluate at the end of each epoch
    Epoch,
}

/// Trainer settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingArguments {
    /// Directory receiving checkpoints, metrics and arguments
    pub output_dir: PathBuf,
    /// Overwrite an existing output directory
    pub overwrite_output_dir: bool,
    /// Run training
    pub do_train: bool,
    /// Run evaluation
    pub do_eval: bool,
    /// Run test predictions
    pub do_test: bool,
    /// Evaluation schedule
    pub evaluation_strategy: EvaluationStrategy,
    /// Peak learning rate
    pub learning_rate: f64,
    /// Number of training epochs
    pub num_train_epochs: f64,
    /// Batch size per device during training
    pub per_device_train_batch_size: usize,
    /// Batch size per device during evaluation
    pub per_device_eval_batch_size: usize,
    /// Linear warmup steps
    pub warmup_steps: usize,
    /// Steps between log records
    pub logging_steps: usize,
    /// Steps between checkpoints
    pub save_steps: usize,
    /// Steps between evaluations
    pub eval_steps: Option<usize>,
    /// Random seed
    pub seed: u64,
    /// Label smoothing epsilon
    pub label_smoothing: f64,
    /// Use generation for evaluation metrics
    pub predict_with_generate: bool,
    /// Train only adapter parameters
    pub train_adapters: bool,
    /// Bucket receiving a copy of the output directory
    pub gcs_bucket: Option<String>,
    /// Log parameter counts after freezing
    pub print_num_parameters: bool,
}

impl Default for TrainingArguments {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            overwrite_output_dir: false,
            do_train: false,
            do_eval: false,
            do_test: false,
            evaluation_strategy: EvaluationStrategy::No,
            learning_rate: 3e-4,
            num_train_epochs: 3.0,
            per_device_train_batch_size: 8,
            per_device_eval_batch_size: 8,
            warmup_steps: 0,
            logging_steps: 500,
            save_steps: 1000,
            eval_steps: None,
            seed: 42,
            label_smoothing: 0.0,
            predict_with_generate: false,
            train_adapters: false,
            gcs_bucket: None,
            print_num_parameters: false,
        }
    }
}

/// Adapter flavour inserted into the model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AdapterConfigName {
    /// Independent adapter per task
    #[default]
    #[serde(rename = "adapter")]
    Adapter,
    /// Adapters generated from task embeddings by a hypernetwork
    #[serde(rename = "meta-adapter")]
    MetaAdapter,
}

/// Adapter settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdapterArguments {
    /// Adapter flavour
    pub adapter_config_name: AdapterConfigName,
    /// Dimension of task embeddings
    pub task_embedding_dim: Option<usize>,
    /// Hidden size divisor of adapter bottlenecks
    pub reduction_factor: usize,
    /// Adapter non-linearity
    pub non_linearity: String,
    /// Share one hypernetwork across all layers
    pub unique_hyper_net: bool,
    /// Train task embeddings through a projection
    pub train_task_embeddings: bool,
    /// Size of projected task embeddings
    pub projected_task_embedding_dim: usize,
    /// Generate layer norm weights from task embeddings
    pub conditional_layer_norm: bool,
    /// Generate T5 layer norm weights from task embeddings
    #[serde(rename = "conditional_layer_norm_for_T5", alias = "conditional_layer_norm_for_t5")]
    pub conditional_layer_norm_for_t5: bool,
    /// Layer norm before each adapter
    pub add_layer_norm_before_adapter: bool,
    /// Layer norm after each adapter
    pub add_layer_norm_after_adapter: bool,
}

impl Default for AdapterArguments {
    fn default() -> Self {
        Self {
            adapter_config_name: AdapterConfigName::Adapter,
            task_embedding_dim: None,
            reduction_factor: 16,
            non_linearity: "swish".to_string(),
            unique_hyper_net: false,
            train_task_embeddings: false,
            projected_task_embedding_dim: 64,
            conditional_layer_norm: false,
            conditional_layer_norm_for_t5: false,
            add_layer_norm_before_adapter: false,
            add_layer_norm_after_adapter: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_get_training_args_merges_and_drops_strategy() {
        let merged = get_training_args(&[
            json!({"a": 1, "shared": "first"}),
            json!({"b": 2, "shared": "second", "evaluation_strategy": "steps"}),
        ])
        .unwrap();

        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!(2)));
        assert_eq!(merged.get("shared"), Some(&json!("second")));
        assert!(!merged.contains_key(EVALUATION_STRATEGY_KEY));
    }

    #[test]
    fn test_get_training_args_rejects_non_objects() {
        let err = get_training_args(&[json!([1, 2])]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_run_arguments_flatten() {
        let mut args = RunArguments::default();
        args.training.train_adapters = true;
        args.adapter.adapter_config_name = AdapterConfigName::MetaAdapter;

        let flat = args.training_args().unwrap();
        assert_eq!(flat.get("train_adapters"), Some(&json!(true)));
        assert_eq!(flat.get("adapter_config_name"), Some(&json!("meta-adapter")));
        assert_eq!(flat.get("conditional_layer_norm_for_T5"), Some(&json!(false)));
        assert_eq!(flat.get("model_name_or_path"), Some(&json!("t5-base")));
        assert!(!flat.contains_key("evaluation_strategy"));
    }

    #[test]
    fn test_from_yaml_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.yaml");
        fs::write(
            &path,
            r#"
model:
  model_name_or_path: t5-small
  freeze_embeds: true
training:
  output_dir: /tmp/run
  train_adapters: true
  evaluation_strategy: epoch
adapter:
  adapter_config_name: meta-adapter
  unique_hyper_net: true
data:
  tasks: [rte, mrpc]
"#,
        )
        .unwrap();

        let args = RunArguments::from_file(&path).unwrap();
        assert_eq!(args.model.model_name_or_path, "t5-small");
        assert!(args.model.freeze_embeds);
        assert!(args.training.train_adapters);
        assert_eq!(args.training.evaluation_strategy, EvaluationStrategy::Epoch);
        assert_eq!(args.adapter.adapter_config_name, AdapterConfigName::MetaAdapter);
        assert!(args.adapter.unique_hyper_net);
        assert_eq!(args.data.tasks, vec!["rte", "mrpc"]);
        // Untouched fields keep their defaults
        assert_eq!(args.adapter.reduction_factor, 16);
    }

    #[test]
    fn test_environment_overrides_file_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.yaml");
        fs::write(
            &path,
            r#"
model:
  model_name_or_path: t5-small
  freeze_embeds: false
training:
  output_dir: /tmp/run
adapter:
  conditional_layer_norm_for_T5: true
"#,
        )
        .unwrap();

        std::env::set_var("SEQ2SEQ__TRAINING__GCS_BUCKET", "my-bucket");
        std::env::set_var("SEQ2SEQ__MODEL__FREEZE_EMBEDS", "true");
        let loaded = RunArguments::from_file(&path);
        std::env::remove_var("SEQ2SEQ__TRAINING__GCS_BUCKET");
        std::env::remove_var("SEQ2SEQ__MODEL__FREEZE_EMBEDS");

        let args = loaded.unwrap();
        assert_eq!(args.training.gcs_bucket.as_deref(), Some("my-bucket"));
        assert!(args.model.freeze_embeds);
        assert!(args.adapter.conditional_layer_norm_for_t5);
        assert_eq!(args.model.model_name_or_path, "t5-small");
    }

    #[test]
    fn test_validate_rejects_zero_reduction_factor() {
        let mut args = RunArguments::default();
        args.adapter.reduction_factor = 0;
        assert!(matches!(args.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_model_name() {
        let mut args = RunArguments::default();
        args.model.model_name_or_path.clear();
        assert!(args.validate().is_err());
    }
}

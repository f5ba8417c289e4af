//! Parameter freezing for adapter fine-tuning
//!
//! [`freezing_params`] turns the freezing flags of a run into trainable
//! flags on the model's parameters. Flags are applied in a fixed order and
//! later flags win, so e.g. `freeze_model` followed by `unfreeze_lm_head`
//! leaves only the LM head trainable.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{AdapterArguments, AdapterConfigName, ModelArguments, TrainingArguments};
use crate::error::{Error, Result};
use crate::model::{ModuleKind, ParameterRegistry, Seq2SeqModel};

/// Parameter counts after freezing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreezeSummary {
    /// Scalar parameters in the model
    pub total: usize,
    /// Scalar parameters left trainable
    pub trainable: usize,
}

impl fmt::Display for FreezeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let percent = if self.total == 0 {
            0.0
        } else {
            self.trainable as f64 * 100.0 / self.total as f64
        };
        write!(
            f,
            "{} of {} parameters trainable ({:.2}%)",
            self.trainable, self.total, percent
        )
    }
}

/// Freeze every parameter under `path` (empty path = whole model)
pub fn freeze_params(registry: &mut ParameterRegistry, path: &str) -> Result<usize> {
    registry.set_requires_grad(path, false)
}

/// Freeze all embedding modules (shared, token and position embeddings)
pub fn freeze_embeds(model: &mut Seq2SeqModel) -> Result<usize> {
    set_kind(&mut model.params, ModuleKind::Embedding, false)
}

/// Fail with [`Error::NotFrozen`] if any parameter under `path` is trainable
pub fn assert_all_frozen(registry: &ParameterRegistry, path: &str) -> Result<()> {
    let names = registry.trainable_parameter_names(path)?;
    if names.is_empty() {
        return Ok(());
    }
    let module = if path.is_empty() { "model" } else { path };
    Err(Error::NotFrozen {
        module: module.to_string(),
        count: names.len(),
        names,
    })
}

/// Apply the freezing flags of a run to the model.
pub fn freezing_params(
    model: &mut Seq2SeqModel,
    training_args: &TrainingArguments,
    model_args: &ModelArguments,
    adapter_args: &AdapterArguments,
) -> Result<FreezeSummary> {
    let meta_adapter = adapter_args.adapter_config_name == AdapterConfigName::MetaAdapter;
    let params = &mut model.params;

    // Only adapter controllers (and task embeddings for meta-adapters) train.
    if training_args.train_adapters {
        freeze_params(params, "")?;
        set_kind(params, ModuleKind::MetaAdapterController, true)?;
        set_kind(params, ModuleKind::AdapterController, true)?;
        if meta_adapter {
            let controller = required_path(params, ModuleKind::TaskEmbeddingController)?;
            params.set_requires_grad(&controller, true)?;
        }
        if adapter_args.unique_hyper_net {
            set_kind(params, ModuleKind::AdapterLayersHyperNetController, true)?;
            set_kind(params, ModuleKind::AdapterController, true)?;
        }
    }

    if model_args.freeze_model {
        freeze_params(params, "")?;
    }

    if model_args.freeze_model_but_lm_head {
        freeze_params(params, "")?;
        let lm_head = required_path(params, ModuleKind::LmHead)?;
        params.set_requires_grad(&lm_head, true)?;
    }

    if model_args.freeze_embeds {
        set_kind(params, ModuleKind::Embedding, false)?;
    }

    if model_args.freeze_encoder {
        let encoder = required_path(params, ModuleKind::Encoder)?;
        freeze_params(params, &encoder)?;
        assert_all_frozen(params, &encoder)?;
    }

    // Non-parametric task embeddings have nothing to unfreeze.
    if model_args.freeze_model_but_task_embeddings {
        freeze_params(params, "")?;
        if meta_adapter {
            let controller = params
                .module_by_kind(ModuleKind::TaskEmbeddingController)
                .cloned()
                .ok_or_else(|| Error::missing_module(ModuleKind::TaskEmbeddingController.to_string()))?;
            let embeddings = params
                .modules_of_kind(ModuleKind::TaskEmbeddings)
                .find(|m| controller.contains(&m.path))
                .map(|m| m.path.clone());
            match embeddings {
                Some(path) => {
                    params.set_requires_grad(&path, true)?;
                }
                None => debug!("Task embeddings are not parametric, nothing to unfreeze"),
            }
        }
    }

    if model_args.unfreeze_lm_head {
        let lm_head = required_path(params, ModuleKind::LmHead)?;
        params.set_requires_grad(&lm_head, true)?;
    }

    if model_args.unfreeze_layer_norms {
        set_kind(params, ModuleKind::LayerNorm, true)?;
    }

    if adapter_args.conditional_layer_norm_for_t5 {
        set_kind(params, ModuleKind::LayerNormHyperNet, true)?;
    }

    let summary = FreezeSummary {
        total: params.num_parameters()?,
        trainable: params.num_trainable_parameters()?,
    };
    if training_args.print_num_parameters {
        info!("{}", summary);
    } else {
        debug!("{}", summary);
    }
    Ok(summary)
}

fn set_kind(params: &mut ParameterRegistry, kind: ModuleKind, requires_grad: bool) -> Result<usize> {
    let paths: Vec<String> = params.modules_of_kind(kind).map(|m| m.path.clone()).collect();
    let mut touched = 0;
    for path in &paths {
        touched += params.set_requires_grad(path, requires_grad)?;
    }
    Ok(touched)
}

fn required_path(params: &ParameterRegistry, kind: ModuleKind) -> Result<String> {
    params
        .module_by_kind(kind)
        .map(|m| m.path.clone())
        .ok_or_else(|| Error::missing_module(kind.to_string()))
}

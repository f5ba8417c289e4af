//! Parameter registry with module kinds and trainable flags

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use candle_core::{DType, Device, Shape, Tensor, Var};
use candle_nn::{Init, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};

/// Role of a declared module inside a seq2seq model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Encoder stack
    Encoder,
    /// Decoder stack
    Decoder,
    /// Token or position embeddings
    Embedding,
    /// Final vocabulary projection
    LmHead,
    /// T5-style layer norm
    LayerNorm,
    /// Per-task adapter controller
    AdapterController,
    /// Hypernetwork-driven adapter controller
    MetaAdapterController,
    /// Hypernetwork generating adapters for all layers
    AdapterLayersHyperNetController,
    /// Hypernetwork generating layer norm weights
    LayerNormHyperNet,
    /// Controller computing task embeddings
    TaskEmbeddingController,
    /// Learned task embedding table
    TaskEmbeddings,
    /// Anything else
    Other,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleKind::Encoder => "encoder",
            ModuleKind::Decoder => "decoder",
            ModuleKind::Embedding => "embedding",
            ModuleKind::LmHead => "lm_head",
            ModuleKind::LayerNorm => "layer_norm",
            ModuleKind::AdapterController => "adapter_controller",
            ModuleKind::MetaAdapterController => "meta_adapter_controller",
            ModuleKind::AdapterLayersHyperNetController => "adapter_layers_hyper_net_controller",
            ModuleKind::LayerNormHyperNet => "layer_norm_hyper_net",
            ModuleKind::TaskEmbeddingController => "task_embedding_controller",
            ModuleKind::TaskEmbeddings => "task_embeddings",
            ModuleKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A declared submodule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Dotted path, e.g. `encoder.block.0.layer.0.layer_norm`
    pub path: String,
    /// Module role
    pub kind: ModuleKind,
}

impl ModuleInfo {
    /// Whether a parameter name lives under this module
    pub fn contains(&self, parameter: &str) -> bool {
        is_under(parameter, &self.path)
    }
}

fn is_under(parameter: &str, path: &str) -> bool {
    path.is_empty()
        || parameter == path
        || (parameter.starts_with(path) && parameter.as_bytes().get(path.len()) == Some(&b'.'))
}

/// Parameters of a model held in a candle [`VarMap`], together with the
/// module layout and which parameters receive gradient updates.
///
/// Parameters are trainable until frozen. Only [`trainable_vars`] should be
/// handed to an optimizer.
///
/// [`trainable_vars`]: ParameterRegistry::trainable_vars
#[derive(Clone)]
pub struct ParameterRegistry {
    varmap: VarMap,
    modules: Vec<ModuleInfo>,
    frozen: HashSet<String>,
}

impl fmt::Debug for ParameterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterRegistry")
            .field("modules", &self.modules)
            .field("frozen", &self.frozen.len())
            .finish()
    }
}

impl Default for ParameterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::from_varmap(VarMap::new())
    }

    /// Wrap an existing variable map
    pub fn from_varmap(varmap: VarMap) -> Self {
        Self {
            varmap,
            modules: Vec::new(),
            frozen: HashSet::new(),
        }
    }

    /// Underlying variable map
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Variable builder backed by this registry
    pub fn var_builder(&self, dtype: DType, device: &Device) -> VarBuilder<'static> {
        VarBuilder::from_varmap(&self.varmap, dtype, device)
    }

    /// Create (or fetch) a zero-initialised parameter
    pub fn add_parameter<S: Into<Shape>>(
        &self,
        name: &str,
        shape: S,
        device: &Device,
    ) -> Result<Tensor> {
        Ok(self
            .varmap
            .get(shape, name, Init::Const(0.0), DType::F32, device)?)
    }

    /// Declare a module at `path`; redeclaring a path replaces its kind
    pub fn declare_module(&mut self, path: impl Into<String>, kind: ModuleKind) -> &mut Self {
        let path = path.into();
        match self.modules.iter_mut().find(|m| m.path == path) {
            Some(module) => module.kind = kind,
            None => self.modules.push(ModuleInfo { path, kind }),
        }
        self
    }

    /// Declared modules in declaration order
    pub fn named_modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    /// Declared modules of the given kind
    pub fn modules_of_kind(&self, kind: ModuleKind) -> impl Iterator<Item = &ModuleInfo> + '_ {
        self.modules.iter().filter(move |m| m.kind == kind)
    }

    /// First declared module of the given kind
    pub fn module_by_kind(&self, kind: ModuleKind) -> Option<&ModuleInfo> {
        self.modules_of_kind(kind).next()
    }

    /// Sorted names of all parameters under `path` (empty path = whole model)
    pub fn parameter_names(&self, path: &str) -> Result<Vec<String>> {
        let data = self.lock_vars()?;
        let names: BTreeSet<&String> = data.keys().filter(|name| is_under(name, path)).collect();
        Ok(names.into_iter().cloned().collect())
    }

    /// Set the trainable flag of every parameter under `path`.
    /// Returns how many parameters were touched.
    pub fn set_requires_grad(&mut self, path: &str, requires_grad: bool) -> Result<usize> {
        let names = self.parameter_names(path)?;
        for name in &names {
            if requires_grad {
                self.frozen.remove(name);
            } else {
                self.frozen.insert(name.clone());
            }
        }
        trace!(
            "requires_grad={} for {} parameters under '{}'",
            requires_grad,
            names.len(),
            path
        );
        Ok(names.len())
    }

    /// Set the trainable flag of every parameter
    pub fn set_all_requires_grad(&mut self, requires_grad: bool) -> Result<usize> {
        self.set_requires_grad("", requires_grad)
    }

    /// Whether a parameter receives gradient updates
    pub fn requires_grad(&self, name: &str) -> Result<bool> {
        if !self.lock_vars()?.contains_key(name) {
            return Err(Error::invalid_input(format!("unknown parameter '{}'", name)));
        }
        Ok(!self.frozen.contains(name))
    }

    /// Sorted names of trainable parameters under `path`
    pub fn trainable_parameter_names(&self, path: &str) -> Result<Vec<String>> {
        Ok(self
            .parameter_names(path)?
            .into_iter()
            .filter(|name| !self.frozen.contains(name))
            .collect())
    }

    /// Trainable variables, sorted by name, for building an optimizer
    pub fn trainable_vars(&self) -> Result<Vec<Var>> {
        let data = self.lock_vars()?;
        let mut vars: Vec<(&String, &Var)> = data
            .iter()
            .filter(|(name, _)| !self.frozen.contains(*name))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(b.0));
        Ok(vars.into_iter().map(|(_, var)| var.clone()).collect())
    }

    /// Total number of scalar parameters
    pub fn num_parameters(&self) -> Result<usize> {
        let data = self.lock_vars()?;
        Ok(data.values().map(|var| var.elem_count()).sum())
    }

    /// Number of trainable scalar parameters
    pub fn num_trainable_parameters(&self) -> Result<usize> {
        let data = self.lock_vars()?;
        Ok(data
            .iter()
            .filter(|(name, _)| !self.frozen.contains(*name))
            .map(|(_, var)| var.elem_count())
            .sum())
    }

    fn lock_vars(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Var>>> {
        self.varmap
            .data()
            .lock()
            .map_err(|_| Error::internal("variable map lock poisoned"))
    }
}

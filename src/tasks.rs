//! Task registry and task-specific generation config

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{ModelConfig, Seq2SeqModel};

/// A task the model can be fine-tuned or evaluated on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task name, e.g. `rte` or `superglue-cb`
    pub name: String,
    /// Target strings of classification tasks
    #[serde(default)]
    pub labels: Vec<String>,
    /// Config values applied to the model while evaluating this task
    #[serde(default)]
    pub task_specific_config: Option<Map<String, Value>>,
}

impl TaskSpec {
    /// Task without labels or task-specific config
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
            task_specific_config: None,
        }
    }

    /// Set the label strings
    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Set the task-specific config
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.task_specific_config = Some(config);
        self
    }
}

static BUILTIN_TASKS: Lazy<TaskRegistry> = Lazy::new(|| {
    let binary = ["0", "1"];
    let three_way = ["0", "1", "2"];
    let mut registry = TaskRegistry::empty();
    for name in [
        "mrpc",
        "cola",
        "sst2",
        "qnli",
        "rte",
        "wnli",
        "qqp",
        "superglue-boolq",
        "superglue-rte",
        "superglue-copa",
        "superglue-multirc",
        "superglue-wic",
        "superglue-wsc.fixed",
        "scitail",
        "paws",
        "imdb",
        "yelp_polarity",
        "piqa",
    ] {
        registry.register(TaskSpec::new(name).with_labels(&binary));
    }
    for name in ["mnli", "snli", "superglue-cb"] {
        registry.register(TaskSpec::new(name).with_labels(&three_way));
    }
    registry.register(TaskSpec::new("winogrande").with_labels(&["1", "2"]));
    registry.register(TaskSpec::new("social_i_qa").with_labels(&["1", "2", "3"]));
    registry.register(TaskSpec::new("cosmos_qa").with_labels(&["0", "1", "2", "3"]));
    for name in ["stsb", "squad", "superglue-record"] {
        registry.register(TaskSpec::new(name));
    }
    registry
});

/// Tasks by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, TaskSpec>,
}

impl TaskRegistry {
    /// Registry without any task
    pub fn empty() -> Self {
        Self::default()
    }

    /// GLUE, SuperGLUE and the other bundled tasks
    pub fn builtin() -> Self {
        BUILTIN_TASKS.clone()
    }

    /// Built-in tasks extended (or overridden) by a YAML list of task specs
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut registry = Self::builtin();
        registry.extend_from_yaml(&content)?;
        Ok(registry)
    }

    /// Register every task of a YAML list, replacing tasks with the same name
    pub fn extend_from_yaml(&mut self, yaml: &str) -> Result<usize> {
        let specs: Vec<TaskSpec> = serde_yaml::from_str(yaml)?;
        let count = specs.len();
        for spec in specs {
            self.register(spec);
        }
        debug!("Registered {} tasks from YAML", count);
        Ok(count)
    }

    /// Add a task, replacing any task with the same name
    pub fn register(&mut self, spec: TaskSpec) {
        self.tasks.insert(spec.name.clone(), spec);
    }

    /// Look up a task
    pub fn get(&self, name: &str) -> Result<&TaskSpec> {
        self.tasks
            .get(name)
            .ok_or_else(|| Error::UnknownTask(name.to_string()))
    }

    /// Registered task names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.tasks.keys().map(String::as_str)
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is registered
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Merge the task-specific config of `task` into the model config.
///
/// Returns whether the task had a config to apply.
pub fn use_task_specific_params(
    model: &mut Seq2SeqModel,
    task: &str,
    registry: &TaskRegistry,
) -> Result<bool> {
    let spec = registry.get(task)?;
    match &spec.task_specific_config {
        Some(task_config) => {
            let shown = Value::Object(task_config.clone());
            info!("using task specific params for {}: {}", task, shown);
            model.config.update(task_config);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Replace the model config, typically with a copy saved before
/// [`use_task_specific_params`].
pub fn reset_config(model: &mut Seq2SeqModel, config: ModelConfig) {
    model.config = config;
    info!("config is reset to the initial values.");
}

//! Processor trait, processor configuration and instantiation.

use crate::error::{InstantiationError, ProcessorError, RuleError};
use crate::events::ChangeEvent;
use crate::path_expression::{OutputLocation, PathExpression};
use crate::store::{ExecutionContext, Node};
use async_trait::async_trait;
use quarry_config::ProcessorSection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// A sequencer: derives structured output from one changed property.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Sequence `property` of `node`, writing derived content to `outputs`.
    ///
    /// The event session is available through [`ExecutionContext::session`]
    /// and is saved by the service after this call returns, whatever the
    /// outcome.
    async fn execute(
        &self,
        node: &Node,
        property: &str,
        event: &ChangeEvent,
        outputs: &BTreeSet<OutputLocation>,
        context: &ExecutionContext,
    ) -> Result<(), ProcessorError>;
}

/// Configuration of one processor.
///
/// Two configurations are the same when every field is equal; the registry
/// uses this to decide whether an update is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Unique processor name
    pub name: String,
    /// Human readable description
    #[serde(default)]
    pub description: Option<String>,
    /// Implementation key resolved by the [`ProcessorFactory`]
    pub class_name: String,
    /// Rules, in order
    pub rules: Vec<PathExpression>,
    /// Whether the processor takes part in dispatch
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free-form settings for the implementation
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl ProcessorConfig {
    /// Create an enabled configuration without rules.
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            class_name: class_name.into(),
            rules: Vec::new(),
            enabled: true,
            properties: BTreeMap::new(),
        }
    }

    /// Add a compiled rule.
    pub fn with_rule(mut self, rule: PathExpression) -> Self {
        self.rules.push(rule);
        self
    }

    /// Parse and add a rule of the form `selection => output`.
    pub fn with_rule_str(self, rule: &str) -> Result<Self, RuleError> {
        Ok(self.with_rule(rule.parse()?))
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Enable or disable the processor.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Add an implementation setting.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Whether `other` differs from this configuration.
    pub fn has_changed(&self, other: &ProcessorConfig) -> bool {
        self != other
    }
}

impl TryFrom<&ProcessorSection> for ProcessorConfig {
    type Error = RuleError;

    fn try_from(section: &ProcessorSection) -> Result<Self, Self::Error> {
        let rules = section
            .rules
            .iter()
            .map(|rule| rule.parse())
            .collect::<Result<Vec<PathExpression>, _>>()?;

        Ok(Self {
            name: section.name.clone(),
            description: section.description.clone(),
            class_name: section.class_name.clone(),
            rules,
            enabled: section.enabled,
            properties: section.properties.clone(),
        })
    }
}

/// Turns a configuration into a running processor.
pub trait ProcessorFactory: Send + Sync {
    /// Build the processor described by `config`.
    fn instantiate(&self, config: &ProcessorConfig) -> Result<Arc<dyn Processor>, InstantiationError>;
}

impl<F> ProcessorFactory for F
where
    F: Fn(&ProcessorConfig) -> Result<Arc<dyn Processor>, InstantiationError> + Send + Sync,
{
    fn instantiate(&self, config: &ProcessorConfig) -> Result<Arc<dyn Processor>, InstantiationError> {
        self(config)
    }
}

type Constructor = Arc<dyn Fn(&ProcessorConfig) -> anyhow::Result<Arc<dyn Processor>> + Send + Sync>;

/// In-process factory mapping `class_name` to a constructor.
#[derive(Clone, Default)]
pub struct ProcessorCatalog {
    constructors: HashMap<String, Constructor>,
}

impl ProcessorCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `class_name`.
    pub fn register<F>(mut self, class_name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&ProcessorConfig) -> anyhow::Result<Arc<dyn Processor>> + Send + Sync + 'static,
    {
        self.constructors.insert(class_name.into(), Arc::new(constructor));
        self
    }

    /// Register one shared instance for every configuration using `class_name`.
    pub fn register_instance(self, class_name: impl Into<String>, instance: Arc<dyn Processor>) -> Self {
        self.register(class_name, move |_| Ok(Arc::clone(&instance)))
    }

    /// Whether `class_name` is known.
    pub fn contains(&self, class_name: &str) -> bool {
        self.constructors.contains_key(class_name)
    }

    /// Registered class names, sorted.
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ProcessorFactory for ProcessorCatalog {
    fn instantiate(&self, config: &ProcessorConfig) -> Result<Arc<dyn Processor>, InstantiationError> {
        let error = |reason: String| InstantiationError {
            name: config.name.clone(),
            class_name: config.class_name.clone(),
            reason,
        };

        let constructor = self
            .constructors
            .get(&config.class_name)
            .ok_or_else(|| error("no constructor registered for this class".to_string()))?;

        constructor(config).map_err(|e| error(format!("{:#}", e)))
    }
}

impl std::fmt::Debug for ProcessorCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorCatalog")
            .field("class_names", &self.class_names())
            .finish()
    }
}

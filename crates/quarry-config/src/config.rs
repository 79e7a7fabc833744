//! Configuration schema for the sequencing service.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level sequencing service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencingConfig {
    /// Number of parallel workers in the dispatch pool
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum number of queued change events; unbounded when absent
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    /// Event kinds accepted by the default change filter
    #[serde(default = "default_accepted_events")]
    pub accepted_events: Vec<EventKindConfig>,
    /// What to do when a changed processor is added under an existing name
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    /// Processor definitions
    #[serde(default)]
    pub processors: Vec<ProcessorSection>,
}

/// Kinds of content changes, as named in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKindConfig {
    /// A node was created
    NodeAdded,
    /// A node was removed
    NodeRemoved,
    /// A property was added to a node
    PropertyAdded,
    /// A property value changed
    PropertyChanged,
    /// A property was removed from a node
    PropertyRemoved,
}

/// Policy applied when a changed configuration is added under a name that
/// is already registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Replace the registered configuration
    #[default]
    Replace,
    /// Refuse the new configuration
    Reject,
}

/// One processor definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSection {
    /// Unique processor name
    pub name: String,
    /// Human readable description
    #[serde(default)]
    pub description: Option<String>,
    /// Implementation key resolved by the processor factory
    pub class_name: String,
    /// Whether the processor takes part in dispatch
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Path expressions in `"<selection> => <output>"` form
    pub rules: Vec<String>,
    /// Free-form settings handed to the processor at instantiation
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ProcessorSection {
    /// Create an enabled section with no rules.
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            class_name: class_name.into(),
            enabled: true,
            rules: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Add a rule.
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rules.push(rule.into());
        self
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

    /// Add a processor property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

fn default_workers() -> usize {
    1
}

fn default_enabled() -> bool {
    true
}

fn default_accepted_events() -> Vec<EventKindConfig> {
    vec![
        EventKindConfig::NodeAdded,
        EventKindConfig::PropertyAdded,
        EventKindConfig::PropertyChanged,
    ]
}

impl Default for SequencingConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: None,
            accepted_events: default_accepted_events(),
            duplicate_policy: DuplicatePolicy::default(),
            processors: Vec::new(),
        }
    }
}

impl SequencingConfig {
    /// Create a new config with a custom worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Create a new config with a bounded queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Create a new config with an additional processor.
    pub fn with_processor(mut self, processor: ProcessorSection) -> Self {
        self.processors.push(processor);
        self
    }

    /// Create a new config with a duplicate policy.
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }
}

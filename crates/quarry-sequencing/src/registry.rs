//! Registry of configured processors and their live instances.

use crate::error::{Result, SequencingError};
use crate::processor::{Processor, ProcessorConfig, ProcessorFactory};
use parking_lot::RwLock;
use quarry_config::DuplicatePolicy;
use std::sync::Arc;
use tracing::{debug, info};

/// A configured processor together with its running instance.
pub struct RegisteredProcessor {
    config: Arc<ProcessorConfig>,
    instance: Arc<dyn Processor>,
}

impl RegisteredProcessor {
    /// Processor name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Configuration the instance was built from.
    pub fn config(&self) -> &Arc<ProcessorConfig> {
        &self.config
    }

    /// The running processor.
    pub fn instance(&self) -> &Arc<dyn Processor> {
        &self.instance
    }
}

impl std::fmt::Debug for RegisteredProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProcessor")
            .field("name", &self.config.name)
            .field("class_name", &self.config.class_name)
            .finish()
    }
}

#[derive(Clone)]
struct Entry {
    config: Arc<ProcessorConfig>,
    registered: Option<Arc<RegisteredProcessor>>,
}

#[derive(Clone)]
struct RegistryState {
    entries: Vec<Entry>,
    instances: Arc<[Arc<RegisteredProcessor>]>,
}

impl RegistryState {
    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            instances: Arc::from(Vec::new()),
        }
    }

    fn from_entries(entries: Vec<Entry>) -> Self {
        let instances: Vec<_> = entries
            .iter()
            .filter_map(|entry| entry.registered.clone())
            .collect();
        Self {
            entries,
            instances: Arc::from(instances),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.config.name == name)
    }
}

/// Holds processor configurations and the instances built from them.
///
/// Readers take a snapshot with [`SequencerRegistry::instances`]; mutations
/// build a new state and swap it in, so a snapshot is never half-updated.
/// Instances are kept in registration order.
pub struct SequencerRegistry {
    factory: Arc<dyn ProcessorFactory>,
    policy: DuplicatePolicy,
    state: RwLock<Arc<RegistryState>>,
}

impl SequencerRegistry {
    /// Create an empty registry that replaces changed duplicates.
    pub fn new(factory: Arc<dyn ProcessorFactory>) -> Self {
        Self::with_policy(factory, DuplicatePolicy::default())
    }

    /// Create an empty registry with the given duplicate policy.
    pub fn with_policy(factory: Arc<dyn ProcessorFactory>, policy: DuplicatePolicy) -> Self {
        Self {
            factory,
            policy,
            state: RwLock::new(Arc::new(RegistryState::empty())),
        }
    }

    /// Policy applied by [`SequencerRegistry::add`].
    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Register a processor.
    ///
    /// Returns `Ok(false)` if an identical configuration is already present.
    /// A changed configuration under an existing name is handled according
    /// to the registry's [`DuplicatePolicy`].
    pub fn add(&self, config: ProcessorConfig) -> Result<bool> {
        self.apply(config, self.policy)
    }

    /// Add or replace a processor. Returns `Ok(false)` if nothing changed.
    pub fn update(&self, config: ProcessorConfig) -> Result<bool> {
        self.apply(config, DuplicatePolicy::Replace)
    }

    /// Remove the processor registered under `config.name`.
    pub fn remove(&self, config: &ProcessorConfig) -> bool {
        self.remove_named(&config.name)
    }

    /// Remove the processor registered under `name`.
    pub fn remove_named(&self, name: &str) -> bool {
        let mut guard = self.state.write();
        let Some(index) = guard.position(name) else {
            debug!("Processor '{}' is not registered", name);
            return false;
        };

        let mut entries = guard.entries.clone();
        entries.remove(index);
        *guard = Arc::new(RegistryState::from_entries(entries));
        info!("Removed processor '{}'", name);
        true
    }

    /// Snapshot of the enabled processors, in registration order.
    pub fn instances(&self) -> Arc<[Arc<RegisteredProcessor>]> {
        Arc::clone(&self.state.read().instances)
    }

    /// Every registered configuration, enabled or not.
    pub fn configs(&self) -> Vec<Arc<ProcessorConfig>> {
        self.state
            .read()
            .entries
            .iter()
            .map(|entry| Arc::clone(&entry.config))
            .collect()
    }

    /// Configuration registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<ProcessorConfig>> {
        let state = self.state.read();
        state
            .position(name)
            .map(|index| Arc::clone(&state.entries[index].config))
    }

    /// Number of registered configurations.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    fn apply(&self, config: ProcessorConfig, policy: DuplicatePolicy) -> Result<bool> {
        // Held across instantiation so concurrent writers cannot interleave.
        let mut guard = self.state.write();
        let existing = guard.position(&config.name);

        if let Some(index) = existing {
            let current = &guard.entries[index].config;
            if !current.has_changed(&config) {
                debug!("Processor '{}' is unchanged", config.name);
                return Ok(false);
            }
            if policy == DuplicatePolicy::Reject {
                return Err(SequencingError::DuplicateConfig(config.name));
            }
        }

        let registered = if config.enabled {
            let instance = self.factory.instantiate(&config)?;
            Some(instance)
        } else {
            None
        };

        let config = Arc::new(config);
        let entry = Entry {
            registered: registered.map(|instance| {
                Arc::new(RegisteredProcessor {
                    config: Arc::clone(&config),
                    instance,
                })
            }),
            config: Arc::clone(&config),
        };

        let mut entries = guard.entries.clone();
        match existing {
            Some(index) => {
                entries[index] = entry;
                info!("Replaced processor '{}' ({})", config.name, config.class_name);
            }
            None => {
                entries.push(entry);
                info!("Added processor '{}' ({})", config.name, config.class_name);
            }
        }
        if !config.enabled {
            debug!("Processor '{}' is disabled and will not be dispatched", config.name);
        }

        *guard = Arc::new(RegistryState::from_entries(entries));
        Ok(true)
    }
}

impl std::fmt::Debug for SequencerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        let names: Vec<&str> = state.entries.iter().map(|e| e.config.name.as_str()).collect();
        f.debug_struct("SequencerRegistry")
            .field("policy", &self.policy)
            .field("processors", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InstantiationError, ProcessorError};
    use crate::events::ChangeEvent;
    use crate::path_expression::OutputLocation;
    use crate::store::{ExecutionContext, Node};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    #[async_trait]
    impl Processor for Noop {
        async fn execute(
            &self,
            _node: &Node,
            _property: &str,
            _event: &ChangeEvent,
            _outputs: &BTreeSet<OutputLocation>,
            _context: &ExecutionContext,
        ) -> std::result::Result<(), ProcessorError> {
            Ok(())
        }
    }

    fn counting_factory() -> (Arc<dyn ProcessorFactory>, Arc<AtomicUsize>) {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let factory = move |config: &ProcessorConfig| -> std::result::Result<Arc<dyn Processor>, InstantiationError> {
            if config.class_name == "missing" {
                return Err(InstantiationError {
                    name: config.name.clone(),
                    class_name: config.class_name.clone(),
                    reason: "not found".to_string(),
                });
            }
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Noop))
        };
        let factory: Arc<dyn ProcessorFactory> = Arc::new(factory);
        (factory, built)
    }

    fn config(name: &str) -> ProcessorConfig {
        ProcessorConfig::new(name, "noop")
            .with_rule_str("/docs/*/@content => /derived/$1")
            .unwrap()
    }

    #[test]
    fn test_add_is_change_aware() {
        let (factory, built) = counting_factory();
        let registry = SequencerRegistry::new(factory);

        assert!(registry.add(config("a")).unwrap());
        assert!(!registry.add(config("a")).unwrap());
        assert_eq!(registry.len(), 1);
        assert_eq!(built.load(Ordering::SeqCst), 1);

        // Changed duplicate is replaced by default.
        assert!(registry.add(config("a").with_description("v2")).unwrap());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().description.as_deref(), Some("v2"));
    }

    #[test]
    fn test_reject_policy() {
        let (factory, _) = counting_factory();
        let registry = SequencerRegistry::with_policy(factory, DuplicatePolicy::Reject);

        registry.add(config("a")).unwrap();
        let err = registry.add(config("a").with_description("v2")).unwrap_err();
        assert!(matches!(err, SequencingError::DuplicateConfig(name) if name == "a"));

        // Update always replaces.
        assert!(registry.update(config("a").with_description("v2")).unwrap());
    }

    #[test]
    fn test_update_twice() {
        let (factory, _) = counting_factory();
        let registry = SequencerRegistry::new(factory);

        assert!(registry.update(config("a")).unwrap());
        assert!(!registry.update(config("a")).unwrap());
    }

    #[test]
    fn test_snapshot_is_stable_across_mutation() {
        let (factory, _) = counting_factory();
        let registry = SequencerRegistry::new(factory);
        registry.add(config("a")).unwrap();
        registry.add(config("b")).unwrap();

        let snapshot = registry.instances();
        assert!(registry.remove_named("a"));
        assert!(!registry.remove_named("a"));

        assert_eq!(snapshot.len(), 2);
        let current = registry.instances();
        let names: Vec<&str> = current.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn test_disabled_processors_are_not_instantiated() {
        let (factory, built) = counting_factory();
        let registry = SequencerRegistry::new(factory);

        assert!(registry.add(config("a").with_enabled(false)).unwrap());
        assert_eq!(registry.len(), 1);
        assert!(registry.instances().is_empty());
        assert_eq!(built.load(Ordering::SeqCst), 0);

        assert!(registry.update(config("a")).unwrap());
        assert_eq!(registry.instances().len(), 1);
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_instantiation_failure_leaves_registry_untouched() {
        let (factory, _) = counting_factory();
        let registry = SequencerRegistry::new(factory);

        let err = registry
            .add(ProcessorConfig::new("broken", "missing"))
            .unwrap_err();
        assert!(matches!(err, SequencingError::ProcessorInstantiation(_)));
        assert!(registry.is_empty());
        assert!(!registry.remove(&ProcessorConfig::new("broken", "missing")));
    }
}

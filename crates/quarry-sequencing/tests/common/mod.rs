//! Common test utilities: an in-memory content store and recording processors.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_sequencing::{
    ChangeEvent, ExecutionContext, Node, OutputLocation, Processor, ProcessorCatalog,
    ProcessorError, SequencingService, Session, SessionFactory, StoreError,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Everything the in-memory store has seen.
#[derive(Debug, Default)]
pub struct StoreState {
    /// Saved nodes keyed by (workspace, path)
    pub nodes: BTreeMap<(String, String), Node>,
    pub sessions_created: usize,
    pub saves: usize,
    pub logouts: usize,
    /// Workspaces whose sessions fail to save
    pub failing_saves: BTreeSet<String>,
}

/// In-memory content store handing out sessions.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a saved node.
    pub fn insert(&self, node: Node) {
        self.state
            .lock()
            .nodes
            .insert((node.workspace.clone(), node.path.clone()), node);
    }

    pub fn node(&self, workspace: &str, path: &str) -> Option<Node> {
        self.state
            .lock()
            .nodes
            .get(&(workspace.to_string(), path.to_string()))
            .cloned()
    }

    pub fn sessions_created(&self) -> usize {
        self.state.lock().sessions_created
    }

    pub fn saves(&self) -> usize {
        self.state.lock().saves
    }

    pub fn logouts(&self) -> usize {
        self.state.lock().logouts
    }

    pub fn fail_saves_in(&self, workspace: &str) {
        self.state.lock().failing_saves.insert(workspace.to_string());
    }

    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::new(Arc::new(self.clone()))
    }
}

#[async_trait]
impl SessionFactory for MemoryStore {
    async fn create_session(&self, workspace: &str) -> Result<Arc<dyn Session>, StoreError> {
        self.state.lock().sessions_created += 1;
        Ok(Arc::new(MemorySession {
            workspace: workspace.to_string(),
            store: self.clone(),
            pending: Mutex::new(Vec::new()),
        }))
    }
}

/// Session buffering writes until save.
pub struct MemorySession {
    workspace: String,
    store: MemoryStore,
    pending: Mutex<Vec<(String, BTreeMap<String, Value>)>>,
}

#[async_trait]
impl Session for MemorySession {
    fn workspace(&self) -> &str {
        &self.workspace
    }

    async fn resolve_node(&self, relative_path: &str) -> Result<Node, StoreError> {
        let path = format!("/{}", relative_path);
        self.store
            .node(&self.workspace, &path)
            .ok_or(StoreError::NodeNotFound(path))
    }

    async fn write(&self, path: &str, properties: BTreeMap<String, Value>) -> Result<(), StoreError> {
        self.pending.lock().push((path.to_string(), properties));
        Ok(())
    }

    async fn save(&self) -> Result<(), StoreError> {
        let pending = std::mem::take(&mut *self.pending.lock());
        let mut state = self.store.state.lock();
        state.saves += 1;
        if state.failing_saves.contains(&self.workspace) {
            return Err(StoreError::Save(format!("workspace '{}' is read-only", self.workspace)));
        }
        for (path, properties) in pending {
            let node = state
                .nodes
                .entry((self.workspace.clone(), path.clone()))
                .or_insert_with(|| Node::new(self.workspace.clone(), path));
            node.properties.extend(properties);
        }
        Ok(())
    }

    async fn logout(&self) -> Result<(), StoreError> {
        self.store.state.lock().logouts += 1;
        Ok(())
    }
}

/// One recorded processor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub processor: String,
    pub node: String,
    pub property: String,
    pub outputs: Vec<String>,
}

/// How a [`RecordingProcessor`] behaves after recording the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Write a derived node at every output location
    Derive,
    /// Return an error without writing
    Fail,
    /// Panic without writing
    Panic,
}

/// Processor that records each call into a shared log.
pub struct RecordingProcessor {
    name: String,
    behavior: Behavior,
    delay: Option<Duration>,
    log: Arc<Mutex<Vec<Invocation>>>,
}

impl RecordingProcessor {
    pub fn new(name: &str, behavior: Behavior, log: &Arc<Mutex<Vec<Invocation>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            delay: None,
            log: Arc::clone(log),
        })
    }

    pub fn slow(name: &str, delay: Duration, log: &Arc<Mutex<Vec<Invocation>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior: Behavior::Derive,
            delay: Some(delay),
            log: Arc::clone(log),
        })
    }
}

#[async_trait]
impl Processor for RecordingProcessor {
    async fn execute(
        &self,
        node: &Node,
        property: &str,
        _event: &ChangeEvent,
        outputs: &BTreeSet<OutputLocation>,
        context: &ExecutionContext,
    ) -> Result<(), ProcessorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.log.lock().push(Invocation {
            processor: self.name.clone(),
            node: node.path.clone(),
            property: property.to_string(),
            outputs: outputs.iter().map(ToString::to_string).collect(),
        });

        match self.behavior {
            Behavior::Fail => {
                return Err(ProcessorError::Execution(anyhow::anyhow!(
                    "cannot parse '{}'",
                    property
                )))
            }
            Behavior::Panic => panic!("processor '{}' hit a bug", self.name),
            Behavior::Derive => {}
        }

        let session = context
            .session()
            .ok_or_else(|| StoreError::Repository("no event session".to_string()))?;
        for output in outputs {
            let mut properties = BTreeMap::new();
            properties.insert("derived_from".to_string(), json!(node.path));
            properties.insert("property".to_string(), json!(property));
            properties.insert("processor".to_string(), json!(self.name));

            if output.workspace() == session.workspace() {
                session.write(output.path(), properties).await?;
            } else {
                // Released by the service when the call's context is closed.
                let other = context.create_session(output.workspace()).await?;
                other.write(output.path(), properties).await?;
                other.save().await?;
            }
        }
        Ok(())
    }
}

/// Route service logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Shared call log.
pub fn call_log() -> Arc<Mutex<Vec<Invocation>>> {
    Arc::new(Mutex::new(Vec::new()))
}

/// Catalog exposing one class per behavior, all recording into `log`.
pub fn catalog(log: &Arc<Mutex<Vec<Invocation>>>) -> ProcessorCatalog {
    let derive = Arc::clone(log);
    let fail = Arc::clone(log);
    let panic = Arc::clone(log);
    ProcessorCatalog::new()
        .register("derive", move |config| {
            Ok(RecordingProcessor::new(&config.name, Behavior::Derive, &derive) as Arc<dyn Processor>)
        })
        .register("fail", move |config| {
            Ok(RecordingProcessor::new(&config.name, Behavior::Fail, &fail) as Arc<dyn Processor>)
        })
        .register("panic", move |config| {
            Ok(RecordingProcessor::new(&config.name, Behavior::Panic, &panic) as Arc<dyn Processor>)
        })
}

/// A started service over `store`, with the given processors registered.
pub fn started_service(
    store: &MemoryStore,
    log: &Arc<Mutex<Vec<Invocation>>>,
    processors: Vec<quarry_sequencing::ProcessorConfig>,
) -> SequencingService {
    let service = SequencingService::new(Arc::new(catalog(log)));
    for config in processors {
        service.add_processor(config).unwrap();
    }
    service.set_execution_context(store.context()).unwrap();
    service.start().unwrap();
    service
}

/// Wait until the service has counted `events` sequenced or skipped events.
pub async fn settle(service: &SequencingService, events: u64) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while service.statistics().snapshot().total() < events {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "expected {} events to be processed", events);
}

/// Shut `service` down and wait for queued work to finish.
pub async fn drain(service: &SequencingService) {
    service.shutdown();
    assert!(
        service.await_termination(Duration::from_secs(5)).await,
        "sequencing work did not drain in time"
    );
}

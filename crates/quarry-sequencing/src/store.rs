//! Content store collaborators: sessions, nodes and the execution context.
//!
//! The sequencing service never talks to a concrete repository. Hosts
//! provide a [`SessionFactory`]; the service opens one [`Session`] per change
//! event and hands processors an [`ExecutionContext`] through which they can
//! open more.

use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A node read from the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Workspace the node lives in.
    pub workspace: String,
    /// Absolute node path.
    pub path: String,
    /// Property values.
    pub properties: BTreeMap<String, Value>,
}

impl Node {
    /// Create a node without properties.
    pub fn new(workspace: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            path: path.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Add a property value.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Get a property value.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Last path segment, or an empty string for the root node.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }
}

/// A unit of work against one workspace of the content store.
#[async_trait]
pub trait Session: Send + Sync {
    /// Workspace this session is bound to.
    fn workspace(&self) -> &str;

    /// Find a node by path relative to the workspace root.
    async fn resolve_node(&self, relative_path: &str) -> Result<Node, StoreError>;

    /// Create or update the node at `path`, merging the given properties.
    /// Changes stay pending until [`Session::save`].
    async fn write(&self, path: &str, properties: BTreeMap<String, Value>) -> Result<(), StoreError>;

    /// Persist pending changes.
    async fn save(&self) -> Result<(), StoreError>;

    /// Release the session.
    async fn logout(&self) -> Result<(), StoreError>;
}

/// Opens sessions on named workspaces.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a session on `workspace`.
    async fn create_session(&self, workspace: &str) -> Result<Arc<dyn Session>, StoreError>;
}

/// Environment handed to processors.
///
/// The service keeps one root context and forks it for every processor call.
/// Sessions opened through a context are logged out when it is closed.
pub struct ExecutionContext {
    id: Uuid,
    session_factory: Arc<dyn SessionFactory>,
    session: Option<Arc<dyn Session>>,
    opened: Mutex<Vec<Arc<dyn Session>>>,
}

impl ExecutionContext {
    /// Create a root context backed by `session_factory`.
    pub fn new(session_factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_factory,
            session: None,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Unique identifier of this context.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The factory sessions are opened with.
    pub fn session_factory(&self) -> &Arc<dyn SessionFactory> {
        &self.session_factory
    }

    /// Session of the change event being sequenced, if any.
    ///
    /// This session is owned by the service: it is saved after every call
    /// and must not be logged out by processors.
    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    /// Fork an isolated context sharing the session factory.
    pub fn fork(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_factory: Arc::clone(&self.session_factory),
            session: self.session.clone(),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Fork a context bound to the event session.
    pub fn fork_with_session(&self, session: Arc<dyn Session>) -> Self {
        let mut context = self.fork();
        context.session = Some(session);
        context
    }

    /// Open a session that is released when this context is closed.
    pub async fn create_session(&self, workspace: &str) -> Result<Arc<dyn Session>, StoreError> {
        let session = self.session_factory.create_session(workspace).await?;
        self.opened.lock().push(Arc::clone(&session));
        Ok(session)
    }

    /// Number of sessions opened through this context and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.opened.lock().len()
    }

    /// Log out every session opened through this context.
    ///
    /// Logout failures are logged and do not stop the remaining sessions
    /// from being released.
    pub async fn close(&self) {
        let sessions: Vec<_> = std::mem::take(&mut *self.opened.lock());
        if !sessions.is_empty() {
            debug!("Closing context {} ({} sessions)", self.id, sessions.len());
        }

        for session in sessions {
            if let Err(e) = session.logout().await {
                warn!(
                    "Failed to release session on '{}' while closing context {}: {}",
                    session.workspace(),
                    self.id,
                    e
                );
            }
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("session", &self.session.as_ref().map(|s| s.workspace().to_string()))
            .field("open_sessions", &self.open_sessions())
            .finish()
    }
}

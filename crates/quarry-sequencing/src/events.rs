//! Change event types delivered by the content store notifier.

use chrono::{DateTime, Utc};
use quarry_config::EventKindConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Kinds of mutation a change event can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Node was created.
    NodeAdded,
    /// Node was removed.
    NodeRemoved,
    /// Property was added.
    PropertyAdded,
    /// Property value changed.
    PropertyChanged,
    /// Property was removed.
    PropertyRemoved,
}

impl ChangeKind {
    /// Get a string representation of the change kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeAdded => "node_added",
            Self::NodeRemoved => "node_removed",
            Self::PropertyAdded => "property_added",
            Self::PropertyChanged => "property_changed",
            Self::PropertyRemoved => "property_removed",
        }
    }
}

impl From<EventKindConfig> for ChangeKind {
    fn from(kind: EventKindConfig) -> Self {
        match kind {
            EventKindConfig::NodeAdded => Self::NodeAdded,
            EventKindConfig::NodeRemoved => Self::NodeRemoved,
            EventKindConfig::PropertyAdded => Self::PropertyAdded,
            EventKindConfig::PropertyChanged => Self::PropertyChanged,
            EventKindConfig::PropertyRemoved => Self::PropertyRemoved,
        }
    }
}

/// A mutation of one node in one workspace.
///
/// Events are immutable once built; use [`ChangeEvent::builder`] to create one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    id: Uuid,
    workspace: String,
    path: String,
    kinds: BTreeSet<ChangeKind>,
    modified_properties: BTreeSet<String>,
    timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Start building an event for the node at `path` in `workspace`.
    pub fn builder(workspace: impl Into<String>, path: impl Into<String>) -> ChangeEventBuilder {
        ChangeEventBuilder {
            workspace: workspace.into(),
            path: path.into(),
            kinds: BTreeSet::new(),
            modified_properties: BTreeSet::new(),
        }
    }

    /// Unique identifier for this event.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Workspace the node lives in.
    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    /// Absolute path of the changed node.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path relative to the workspace root (leading slashes removed).
    pub fn relative_path(&self) -> &str {
        self.path.trim_start_matches('/')
    }

    /// Kinds of change carried by this event.
    pub fn kinds(&self) -> &BTreeSet<ChangeKind> {
        &self.kinds
    }

    /// Names of the properties that were added or changed.
    pub fn modified_properties(&self) -> &BTreeSet<String> {
        &self.modified_properties
    }

    /// When the event was produced.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether this event includes the given kind.
    pub fn includes(&self, kind: ChangeKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Whether this event includes at least one of the given kinds.
    pub fn includes_any<'a>(&self, kinds: impl IntoIterator<Item = &'a ChangeKind>) -> bool {
        kinds.into_iter().any(|kind| self.kinds.contains(kind))
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<&str> = self.kinds.iter().map(ChangeKind::as_str).collect();
        write!(f, "{}:{} [{}]", self.workspace, self.path, kinds.join(","))
    }
}

/// Builder for [`ChangeEvent`].
#[derive(Debug, Clone)]
pub struct ChangeEventBuilder {
    workspace: String,
    path: String,
    kinds: BTreeSet<ChangeKind>,
    modified_properties: BTreeSet<String>,
}

impl ChangeEventBuilder {
    /// Add a change kind.
    pub fn kind(mut self, kind: ChangeKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Add a modified property name.
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.modified_properties.insert(name.into());
        self
    }

    /// Record a changed property, adding the `PropertyChanged` kind.
    pub fn changed(self, name: impl Into<String>) -> Self {
        self.kind(ChangeKind::PropertyChanged).property(name)
    }

    /// Record an added property, adding the `PropertyAdded` kind.
    pub fn added(self, name: impl Into<String>) -> Self {
        self.kind(ChangeKind::PropertyAdded).property(name)
    }

    /// Finish the event.
    pub fn build(self) -> ChangeEvent {
        ChangeEvent {
            id: Uuid::new_v4(),
            workspace: self.workspace,
            path: self.path,
            kinds: self.kinds,
            modified_properties: self.modified_properties,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_kinds_and_properties() {
        let event = ChangeEvent::builder("default", "/docs/report1")
            .changed("content")
            .added("title")
            .added("title")
            .build();

        assert_eq!(event.workspace(), "default");
        assert_eq!(event.relative_path(), "docs/report1");
        assert_eq!(event.modified_properties().len(), 2);
        assert!(event.includes(ChangeKind::PropertyAdded));
        assert!(event.includes(ChangeKind::PropertyChanged));
        assert!(!event.includes(ChangeKind::NodeAdded));
    }

    #[test]
    fn test_includes_any() {
        let event = ChangeEvent::builder("ws", "/a").kind(ChangeKind::NodeRemoved).build();
        assert!(event.includes_any(&[ChangeKind::NodeAdded, ChangeKind::NodeRemoved]));
        assert!(!event.includes_any(&[ChangeKind::PropertyChanged]));
        let none: [ChangeKind; 0] = [];
        assert!(!event.includes_any(&none));
    }

    #[test]
    fn test_display() {
        let event = ChangeEvent::builder("ws", "/a/b")
            .kind(ChangeKind::NodeAdded)
            .changed("x")
            .build();
        assert_eq!(event.to_string(), "ws:/a/b [node_added,property_changed]");
    }
}

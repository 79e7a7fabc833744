//! Policies deciding which events are sequenced and which processors run.

use crate::events::{ChangeEvent, ChangeKind};
use crate::registry::RegisteredProcessor;
use crate::store::Node;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Decides whether a change event is eligible for sequencing.
pub trait ChangeFilter: Send + Sync {
    /// Whether `event` should be dispatched.
    fn accept(&self, event: &ChangeEvent) -> bool;
}

impl<F> ChangeFilter for F
where
    F: Fn(&ChangeEvent) -> bool + Send + Sync,
{
    fn accept(&self, event: &ChangeEvent) -> bool {
        self(event)
    }
}

/// Accepts events carrying at least one of a set of change kinds.
///
/// The default accepts node additions and property additions and changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventKindFilter {
    kinds: BTreeSet<ChangeKind>,
}

impl EventKindFilter {
    /// Accept events carrying any of `kinds`.
    pub fn new(kinds: impl IntoIterator<Item = ChangeKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Kinds this filter accepts.
    pub fn kinds(&self) -> &BTreeSet<ChangeKind> {
        &self.kinds
    }
}

impl Default for EventKindFilter {
    fn default() -> Self {
        Self::new([
            ChangeKind::NodeAdded,
            ChangeKind::PropertyAdded,
            ChangeKind::PropertyChanged,
        ])
    }
}

impl ChangeFilter for EventKindFilter {
    fn accept(&self, event: &ChangeEvent) -> bool {
        event.includes_any(&self.kinds)
    }
}

/// Accepts every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ChangeFilter for AcceptAll {
    fn accept(&self, _event: &ChangeEvent) -> bool {
        true
    }
}

/// Narrows the processors matched for an event down to those that run.
pub trait Selector: Send + Sync {
    /// Pick the processors to run for `node`.
    fn select(
        &self,
        candidates: Vec<Arc<RegisteredProcessor>>,
        node: &Node,
        event: &ChangeEvent,
    ) -> Vec<Arc<RegisteredProcessor>>;
}

/// Runs every matched processor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectAll;

impl Selector for SelectAll {
    fn select(
        &self,
        candidates: Vec<Arc<RegisteredProcessor>>,
        _node: &Node,
        _event: &ChangeEvent,
    ) -> Vec<Arc<RegisteredProcessor>> {
        candidates
    }
}

/// Runs only processors whose names are on an allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByName {
    names: BTreeSet<String>,
}

impl ByName {
    /// Allow the given processor names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl Selector for ByName {
    fn select(
        &self,
        candidates: Vec<Arc<RegisteredProcessor>>,
        _node: &Node,
        _event: &ChangeEvent,
    ) -> Vec<Arc<RegisteredProcessor>> {
        candidates
            .into_iter()
            .filter(|candidate| self.names.contains(candidate.name()))
            .collect()
    }
}

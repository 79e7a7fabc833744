//! Administrative state machine of the sequencing service.
//!
//! ```text
//! Paused <--pause/start--> Started
//!   |                        |
//!   └------shutdown----------┘
//!               |
//!               v
//!         ShuttingDown --[pool drained]--> Terminated
//! ```

use crate::error::{Result, SequencingError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Lifecycle state of the sequencing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Configurable; notifications are dropped
    Paused,
    /// Dispatching notifications
    Started,
    /// No new work accepted; queued work drains
    ShuttingDown,
    /// All work finished
    Terminated,
}

impl LifecycleState {
    /// Check if the service is started
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }

    /// Check if the service is paused
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Check if shutdown was requested, whether or not work has drained
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Terminated)
    }

    /// Check if the service is terminated
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Get a string representation of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::Started => "started",
            Self::ShuttingDown => "shutting_down",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition guards. Callers hold the administrative lock.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: LifecycleState,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: LifecycleState::Paused,
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.state
    }

    /// Configuration may only change while paused.
    pub(crate) fn ensure_configurable(&self, what: &str) -> Result<()> {
        match self.state {
            LifecycleState::Paused => Ok(()),
            LifecycleState::Started => Err(SequencingError::Config(format!(
                "unable to change the {} while the sequencing service is running",
                what
            ))),
            LifecycleState::ShuttingDown | LifecycleState::Terminated => {
                Err(SequencingError::IllegalState(format!(
                    "unable to change the {} of a service that is {}",
                    what, self.state
                )))
            }
        }
    }

    /// Whether a start has work to do. `Ok(false)` when already started.
    pub(crate) fn can_start(&self) -> Result<bool> {
        match self.state {
            LifecycleState::Paused => Ok(true),
            LifecycleState::Started => Ok(false),
            LifecycleState::ShuttingDown | LifecycleState::Terminated => Err(
                SequencingError::IllegalState(format!("cannot start a service that is {}", self.state)),
            ),
        }
    }

    pub(crate) fn mark_started(&mut self) {
        self.transition(LifecycleState::Started);
    }

    /// Started to Paused. `Ok(false)` when already paused.
    pub(crate) fn pause(&mut self) -> Result<bool> {
        match self.state {
            LifecycleState::Started => {
                self.transition(LifecycleState::Paused);
                Ok(true)
            }
            LifecycleState::Paused => Ok(false),
            LifecycleState::ShuttingDown | LifecycleState::Terminated => Err(
                SequencingError::IllegalState(format!("cannot pause a service that is {}", self.state)),
            ),
        }
    }

    /// Move to ShuttingDown. Returns false when shutdown was already requested.
    pub(crate) fn begin_shutdown(&mut self) -> bool {
        if self.state.is_shutdown() {
            return false;
        }
        self.transition(LifecycleState::ShuttingDown);
        true
    }

    /// Record that the pool has drained. Only effective while shutting down.
    pub(crate) fn observe_termination(&mut self) -> bool {
        if self.state == LifecycleState::ShuttingDown {
            self.transition(LifecycleState::Terminated);
        }
        self.state.is_terminated()
    }

    fn transition(&mut self, to: LifecycleState) {
        info!("Sequencing service: {} -> {}", self.state, to);
        self.state = to;
    }
}

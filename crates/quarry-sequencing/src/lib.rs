//! # Quarry Sequencing
//!
//! Routes content store mutations to pluggable processors ("sequencers")
//! that derive structured content from the changed properties.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │   Notifier   │───▶│ ChangeFilter │───▶│  WorkerPool  │───▶│  Dispatcher  │
//! │ (on_changes) │    │              │    │              │    │ (rules/calls)│
//! └──────────────┘    └──────────────┘    └──────────────┘    └──────────────┘
//!                                                                    │
//!                                                                    ▼
//!                     ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//!                     │  Statistics  │◀───│  Processors  │◀───│   Selector   │
//!                     └──────────────┘    └──────────────┘    └──────────────┘
//! ```
//!
//! Each change event is matched against the rules of every registered
//! processor. Matching rules are merged into one call per processor and
//! changed property; the calls run sequentially against a single store
//! session, which is saved after every call and logged out at the end.
//! Failures in one call never affect its siblings or other events.
//!
//! ## Quick Start
//!
//! ```no_run
//! use quarry_sequencing::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run(sessions: Arc<dyn SessionFactory>, text: Arc<dyn Processor>) -> anyhow::Result<()> {
//! let catalog = ProcessorCatalog::new().register_instance("plain-text", text);
//! let service = SequencingService::new(Arc::new(catalog));
//! service.add_processor(
//!     ProcessorConfig::new("text", "plain-text").with_rule_str("/docs/*/@content => /derived/$1")?,
//! )?;
//! service.set_execution_context(ExecutionContext::new(sessions))?;
//! service.start()?;
//!
//! let event = ChangeEvent::builder("default", "/docs/report1").changed("content").build();
//! service.on_changes(vec![event]).await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod dispatcher;
pub mod error;
mod events;
pub mod filter;
mod lifecycle;
pub mod path_expression;
mod pool;
mod processor;
mod registry;
mod service;
mod statistics;
pub mod store;

pub use dispatcher::{plan_calls, ProcessorCall};
pub use error::*;
pub use events::{ChangeEvent, ChangeEventBuilder, ChangeKind};
pub use filter::{AcceptAll, ByName, ChangeFilter, EventKindFilter, SelectAll, Selector};
pub use lifecycle::LifecycleState;
pub use path_expression::{property_path, OutputLocation, PathExpression, RULE_SEPARATOR};
pub use pool::{Job, PoolClosed, PoolConfig, WorkerPool};
pub use processor::{Processor, ProcessorCatalog, ProcessorConfig, ProcessorFactory};
pub use registry::{RegisteredProcessor, SequencerRegistry};
pub use service::{NodeChangeListener, SequencingService};
pub use statistics::{Statistics, StatisticsSnapshot};
pub use store::{ExecutionContext, Node, Session, SessionFactory};

pub use quarry_config::{DuplicatePolicy, SequencingConfig};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ChangeEvent, ChangeFilter, ChangeKind, ExecutionContext, NodeChangeListener, OutputLocation,
        PathExpression, Processor, ProcessorCatalog, ProcessorConfig, ProcessorError, ProcessorFactory,
        Result, SelectAll, Selector, SequencingError, SequencingService, Session, SessionFactory,
    };
}

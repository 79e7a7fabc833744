//! Matching change events to processor calls and running them.

use crate::error::SequencingError;
use crate::events::ChangeEvent;
use crate::filter::Selector;
use crate::path_expression::{property_path, OutputLocation};
use crate::registry::{RegisteredProcessor, SequencerRegistry};
use crate::statistics::Statistics;
use crate::store::{ExecutionContext, Node, Session};
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// One processor invocation for one changed property.
///
/// A processor runs at most once per property per event, however many of
/// its rules matched; every matched output location is collected here.
#[derive(Debug, Clone)]
pub struct ProcessorCall {
    processor: Arc<RegisteredProcessor>,
    property: String,
    outputs: BTreeSet<OutputLocation>,
}

impl ProcessorCall {
    /// The processor to run.
    pub fn processor(&self) -> &Arc<RegisteredProcessor> {
        &self.processor
    }

    /// Name of the processor to run.
    pub fn processor_name(&self) -> &str {
        self.processor.name()
    }

    /// Changed property handed to the processor.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Where the processor should write.
    pub fn outputs(&self) -> &BTreeSet<OutputLocation> {
        &self.outputs
    }
}

/// Match every rule of every processor against every modified property of
/// `event`.
///
/// Calls are ordered by processor name, then property. A rule whose output
/// cannot be built is logged and contributes nothing.
pub fn plan_calls(instances: &[Arc<RegisteredProcessor>], event: &ChangeEvent) -> Vec<ProcessorCall> {
    let mut calls: BTreeMap<(String, String), ProcessorCall> = BTreeMap::new();

    for processor in instances {
        for rule in &processor.config().rules {
            for property in event.modified_properties() {
                let path = property_path(event.path(), property);
                match rule.matches(&path, event.workspace()) {
                    Ok(Some(location)) => {
                        calls
                            .entry((processor.name().to_string(), property.clone()))
                            .or_insert_with(|| ProcessorCall {
                                processor: Arc::clone(processor),
                                property: property.clone(),
                                outputs: BTreeSet::new(),
                            })
                            .outputs
                            .insert(location);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(
                        "Rule '{}' of processor '{}' failed for '{}': {}",
                        rule,
                        processor.name(),
                        path,
                        e
                    ),
                }
            }
        }
    }

    calls.into_values().collect()
}

/// Runs the sequencing work for single events.
///
/// Built when the service starts, from the configuration in place at that
/// moment.
pub(crate) struct Dispatcher {
    registry: Arc<SequencerRegistry>,
    statistics: Arc<Statistics>,
    context: Arc<ExecutionContext>,
    selector: Arc<dyn Selector>,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<SequencerRegistry>,
        statistics: Arc<Statistics>,
        context: Arc<ExecutionContext>,
        selector: Arc<dyn Selector>,
    ) -> Self {
        Self {
            registry,
            statistics,
            context,
            selector,
        }
    }

    /// Sequence one event. Failures are logged here and go no further.
    pub(crate) async fn process(&self, event: ChangeEvent) {
        if let Err(e) = self.sequence(&event).await {
            error!("Error while sequencing {}: {}", event, e);
        }
    }

    async fn sequence(&self, event: &ChangeEvent) -> Result<(), SequencingError> {
        let instances = self.registry.instances();
        let calls = plan_calls(&instances, event);
        if calls.is_empty() {
            trace!("Skipping {}: no processor rule matched", event);
            self.statistics.record_skipped();
            return Ok(());
        }

        let session = self
            .context
            .session_factory()
            .create_session(event.workspace())
            .await?;

        let outcome = self.run_calls(&session, event, calls).await;

        if let Err(e) = session.logout().await {
            error!("Failed to log out of '{}' after sequencing {}: {}", event.workspace(), event, e);
        }
        outcome
    }

    async fn run_calls(
        &self,
        session: &Arc<dyn Session>,
        event: &ChangeEvent,
        calls: Vec<ProcessorCall>,
    ) -> Result<(), SequencingError> {
        let node = session.resolve_node(event.relative_path()).await?;

        let mut candidates: Vec<Arc<RegisteredProcessor>> = Vec::new();
        for call in &calls {
            if !candidates.iter().any(|p| p.name() == call.processor_name()) {
                candidates.push(Arc::clone(&call.processor));
            }
        }

        let selected: BTreeSet<String> = self
            .selector
            .select(candidates, &node, event)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        let calls: Vec<ProcessorCall> = calls
            .into_iter()
            .filter(|call| selected.contains(call.processor_name()))
            .collect();

        if calls.is_empty() {
            debug!("Skipping {}: no processor selected", event);
            self.statistics.record_skipped();
            return Ok(());
        }

        for call in &calls {
            self.run_call(session, &node, event, call).await;
        }

        self.statistics.record_sequenced();
        Ok(())
    }

    async fn run_call(
        &self,
        session: &Arc<dyn Session>,
        node: &Node,
        event: &ChangeEvent,
        call: &ProcessorCall,
    ) {
        let context = self.context.fork_with_session(Arc::clone(session));
        let name = call.processor_name();

        let execution = call
            .processor
            .instance()
            .execute(node, &call.property, event, &call.outputs, &context);

        match AssertUnwindSafe(execution).catch_unwind().await {
            Ok(Ok(())) => debug!(
                "Processor '{}' sequenced property '{}' of {}",
                name, call.property, event
            ),
            Ok(Err(e)) => error!(
                "Processor '{}' failed on property '{}' of {}: {}",
                name, call.property, event, e
            ),
            Err(panic) => error!(
                "Processor '{}' panicked on property '{}' of {}: {}",
                name,
                call.property,
                event,
                panic_message(panic.as_ref())
            ),
        }

        if let Err(e) = session.save().await {
            error!("Failed to save output of processor '{}' for {}: {}", name, event, e);
        }
        context.close().await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

//! The sequencing service: administration plus the change listener entry
//! point.

use crate::dispatcher::Dispatcher;
use crate::error::{Result, SequencingError};
use crate::events::{ChangeEvent, ChangeKind};
use crate::filter::{ChangeFilter, EventKindFilter, SelectAll, Selector};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::pool::{PoolConfig, WorkerPool};
use crate::processor::{ProcessorConfig, ProcessorFactory};
use crate::registry::SequencerRegistry;
use crate::statistics::Statistics;
use crate::store::ExecutionContext;
use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_config::SequencingConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Receives batches of change events from the content store notifier.
#[async_trait]
pub trait NodeChangeListener: Send + Sync {
    /// Handle changes, in the order given.
    async fn on_changes(&self, events: Vec<ChangeEvent>);
}

struct AdminState {
    lifecycle: Lifecycle,
    context: Option<Arc<ExecutionContext>>,
    pool_config: PoolConfig,
    pool: Option<Arc<WorkerPool>>,
    selector: Arc<dyn Selector>,
    filter: Arc<dyn ChangeFilter>,
    dispatcher: Option<Arc<Dispatcher>>,
}

struct Inner {
    registry: Arc<SequencerRegistry>,
    statistics: Arc<Statistics>,
    admin: Mutex<AdminState>,
}

/// Routes content store changes to the registered processors.
///
/// The service starts paused. Give it an [`ExecutionContext`], register
/// processors and call [`SequencingService::start`]; from then on every
/// accepted change event passed to
/// [`NodeChangeListener::on_changes`] is sequenced on the worker pool.
/// Cloning yields another handle to the same service.
#[derive(Clone)]
pub struct SequencingService {
    inner: Arc<Inner>,
}

impl SequencingService {
    /// Create a paused service with no processors.
    pub fn new(factory: Arc<dyn ProcessorFactory>) -> Self {
        Self::with_registry(SequencerRegistry::new(factory))
    }

    /// Create a paused service around an existing registry.
    pub fn with_registry(registry: SequencerRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Arc::new(registry),
                statistics: Arc::new(Statistics::new()),
                admin: Mutex::new(AdminState {
                    lifecycle: Lifecycle::new(),
                    context: None,
                    pool_config: PoolConfig::default(),
                    pool: None,
                    selector: Arc::new(SelectAll),
                    filter: Arc::new(EventKindFilter::default()),
                    dispatcher: None,
                }),
            }),
        }
    }

    /// Build a paused service from file configuration.
    ///
    /// Every processor section is compiled and registered; the first bad
    /// rule or failed instantiation aborts construction.
    pub fn from_config(config: &SequencingConfig, factory: Arc<dyn ProcessorFactory>) -> Result<Self> {
        let service = Self::with_registry(SequencerRegistry::with_policy(factory, config.duplicate_policy));
        service.set_pool_config(PoolConfig::from(config))?;
        service.set_filter(Some(Arc::new(EventKindFilter::new(
            config.accepted_events.iter().copied().map(ChangeKind::from),
        ))))?;

        for section in &config.processors {
            service.add_processor(ProcessorConfig::try_from(section)?)?;
        }

        info!(
            "Configured sequencing service with {} processors ({} workers)",
            service.registry().len(),
            config.workers
        );
        Ok(service)
    }

    /// Registered processors.
    pub fn registry(&self) -> &Arc<SequencerRegistry> {
        &self.inner.registry
    }

    /// Live counters.
    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.inner.statistics
    }

    /// Register a processor. See [`SequencerRegistry::add`].
    pub fn add_processor(&self, config: ProcessorConfig) -> Result<bool> {
        self.inner.registry.add(config)
    }

    /// Add or replace a processor. See [`SequencerRegistry::update`].
    pub fn update_processor(&self, config: ProcessorConfig) -> Result<bool> {
        self.inner.registry.update(config)
    }

    /// Remove a processor. Returns false if it was not registered.
    pub fn remove_processor(&self, config: &ProcessorConfig) -> bool {
        self.inner.registry.remove(config)
    }

    /// The execution context processors run in.
    pub fn execution_context(&self) -> Option<Arc<ExecutionContext>> {
        self.inner.admin.lock().context.clone()
    }

    /// Set the execution context. Only allowed while paused.
    pub fn set_execution_context(&self, context: impl Into<Arc<ExecutionContext>>) -> Result<()> {
        let mut admin = self.inner.admin.lock();
        admin.lifecycle.ensure_configurable("execution context")?;
        admin.context = Some(context.into());
        Ok(())
    }

    /// Size of the pool created on start when none was supplied. Only
    /// allowed while paused.
    pub fn set_pool_config(&self, config: PoolConfig) -> Result<()> {
        let mut admin = self.inner.admin.lock();
        admin.lifecycle.ensure_configurable("worker pool")?;
        admin.pool_config = config;
        Ok(())
    }

    /// Supply the worker pool. Only allowed while paused.
    pub fn set_worker_pool(&self, pool: Arc<WorkerPool>) -> Result<()> {
        let mut admin = self.inner.admin.lock();
        admin.lifecycle.ensure_configurable("worker pool")?;
        admin.pool = Some(pool);
        Ok(())
    }

    /// Set the processor selector; `None` restores [`SelectAll`]. Only
    /// allowed while paused.
    pub fn set_selector(&self, selector: Option<Arc<dyn Selector>>) -> Result<()> {
        let mut admin = self.inner.admin.lock();
        admin.lifecycle.ensure_configurable("processor selector")?;
        admin.selector = selector.unwrap_or_else(|| Arc::new(SelectAll));
        Ok(())
    }

    /// Set the change filter; `None` restores [`EventKindFilter::default`].
    /// Only allowed while paused.
    pub fn set_filter(&self, filter: Option<Arc<dyn ChangeFilter>>) -> Result<()> {
        let mut admin = self.inner.admin.lock();
        admin.lifecycle.ensure_configurable("change filter")?;
        admin.filter = filter.unwrap_or_else(|| Arc::new(EventKindFilter::default()));
        Ok(())
    }

    /// Start dispatching.
    ///
    /// Requires an execution context. Creates the worker pool if none was
    /// supplied, so this must run inside a tokio runtime. Starting a started
    /// service does nothing.
    pub fn start(&self) -> Result<()> {
        let mut admin = self.inner.admin.lock();
        if !admin.lifecycle.can_start()? {
            return Ok(());
        }

        let context = admin.context.clone().ok_or_else(|| {
            SequencingError::Config(
                "unable to start the sequencing service without an execution context".to_string(),
            )
        })?;

        if admin.pool.is_none() {
            let pool_config = admin.pool_config;
            admin.pool = Some(Arc::new(WorkerPool::new(pool_config)?));
        }

        admin.dispatcher = Some(Arc::new(Dispatcher::new(
            Arc::clone(&self.inner.registry),
            Arc::clone(&self.inner.statistics),
            context,
            Arc::clone(&admin.selector),
        )));
        admin.lifecycle.mark_started();
        info!(
            "Sequencing service started with {} processors",
            self.inner.registry.instances().len()
        );
        Ok(())
    }

    /// Stop dispatching new events. Queued work still runs.
    pub fn pause(&self) -> Result<()> {
        let mut admin = self.inner.admin.lock();
        if admin.lifecycle.pause()? {
            admin.dispatcher = None;
        }
        Ok(())
    }

    /// Refuse new work and let queued work drain.
    pub fn shutdown(&self) {
        let mut admin = self.inner.admin.lock();
        if !admin.lifecycle.begin_shutdown() {
            return;
        }
        admin.dispatcher = None;
        if let Some(pool) = &admin.pool {
            pool.shutdown();
        }
    }

    /// Wait for queued work to finish after [`SequencingService::shutdown`].
    ///
    /// Returns whether the worker pool terminated within `timeout`; a
    /// service that never created a pool has nothing to wait for.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let pool = {
            let admin = self.inner.admin.lock();
            if admin.lifecycle.state().is_terminated() {
                return true;
            }
            admin.pool.clone()
        };

        let terminated = match pool {
            Some(pool) => pool.await_termination(timeout).await,
            None => true,
        };
        if terminated {
            self.inner.admin.lock().lifecycle.observe_termination();
        }
        terminated
    }

    /// Whether no worker pool was ever created or the pool has terminated.
    ///
    /// Observing termination while shutting down moves the service to
    /// [`LifecycleState::Terminated`].
    pub fn is_terminated(&self) -> bool {
        let mut admin = self.inner.admin.lock();
        let drained = admin.pool.as_ref().map_or(true, |pool| pool.is_terminated());
        if drained {
            admin.lifecycle.observe_termination();
        }
        drained
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner.admin.lock().lifecycle.state()
    }

    /// Whether the service is dispatching.
    pub fn is_started(&self) -> bool {
        self.state().is_started()
    }

    /// Whether the service is paused.
    pub fn is_paused(&self) -> bool {
        self.state().is_paused()
    }

    /// Whether shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.state().is_shutdown()
    }

    fn dispatch_target(&self) -> Option<(Arc<dyn ChangeFilter>, Arc<Dispatcher>, Arc<WorkerPool>)> {
        let admin = self.inner.admin.lock();
        if !admin.lifecycle.state().is_started() {
            return None;
        }
        Some((
            Arc::clone(&admin.filter),
            Arc::clone(admin.dispatcher.as_ref()?),
            Arc::clone(admin.pool.as_ref()?),
        ))
    }
}

#[async_trait]
impl NodeChangeListener for SequencingService {
    async fn on_changes(&self, events: Vec<ChangeEvent>) {
        for event in events {
            let Some((filter, dispatcher, pool)) = self.dispatch_target() else {
                debug!("Dropping {}: sequencing service is {}", event, self.state());
                continue;
            };

            if !filter.accept(&event) {
                trace!("Ignoring {}: rejected by change filter", event);
                continue;
            }

            let id = event.id();
            let job = Box::pin(async move { dispatcher.process(event).await });
            if pool.submit(job).await.is_err() {
                debug!("Dropping change event {}: worker pool is shut down", id);
            }
        }
    }
}

impl std::fmt::Debug for SequencingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let admin = self.inner.admin.lock();
        f.debug_struct("SequencingService")
            .field("state", &admin.lifecycle.state())
            .field("registry", &self.inner.registry)
            .field("statistics", &self.inner.statistics)
            .field("pool", &admin.pool)
            .finish()
    }
}

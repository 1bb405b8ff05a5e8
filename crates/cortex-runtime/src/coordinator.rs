//! [`Coordinator`] – the composition root of the coordination core.
//!
//! The coordinator owns the scheduler and the bounded stores, registers them
//! as the `scheduler`, `working_memory`, and `cache` regions next to any
//! caller-supplied regions, then freezes the registry.  From that point every
//! interaction, including task admission and cache access, is a
//! [`dispatch`][Coordinator::dispatch] call.
//!
//! # Example
//!
//! ```
//! use cortex_runtime::coordinator::{Coordinator, CoordinatorConfig};
//! use cortex_types::Args;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let coordinator = Coordinator::builder(CoordinatorConfig::default()).build().unwrap();
//!
//! coordinator
//!     .dispatch("scheduler", "admit", Args::new().arg("Prepare Dataset").arg("high"))
//!     .await
//!     .unwrap();
//! let task = coordinator.dispatch("scheduler", "next", Args::new()).await.unwrap();
//! assert_eq!(task["name"], "Prepare Dataset");
//! # });
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cortex_kernel::{
    CapabilityHandle, CapabilityRegistry, DispatchOptions, Dispatcher, ErrorSink, Region,
    Scheduler, SchedulerConfig, TracingSink, DEFAULT_DECAY_FACTOR, DEFAULT_MAX_RETRIES,
    DEFAULT_URGENCY_FACTOR,
};
use cortex_memory::{Cache, WorkingMemory};
use cortex_types::{Args, CortexError, Value};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::regions::{SchedulerRegion, StoreRegion, CACHE, SCHEDULER, WORKING_MEMORY};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for the built-in regions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub working_memory_capacity: usize,
    pub cache_capacity: usize,
    pub max_retries: u32,
    /// Default `urgency_factor` for `scheduler.reprioritize`.
    pub urgency_factor: f64,
    /// Default `decay_factor` for `scheduler.reprioritize`.
    pub decay_factor: f64,
    /// Applied to every dispatch that does not carry its own timeout.
    pub dispatch_timeout: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            working_memory_capacity: 20,
            cache_capacity: 50,
            max_retries: DEFAULT_MAX_RETRIES,
            urgency_factor: DEFAULT_URGENCY_FACTOR,
            decay_factor: DEFAULT_DECAY_FACTOR,
            dispatch_timeout: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Collects subsystems and extra regions before the registry is frozen.
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    sink: Arc<dyn ErrorSink>,
    scheduler: Option<Scheduler>,
    working_memory: Option<WorkingMemory>,
    cache: Option<Cache>,
    regions: Vec<(String, RegionSource)>,
}

enum RegionSource {
    Handle(CapabilityHandle),
    Region(Arc<dyn Region>),
}

impl CoordinatorBuilder {
    /// Report failures to `sink` instead of the default [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use a pre-built scheduler instead of one made from the config.
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn working_memory(mut self, store: WorkingMemory) -> Self {
        self.working_memory = Some(store);
        self
    }

    pub fn cache(mut self, store: Cache) -> Self {
        self.cache = Some(store);
        self
    }

    /// Register an extra region from a ready-made handle.
    pub fn handle(mut self, name: &str, handle: CapabilityHandle) -> Self {
        self.regions.push((name.to_string(), RegionSource::Handle(handle)));
        self
    }

    /// Register an extra region implementing [`Region`].
    pub fn region<R: Region>(mut self, name: &str, region: R) -> Self {
        self.regions
            .push((name.to_string(), RegionSource::Region(Arc::new(region))));
        self
    }

    /// Register everything and freeze the registry.
    ///
    /// # Errors
    ///
    /// [`CortexError::DuplicateRegion`] when two regions share a name
    /// (including the built-in ones) and [`CortexError::DuplicateOperation`]
    /// from a malformed operation table.
    pub fn build(self) -> Result<Coordinator, CortexError> {
        let config = self.config;
        let scheduler = self.scheduler.unwrap_or_else(|| {
            Scheduler::new(SchedulerConfig {
                max_retries: config.max_retries,
            })
            .with_sink(self.sink.clone())
        });
        let scheduler = Arc::new(Mutex::new(scheduler));
        let working_memory = Arc::new(Mutex::new(
            self.working_memory
                .unwrap_or_else(|| WorkingMemory::with_capacity(config.working_memory_capacity)),
        ));
        let cache = Arc::new(Mutex::new(
            self.cache
                .unwrap_or_else(|| Cache::with_capacity(config.cache_capacity)),
        ));

        let mut registry = CapabilityRegistry::new();
        registry.register(
            SCHEDULER,
            Arc::new(SchedulerRegion::new(
                scheduler.clone(),
                config.urgency_factor,
                config.decay_factor,
            ))
            .capability()?,
        )?;
        registry.register(
            WORKING_MEMORY,
            Arc::new(StoreRegion::new(WORKING_MEMORY, working_memory.clone())).capability()?,
        )?;
        registry.register(
            CACHE,
            Arc::new(StoreRegion::new(CACHE, cache.clone())).capability()?,
        )?;
        for (name, source) in self.regions {
            let handle = match source {
                RegionSource::Handle(handle) => handle,
                RegionSource::Region(region) => region.capability()?,
            };
            registry.register(&name, handle)?;
        }

        info!(regions = ?registry.region_names(), "coordinator ready");
        let dispatcher = Dispatcher::new(Arc::new(registry), self.sink)
            .with_default_timeout(config.dispatch_timeout);
        Ok(Coordinator {
            config,
            dispatcher,
            scheduler,
            working_memory,
            cache,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

/// One call in a [`Coordinator::dispatch_batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub region: String,
    pub operation: String,
    #[serde(default)]
    pub args: Args,
}

impl Call {
    pub fn new(region: &str, operation: &str, args: Args) -> Self {
        Self {
            region: region.to_string(),
            operation: operation.to_string(),
            args,
        }
    }
}

/// Frozen registry plus the shared subsystems behind the built-in regions.
#[derive(Clone)]
pub struct Coordinator {
    config: CoordinatorConfig,
    dispatcher: Dispatcher,
    scheduler: Arc<Mutex<Scheduler>>,
    working_memory: Arc<Mutex<WorkingMemory>>,
    cache: Arc<Mutex<Cache>>,
}

impl Coordinator {
    pub fn builder(config: CoordinatorConfig) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            sink: Arc::new(TracingSink),
            scheduler: None,
            working_memory: None,
            cache: None,
            regions: Vec::new(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Registered region names, sorted.
    pub fn region_names(&self) -> Vec<&str> {
        self.dispatcher.registry().region_names()
    }

    /// Operations exposed by `region`, sorted.
    pub fn operations(&self, region: &str) -> Result<Vec<&str>, CortexError> {
        Ok(self.dispatcher.registry().resolve(region)?.operation_names())
    }

    pub async fn dispatch(
        &self,
        region: &str,
        operation: &str,
        args: Args,
    ) -> Result<Value, CortexError> {
        self.dispatcher.dispatch(region, operation, args).await
    }

    pub async fn dispatch_with(
        &self,
        region: &str,
        operation: &str,
        args: Args,
        options: DispatchOptions,
    ) -> Result<Value, CortexError> {
        self.dispatcher
            .dispatch_with(region, operation, args, options)
            .await
    }

    /// Run `calls` in order.  A failing call does not stop the batch.
    pub async fn dispatch_batch(&self, calls: Vec<Call>) -> Vec<Result<Value, CortexError>> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(
                self.dispatch(&call.region, &call.operation, call.args)
                    .await,
            );
        }
        results
    }

    /// Read-only view of the scheduler; the lock is held only for `f`.
    pub fn inspect_scheduler<R>(&self, f: impl FnOnce(&Scheduler) -> R) -> R {
        f(&crate::regions::lock(&self.scheduler))
    }

    pub fn inspect_working_memory<R>(&self, f: impl FnOnce(&WorkingMemory) -> R) -> R {
        f(&crate::regions::lock(&self.working_memory))
    }

    pub fn inspect_cache<R>(&self, f: impl FnOnce(&Cache) -> R) -> R {
        f(&crate::regions::lock(&self.cache))
    }
}

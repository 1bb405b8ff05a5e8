//! [`Dispatcher`] – the single chokepoint through which every region is reached.
//!
//! [`Dispatcher::dispatch`] performs, in order:
//!
//! 1. **Region resolution** through the frozen [`CapabilityRegistry`]; an
//!    unbound name yields [`CortexError::UnknownRegion`].
//! 2. **Operation lookup** on the region's [`CapabilityHandle`]; a missing
//!    name yields [`CortexError::OperationNotFound`].
//! 3. **Invocation**.  Errors returned by the handler, and panics raised
//!    while it runs, are wrapped in [`CortexError::RegionExecution`] so a
//!    caller never observes an unhandled region fault.
//!
//! Calls can be bounded with a [`CancelSignal`] and/or a timeout through
//! [`DispatchOptions`].  Every failure is reported to the injected
//! [`ErrorSink`] before being returned.
//!
//! The dispatcher owns no region state and takes no region lock itself; a
//! slow region therefore never blocks dispatch to another one.
//!
//! [`CapabilityHandle`]: crate::capability::CapabilityHandle

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use cortex_types::{Args, CortexError, Value};
use futures_util::FutureExt;
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::error_sink::{report, ErrorSink};
use crate::registry::CapabilityRegistry;

const COMPONENT: &str = "dispatcher";

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

/// Caller side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Signal cancellation to every paired [`CancelSignal`].
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Receiver side of a cancellation pair, handed to [`DispatchOptions`].
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once cancellation is signalled.  Never resolves if the
    /// [`CancelHandle`] is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        while self.0.changed().await.is_ok() {
            if *self.0.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

/// Create a linked [`CancelHandle`] / [`CancelSignal`] pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

/// Per-call dispatch bounds.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub cancel: Option<CancelSignal>,
    /// Overrides the dispatcher's default timeout when set.
    pub timeout: Option<Duration>,
}

impl DispatchOptions {
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Routes `(region, operation, args)` calls to registered regions.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use cortex_kernel::capability::CapabilityHandle;
/// use cortex_kernel::dispatcher::Dispatcher;
/// use cortex_kernel::error_sink::TracingSink;
/// use cortex_kernel::registry::CapabilityRegistry;
/// use cortex_types::{Args, CortexError, Value};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let mut registry = CapabilityRegistry::new();
/// registry
///     .register(
///         "echo",
///         CapabilityHandle::builder("echo")
///             .sync_op("say", |args: Args| Ok(args.get(0, "text").cloned().unwrap_or(Value::Null)))
///             .build()
///             .unwrap(),
///     )
///     .unwrap();
///
/// let dispatcher = Dispatcher::new(Arc::new(registry), Arc::new(TracingSink));
/// let reply = dispatcher.dispatch("echo", "say", Args::new().arg("hi")).await.unwrap();
/// assert_eq!(reply, Value::from("hi"));
///
/// let err = dispatcher.dispatch("UnknownRegion", "x", Args::new()).await.unwrap_err();
/// assert!(matches!(err, CortexError::UnknownRegion { .. }));
/// # });
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    sink: Arc<dyn ErrorSink>,
    default_timeout: Option<Duration>,
}

impl Dispatcher {
    /// Build a dispatcher over an already-populated, frozen registry.
    pub fn new(registry: Arc<CapabilityRegistry>, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            registry,
            sink,
            default_timeout: None,
        }
    }

    /// Apply `timeout` to every call that does not set its own.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn sink(&self) -> &Arc<dyn ErrorSink> {
        &self.sink
    }

    /// Dispatch with default options.
    pub async fn dispatch(
        &self,
        region: &str,
        operation: &str,
        args: Args,
    ) -> Result<Value, CortexError> {
        self.dispatch_with(region, operation, args, DispatchOptions::default())
            .await
    }

    /// Dispatch with explicit cancellation / timeout bounds.
    ///
    /// # Errors
    ///
    /// - [`CortexError::UnknownRegion`] – `region` is not registered.
    /// - [`CortexError::OperationNotFound`] – the region lacks `operation`.
    /// - [`CortexError::RegionExecution`] – the handler failed or panicked.
    /// - [`CortexError::Cancelled`] / [`CortexError::Timeout`] – the call
    ///   was abandoned before the handler finished.
    #[instrument(skip(self, args, options))]
    pub async fn dispatch_with(
        &self,
        region: &str,
        operation: &str,
        args: Args,
        options: DispatchOptions,
    ) -> Result<Value, CortexError> {
        let result = self.invoke(region, operation, args, options).await;
        match &result {
            Ok(_) => debug!("dispatch succeeded"),
            Err(e) => report(self.sink.as_ref(), COMPONENT, &e.to_string()),
        }
        result
    }

    async fn invoke(
        &self,
        region: &str,
        operation: &str,
        args: Args,
        options: DispatchOptions,
    ) -> Result<Value, CortexError> {
        let handle = self.registry.resolve(region)?;
        let op = handle
            .operation(operation)
            .ok_or_else(|| CortexError::OperationNotFound {
                region: region.to_string(),
                operation: operation.to_string(),
            })?;

        let wrap = |cause: CortexError| CortexError::RegionExecution {
            region: region.to_string(),
            operation: operation.to_string(),
            cause: Box::new(cause),
        };

        // Synchronous handlers do their work while building the future.
        let fut = match panic::catch_unwind(AssertUnwindSafe(|| op(args))) {
            Ok(fut) => fut,
            Err(payload) => return Err(wrap(CortexError::fault(panic_message(payload)))),
        };
        let guarded = AssertUnwindSafe(fut).catch_unwind();

        let timeout = options.timeout.or(self.default_timeout);
        let bounded = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, guarded).await.map_err(|_| {
                    CortexError::Timeout {
                        region: region.to_string(),
                        operation: operation.to_string(),
                        after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    }
                }),
                None => Ok(guarded.await),
            }
        };

        let completed = match options.cancel {
            Some(mut signal) => {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => Err(CortexError::Cancelled {
                        region: region.to_string(),
                        operation: operation.to_string(),
                    }),
                    r = bounded => r,
                }
            }
            None => bounded.await,
        };

        match completed? {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(cause)) => Err(wrap(cause)),
            Err(payload) => Err(wrap(CortexError::fault(panic_message(payload)))),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("region panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("region panicked: {s}")
    } else {
        "region panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityHandle;
    use crate::error_sink::MemorySink;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher_with(handle: CapabilityHandle, sink: Arc<MemorySink>) -> Dispatcher {
        let mut registry = CapabilityRegistry::new();
        registry.register("test", handle).unwrap();
        Dispatcher::new(Arc::new(registry), sink)
    }

    async fn late_boom(_: Args) -> Result<Value, CortexError> {
        tokio::task::yield_now().await;
        panic!("late boom")
    }

    async fn slow(_: Args) -> Result<Value, CortexError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Value::Null)
    }

    fn sample_region(calls: Arc<AtomicUsize>) -> CapabilityHandle {
        CapabilityHandle::builder("test")
            .sync_op("count", move |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(json!(n))
            })
            .sync_op("fail", |_| Err(CortexError::fault("backend offline")))
            .sync_op("explode", |_| panic!("boom"))
            .async_op("explode_later", late_boom)
            .async_op("slow", slow)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn successful_dispatch_returns_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(MemorySink::new());
        let d = dispatcher_with(sample_region(calls.clone()), sink.clone());
        assert_eq!(d.dispatch("test", "count", Args::new()).await.unwrap(), json!(1));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn unknown_region_is_isolated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(MemorySink::new());
        let d = dispatcher_with(sample_region(calls.clone()), sink.clone());

        let err = d.dispatch("UnknownRegion", "x", Args::new()).await.unwrap_err();
        assert!(matches!(err, CortexError::UnknownRegion { ref region } if region == "UnknownRegion"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(d.registry().region_names(), vec!["test"]);
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.records()[0].0, "dispatcher");
    }

    #[tokio::test]
    async fn unknown_operation_is_tagged() {
        let sink = Arc::new(MemorySink::new());
        let d = dispatcher_with(sample_region(Arc::new(AtomicUsize::new(0))), sink);
        let err = d.dispatch("test", "missing", Args::new()).await.unwrap_err();
        assert_eq!(
            err,
            CortexError::OperationNotFound {
                region: "test".into(),
                operation: "missing".into()
            }
        );
    }

    #[tokio::test]
    async fn region_error_is_wrapped() {
        let sink = Arc::new(MemorySink::new());
        let d = dispatcher_with(sample_region(Arc::new(AtomicUsize::new(0))), sink.clone());
        let err = d.dispatch("test", "fail", Args::new()).await.unwrap_err();
        match &err {
            CortexError::RegionExecution { region, operation, cause } => {
                assert_eq!(region, "test");
                assert_eq!(operation, "fail");
                assert!(matches!(**cause, CortexError::Fault { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(sink.records()[0].1.contains("backend offline"));
    }

    #[tokio::test]
    async fn sync_panic_is_contained() {
        let d = dispatcher_with(
            sample_region(Arc::new(AtomicUsize::new(0))),
            Arc::new(MemorySink::new()),
        );
        let err = d.dispatch("test", "explode", Args::new()).await.unwrap_err();
        assert_eq!(err.kind(), "region_execution");
        assert!(err.root_cause().to_string().contains("boom"));
    }

    #[tokio::test]
    async fn async_panic_is_contained() {
        let d = dispatcher_with(
            sample_region(Arc::new(AtomicUsize::new(0))),
            Arc::new(MemorySink::new()),
        );
        let err = d.dispatch("test", "explode_later", Args::new()).await.unwrap_err();
        assert!(err.root_cause().to_string().contains("late boom"));
    }

    #[tokio::test]
    async fn batch_continues_after_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let d = dispatcher_with(sample_region(calls.clone()), Arc::new(MemorySink::new()));
        let batch = [("test", "count"), ("test", "fail"), ("nowhere", "x"), ("test", "count")];
        let mut results = Vec::new();
        for (region, op) in batch {
            results.push(d.dispatch(region, op, Args::new()).await);
        }
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_err());
        assert_eq!(results[3].as_ref().unwrap(), &json!(2));
    }

    #[tokio::test]
    async fn timeout_abandons_slow_call() {
        let d = dispatcher_with(
            sample_region(Arc::new(AtomicUsize::new(0))),
            Arc::new(MemorySink::new()),
        );
        let options = DispatchOptions::default().with_timeout(Duration::from_millis(20));
        let err = d
            .dispatch_with("test", "slow", Args::new(), options)
            .await
            .unwrap_err();
        assert!(matches!(err, CortexError::Timeout { after_ms: 20, .. }));
    }

    #[tokio::test]
    async fn default_timeout_applies() {
        let d = dispatcher_with(
            sample_region(Arc::new(AtomicUsize::new(0))),
            Arc::new(MemorySink::new()),
        )
        .with_default_timeout(Some(Duration::from_millis(10)));
        let err = d.dispatch("test", "slow", Args::new()).await.unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test]
    async fn cancel_signal_abandons_call() {
        let d = dispatcher_with(
            sample_region(Arc::new(AtomicUsize::new(0))),
            Arc::new(MemorySink::new()),
        );
        let (handle, signal) = cancel_pair();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });
        let err = d
            .dispatch_with("test", "slow", Args::new(), DispatchOptions::default().with_cancel(signal))
            .await
            .unwrap_err();
        assert!(matches!(err, CortexError::Cancelled { .. }));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn already_cancelled_signal_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let d = dispatcher_with(sample_region(calls), Arc::new(MemorySink::new()));
        let (handle, signal) = cancel_pair();
        handle.cancel();
        assert!(signal.is_cancelled());
        let err = d
            .dispatch_with("test", "slow", Args::new(), DispatchOptions::default().with_cancel(signal))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "cancelled");
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let d = dispatcher_with(
            sample_region(Arc::new(AtomicUsize::new(0))),
            Arc::new(MemorySink::new()),
        );
        let (handle, signal) = cancel_pair();
        drop(handle);
        let value = d
            .dispatch_with("test", "count", Args::new(), DispatchOptions::default().with_cancel(signal))
            .await
            .unwrap();
        assert_eq!(value, json!(1));
    }
}

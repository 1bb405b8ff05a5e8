//! [`CapabilityHandle`] – the operation table a region exposes.
//!
//! A handle maps operation names to type-erased handlers.  Handlers are
//! collected through a [`CapabilityBuilder`], which rejects a second
//! registration of the same operation name so that table mistakes surface
//! when the region is wired up instead of at dispatch time.
//!
//! # Example
//!
//! ```
//! use cortex_kernel::capability::CapabilityHandle;
//! use cortex_types::{Args, Value};
//!
//! let handle = CapabilityHandle::builder("echo")
//!     .sync_op("echo", |args: Args| Ok(args.get(0, "value").cloned().unwrap_or(Value::Null)))
//!     .build()
//!     .unwrap();
//!
//! assert!(handle.supports("echo"));
//! assert_eq!(handle.operation_names(), vec!["echo"]);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use cortex_types::{Args, CortexError, Value};
use futures_util::future::{self, BoxFuture, FutureExt};

/// Future returned by every operation handler.
pub type OperationFuture = BoxFuture<'static, Result<Value, CortexError>>;

/// A type-erased operation handler.
pub type Operation = Arc<dyn Fn(Args) -> OperationFuture + Send + Sync>;

/// Opaque reference to a region's operation set.
///
/// Cheap to clone; all clones share the same table.
#[derive(Clone)]
pub struct CapabilityHandle {
    label: String,
    operations: Arc<BTreeMap<String, Operation>>,
}

impl CapabilityHandle {
    /// Start building a handle.  `label` is only used in diagnostics.
    pub fn builder(label: impl Into<String>) -> CapabilityBuilder {
        CapabilityBuilder {
            label: label.into(),
            operations: BTreeMap::new(),
            duplicate: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Look up the handler for `name`.
    pub fn operation(&self, name: &str) -> Option<Operation> {
        self.operations.get(name).cloned()
    }

    pub fn supports(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Names of every exposed operation, sorted.
    pub fn operation_names(&self) -> Vec<&str> {
        self.operations.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for CapabilityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityHandle")
            .field("label", &self.label)
            .field("operations", &self.operation_names())
            .finish()
    }
}

/// Collects handlers for a [`CapabilityHandle`].
pub struct CapabilityBuilder {
    label: String,
    operations: BTreeMap<String, Operation>,
    duplicate: Option<String>,
}

impl CapabilityBuilder {
    /// Register a synchronous handler.  It runs on the dispatching task and
    /// must not block.
    pub fn sync_op<F>(self, name: &str, handler: F) -> Self
    where
        F: Fn(Args) -> Result<Value, CortexError> + Send + Sync + 'static,
    {
        let op: Operation = Arc::new(move |args| future::ready(handler(args)).boxed());
        self.insert(name, op)
    }

    /// Register an asynchronous handler.
    pub fn async_op<F, Fut>(self, name: &str, handler: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CortexError>> + Send + 'static,
    {
        let op: Operation = Arc::new(move |args| handler(args).boxed());
        self.insert(name, op)
    }

    fn insert(mut self, name: &str, op: Operation) -> Self {
        if self.operations.contains_key(name) {
            self.duplicate.get_or_insert_with(|| name.to_string());
        } else {
            self.operations.insert(name.to_string(), op);
        }
        self
    }

    /// Finish the table.
    ///
    /// # Errors
    ///
    /// [`CortexError::DuplicateOperation`] naming the first operation that
    /// was registered more than once.
    pub fn build(self) -> Result<CapabilityHandle, CortexError> {
        if let Some(operation) = self.duplicate {
            return Err(CortexError::DuplicateOperation {
                region: self.label,
                operation,
            });
        }
        Ok(CapabilityHandle {
            label: self.label,
            operations: Arc::new(self.operations),
        })
    }
}

/// A subsystem that can publish itself as a capability handle.
pub trait Region: Send + Sync + 'static {
    /// Build the operation table for this region.
    fn capability(self: Arc<Self>) -> Result<CapabilityHandle, CortexError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn sync_and_async_ops_are_invocable() {
        let handle = CapabilityHandle::builder("math")
            .sync_op("double", |args: Args| {
                let n: i64 = args.required(0, "n")?;
                Ok(json!(n * 2))
            })
            .async_op("triple", |args: Args| async move {
                let n: i64 = args.required(0, "n")?;
                Ok::<_, CortexError>(json!(n * 3))
            })
            .build()
            .unwrap();

        let double = handle.operation("double").unwrap();
        assert_eq!(double(Args::new().arg(4)).await.unwrap(), json!(8));
        let triple = handle.operation("triple").unwrap();
        assert_eq!(triple(Args::new().kwarg("n", 5)).await.unwrap(), json!(15));
    }

    #[test]
    fn duplicate_operation_is_rejected_at_build() {
        let result = CapabilityHandle::builder("dup")
            .sync_op("get", |_| Ok(Value::Null))
            .sync_op("get", |_| Ok(Value::Null))
            .build();
        assert!(matches!(
            result,
            Err(CortexError::DuplicateOperation { ref region, ref operation })
                if region == "dup" && operation == "get"
        ));
    }

    #[test]
    fn unknown_operation_lookup_is_none() {
        let handle = CapabilityHandle::builder("empty").build().unwrap();
        assert!(handle.operation("missing").is_none());
        assert!(!handle.supports("missing"));
        assert!(handle.operation_names().is_empty());
    }

    #[test]
    fn operation_names_are_sorted() {
        let handle = CapabilityHandle::builder("r")
            .sync_op("put", |_| Ok(Value::Null))
            .sync_op("clear", |_| Ok(Value::Null))
            .sync_op("get", |_| Ok(Value::Null))
            .build()
            .unwrap();
        assert_eq!(handle.operation_names(), vec!["clear", "get", "put"]);
        assert!(format!("{handle:?}").contains("clear"));
    }
}

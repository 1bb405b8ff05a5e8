//! [`CapabilityRegistry`] – region name → [`CapabilityHandle`] lookup.
//!
//! The registry is populated once during startup and then frozen behind an
//! `Arc` by the coordinator, so resolution needs no locking.  Rebinding a
//! name is refused: a region must be registered exactly once.

use std::collections::BTreeMap;

use cortex_types::CortexError;
use tracing::debug;

use crate::capability::CapabilityHandle;

/// Maps symbolic region names to their capability handles.
///
/// # Example
///
/// ```
/// use cortex_kernel::capability::CapabilityHandle;
/// use cortex_kernel::registry::CapabilityRegistry;
///
/// let mut registry = CapabilityRegistry::new();
/// registry
///     .register("declarative", CapabilityHandle::builder("declarative").build().unwrap())
///     .unwrap();
///
/// assert!(registry.resolve("declarative").is_ok());
/// assert!(registry.resolve("emotional").is_err());
/// ```
#[derive(Default, Debug)]
pub struct CapabilityRegistry {
    regions: BTreeMap<String, CapabilityHandle>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `handle`.
    ///
    /// # Errors
    ///
    /// [`CortexError::DuplicateRegion`] when `name` is already bound.
    pub fn register(&mut self, name: &str, handle: CapabilityHandle) -> Result<(), CortexError> {
        if self.regions.contains_key(name) {
            return Err(CortexError::DuplicateRegion {
                region: name.to_string(),
            });
        }
        debug!(region = name, operations = ?handle.operation_names(), "region registered");
        self.regions.insert(name.to_string(), handle);
        Ok(())
    }

    /// Return the handle bound to `name`.
    ///
    /// # Errors
    ///
    /// [`CortexError::UnknownRegion`] when nothing is bound to `name`.
    pub fn resolve(&self, name: &str) -> Result<&CapabilityHandle, CortexError> {
        self.regions
            .get(name)
            .ok_or_else(|| CortexError::UnknownRegion {
                region: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.regions.contains_key(name)
    }

    /// Registered region names, sorted.
    pub fn region_names(&self) -> Vec<&str> {
        self.regions.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

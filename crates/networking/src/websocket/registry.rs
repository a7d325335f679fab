//! Keyed handler registry shared by independent consumers

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::error;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Map from consumer key to callback
///
/// Dispatch runs on a snapshot, so handlers may register or remove
/// handlers (including themselves) while being called.
pub struct HandlerRegistry<T> {
    handlers: RwLock<HashMap<String, Handler<T>>>,
}

impl<T> HandlerRegistry<T> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register `handler` under `key`, replacing any previous one.
    /// Returns true if a handler was replaced.
    pub fn add<F>(&self, key: impl Into<String>, handler: F) -> bool
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), Arc::new(handler))
            .is_some()
    }

    /// Remove the handler under `key`. Returns true if one was registered.
    pub fn remove(&self, key: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every handler with `value`.
    ///
    /// A panicking handler is logged and skipped; the others still run.
    /// Returns how many handlers completed normally.
    pub fn dispatch(&self, value: &T) -> usize {
        let snapshot: Vec<(String, Handler<T>)> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, handler)| (key.clone(), handler.clone()))
            .collect();

        let mut delivered = 0;
        for (key, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(value))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(handler = %key, "Handler panicked, continuing with the rest"),
            }
        }
        delivered
    }
}

impl<T> Default for HandlerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

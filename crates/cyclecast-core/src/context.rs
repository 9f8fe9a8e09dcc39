//! Per-thread execution contexts
//!
//! The engine's scratch buffers are not shareable, so every querying thread
//! gets a private [`ExecutionContext`] holding its forward-pass buffers and a
//! results buffer reused across batched calls. Contexts are created lazily on
//! a thread's first query and live for the provider's lifetime; the registry
//! never shrinks, which is acceptable for the small, stable thread pools this
//! layer serves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};

use crate::engine::ExecutionBuffers;

/// Results-buffer capacity reserved up front per context.
const PREALLOC_RESULTS: usize = 1000;

/// Scratch state one thread needs to invoke the engine.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Forward-pass buffers, sized for the provider's configured batch width.
    pub buffers: ExecutionBuffers,
    /// Raw results of the last batched call on this thread.
    pub results: Vec<f32>,
}

impl ExecutionContext {
    pub fn new(buffers: ExecutionBuffers) -> Self {
        let mut results = Vec::new();
        results.reserve(PREALLOC_RESULTS);
        Self { buffers, results }
    }
}

/// Thread-keyed map of execution contexts.
///
/// The per-context `Mutex` is only ever taken by the thread the context
/// belongs to, so it is uncontended; it exists to make the exclusive
/// ownership explicit to the type system.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: RwLock<HashMap<ThreadId, Arc<Mutex<ExecutionContext>>>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the calling thread's context, constructing it on first touch.
    ///
    /// Lookup of an already-registered thread takes only the shared lock.
    /// First-touch insertion upgrades to the exclusive lock and re-checks the
    /// map, so a context is constructed at most once per thread even if the
    /// lock upgrade races with another first-touch thread.
    pub fn get_or_create<F>(&self, make: F) -> Arc<Mutex<ExecutionContext>>
    where
        F: FnOnce() -> ExecutionContext,
    {
        let thread_id = thread::current().id();

        {
            let contexts = self.contexts.read().unwrap();
            if let Some(context) = contexts.get(&thread_id) {
                return Arc::clone(context);
            }
        }

        let mut contexts = self.contexts.write().unwrap();
        let context = contexts
            .entry(thread_id)
            .or_insert_with(|| Arc::new(Mutex::new(make())));
        Arc::clone(context)
    }

    /// Number of threads that have queried so far.
    pub fn len(&self) -> usize {
        self.contexts.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

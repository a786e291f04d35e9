//! Script registry: the process-wide key → compiled form mapping.
//!
//! The registry is the only shared mutable state in hotscript. Entries are
//! published whole, replaced whole, and handed out as `Arc`s, so a call that
//! started against an old form finishes against it even if a concurrent
//! registration replaces the key mid-flight.

use crate::concurrent_map::{DEFAULT_SHARDS, ShardedMap};
use crate::engine::{CompiledScript, EngineError, ScriptEngine};
use crate::error::ScriptError;
use crate::value::{Bindings, Value};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::SystemTime;

/// A compiled script body bound to the engine that produced it.
///
/// Whether named-function invocation is possible is decided once, at
/// compile time, from the engine's capabilities.
pub struct CompiledForm {
    key: String,
    body: Box<dyn CompiledScript>,
    engine: Arc<dyn ScriptEngine>,
    supports_invoke: bool,
    generation: u64,
    compiled_at: SystemTime,
}

impl CompiledForm {
    pub(crate) fn new(
        key: &str,
        body: Box<dyn CompiledScript>,
        engine: Arc<dyn ScriptEngine>,
    ) -> Self {
        let supports_invoke = engine.capabilities().supports_invoke;
        Self {
            key: key.to_string(),
            body,
            engine,
            supports_invoke,
            generation: 0,
            compiled_at: SystemTime::now(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn engine(&self) -> &Arc<dyn ScriptEngine> {
        &self.engine
    }

    pub fn engine_name(&self) -> &str {
        self.engine.engine_name()
    }

    pub fn supports_invoke(&self) -> bool {
        self.supports_invoke
    }

    /// Monotonic per-registry counter assigned at publish time; a replaced
    /// key gets a larger value. Zero until published.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn compiled_at(&self) -> SystemTime {
        self.compiled_at
    }

    /// Execute the whole body again with `bindings`.
    pub fn evaluate(&self, bindings: &Bindings) -> Result<Value, EngineError> {
        self.body.evaluate(bindings)
    }

    pub fn invoke(&self, function: &str, args: &[Value]) -> Result<Value, EngineError> {
        if !self.supports_invoke {
            return Err(EngineError::Unsupported {
                engine: self.engine_name().to_string(),
                operation: "invoke",
            });
        }
        self.body.invoke(function, args)
    }
}

impl fmt::Debug for CompiledForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledForm")
            .field("key", &self.key)
            .field("engine", &self.engine_name())
            .field("supports_invoke", &self.supports_invoke)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Concurrent key → [`CompiledForm`] mapping with last-write-wins replace.
pub struct ScriptRegistry {
    entries: ShardedMap<String, Arc<CompiledForm>>,
    capacity: Option<usize>,
    count: AtomicUsize,
    generation: AtomicU64,
}

impl fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRegistry")
            .field("entries", &self.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl Default for ScriptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(shards: usize) -> Self {
        Self {
            entries: ShardedMap::with_shards(shards),
            capacity: None,
            count: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Refuse new keys once `capacity` entries exist. Replacing an existing
    /// key is always allowed.
    #[must_use]
    pub fn with_capacity_limit(mut self, capacity: Option<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Pure read: never creates an entry.
    pub fn lookup(&self, key: &str) -> Option<Arc<CompiledForm>> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop the entry for `key`. In-flight calls keep their `Arc` alive.
    pub fn remove(&self, key: &str) -> Option<Arc<CompiledForm>> {
        self.entries.remove_with(key, |_| {
            self.count.fetch_sub(1, Ordering::AcqRel);
        })
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted snapshot of registered keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = self.entries.keys();
        keys.sort_unstable();
        keys
    }

    /// Publish `form` under its key, replacing any previous entry.
    ///
    /// The generation is drawn under the shard lock, so the entry left in
    /// place after racing publishes of one key always has the largest value.
    pub(crate) fn publish(&self, mut form: CompiledForm) -> Result<Published, ScriptError> {
        let key = form.key.clone();
        let capacity = self.capacity;
        let admit_new = || match capacity {
            None => {
                self.count.fetch_add(1, Ordering::AcqRel);
                true
            }
            Some(limit) => self
                .count
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < limit).then_some(n + 1)
                })
                .is_ok(),
        };

        let mut generation = 0;
        let make = || {
            generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
            form.generation = generation;
            Arc::new(form)
        };

        let replaced = self
            .entries
            .insert_guarded(key, admit_new, make)
            .map_err(|key| ScriptError::RegistryFull {
                key,
                capacity: capacity.unwrap_or_default(),
            })?;
        Ok(Published {
            generation,
            replaced,
        })
    }
}

/// Outcome of a successful [`ScriptRegistry::publish`].
#[derive(Debug)]
pub(crate) struct Published {
    pub(crate) generation: u64,
    pub(crate) replaced: Option<Arc<CompiledForm>>,
}

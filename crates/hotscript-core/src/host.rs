//! `ScriptHost`: one engine provider, one registry, and the three paths
//! over them (registration, dispatch, ad-hoc evaluation).
//!
//! Every operation comes in two flavours:
//!
//! - `try_*` methods return `Result<_, ScriptError>` so callers can tell
//!   "no value" from "failed" and see which kind of failure happened;
//! - the plain methods return `Option<Value>` and are `None` both on
//!   failure and when the script produced nothing.
//!
//! Both log every failure through `tracing`.

use crate::adhoc::AdhocEvaluator;
use crate::config::{HostConfig, PreloadScript};
use crate::dispatcher::InvocationDispatcher;
use crate::error::ScriptError;
use crate::pipeline::{RegistrationPipeline, ScriptSource};
use crate::provider::{BuiltinLocator, EngineLocator, EngineOptions, EngineProvider};
use crate::registry::{CompiledForm, ScriptRegistry};
use crate::value::{Bindings, ConversionError, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of [`ScriptHost::preload`].
#[derive(Debug, Default)]
pub struct PreloadReport {
    pub registered: Vec<String>,
    pub failed: Vec<(String, ScriptError)>,
}

impl PreloadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ScriptHost {
    provider: Arc<EngineProvider>,
    registry: Arc<ScriptRegistry>,
    pipeline: RegistrationPipeline,
    dispatcher: InvocationDispatcher,
    adhoc: AdhocEvaluator,
}

impl ScriptHost {
    pub fn new(provider: EngineProvider) -> Self {
        Self::with_registry(provider, ScriptRegistry::new())
    }

    pub fn with_registry(provider: EngineProvider, registry: ScriptRegistry) -> Self {
        let provider = Arc::new(provider);
        let registry = Arc::new(registry);
        Self {
            pipeline: RegistrationPipeline::new(Arc::clone(&provider), Arc::clone(&registry)),
            dispatcher: InvocationDispatcher::new(Arc::clone(&provider), Arc::clone(&registry)),
            adhoc: AdhocEvaluator::new(Arc::clone(&provider)),
            provider,
            registry,
        }
    }

    /// Build a host using the engines compiled into this crate.
    pub fn from_config(config: &HostConfig) -> Self {
        let locator = BuiltinLocator::new().with_options(EngineOptions {
            call_timeout: config.call_timeout(),
        });
        Self::from_config_with_locator(config, &locator)
    }

    pub fn from_config_with_locator(config: &HostConfig, locator: &dyn EngineLocator) -> Self {
        let provider = EngineProvider::init(&config.language, locator)
            .serialize_compile(config.serialize_compile);
        let registry = ScriptRegistry::with_shards(config.shards)
            .with_capacity_limit(config.max_entries);
        Self::with_registry(provider, registry)
    }

    pub fn provider(&self) -> &EngineProvider {
        &self.provider
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn try_register(
        &self,
        key: &str,
        source: impl Into<ScriptSource>,
        bindings: &Bindings,
    ) -> Result<Value, ScriptError> {
        self.pipeline.register(key, source.into(), bindings)
    }

    pub fn try_call(&self, key: &str, function: &str, args: &[Value]) -> Result<Value, ScriptError> {
        self.dispatcher.call(key, function, args)
    }

    pub fn try_call_as<T>(&self, key: &str, function: &str, args: &[Value]) -> Result<T, ScriptError>
    where
        T: TryFrom<Value, Error = ConversionError>,
    {
        self.dispatcher.call_as(key, function, args)
    }

    pub fn try_eval(&self, source: &str, bindings: &Bindings) -> Result<Value, ScriptError> {
        self.adhoc.eval(source, bindings)
    }

    pub fn try_eval_call(
        &self,
        source: &str,
        bindings: &Bindings,
        function: &str,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        self.adhoc.eval_call(source, bindings, function, args)
    }

    pub fn try_eval_file(
        &self,
        path: &Path,
        bindings: &Bindings,
        function: &str,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        self.adhoc.eval_file(path, bindings, function, args)
    }

    pub fn register(
        &self,
        key: &str,
        source: impl Into<ScriptSource>,
        bindings: &Bindings,
    ) -> Option<Value> {
        absent_on_failure(self.try_register(key, source, bindings))
    }

    pub fn call(&self, key: &str, function: &str, args: &[Value]) -> Option<Value> {
        absent_on_failure(self.try_call(key, function, args))
    }

    pub fn eval(&self, source: &str, bindings: &Bindings) -> Option<Value> {
        absent_on_failure(self.try_eval(source, bindings))
    }

    pub fn eval_call(
        &self,
        source: &str,
        bindings: &Bindings,
        function: &str,
        args: &[Value],
    ) -> Option<Value> {
        absent_on_failure(self.try_eval_call(source, bindings, function, args))
    }

    pub fn eval_file(
        &self,
        path: &Path,
        bindings: &Bindings,
        function: &str,
        args: &[Value],
    ) -> Option<Value> {
        absent_on_failure(self.try_eval_file(path, bindings, function, args))
    }

    pub fn lookup(&self, key: &str) -> Option<Arc<CompiledForm>> {
        self.registry.lookup(key)
    }

    /// Drop the entry for `key`. Returns whether one existed.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.registry.remove(key).is_some();
        if removed {
            info!(key, "script removed");
        }
        removed
    }

    pub fn keys(&self) -> Vec<String> {
        self.registry.keys()
    }

    /// Register every listed script file. Failures are logged and
    /// collected, never fatal.
    pub fn preload(&self, scripts: &[PreloadScript]) -> PreloadReport {
        let mut report = PreloadReport::default();
        for script in scripts {
            let bindings: Bindings = script
                .bindings
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            match self.try_register(&script.key, ScriptSource::file(&script.path), &bindings) {
                Ok(_) => report.registered.push(script.key.clone()),
                Err(err) => report.failed.push((script.key.clone(), err)),
            }
        }
        if report.is_complete() {
            info!(registered = report.registered.len(), "preload finished");
        } else {
            warn!(
                registered = report.registered.len(),
                failed = report.failed.len(),
                "preload finished with failures"
            );
        }
        report
    }
}

// Already logged by the component that failed.
fn absent_on_failure(result: Result<Value, ScriptError>) -> Option<Value> {
    result.ok().and_then(Value::non_null)
}

//! Invocation dispatcher: key → registered form → named function call.

use crate::error::ScriptError;
use crate::provider::EngineProvider;
use crate::registry::ScriptRegistry;
use crate::value::{ConversionError, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Resolves registered scripts and calls functions on them.
///
/// Never compiles. A call that raced with a re-registration completes
/// against whichever form it resolved first.
#[derive(Debug, Clone)]
pub struct InvocationDispatcher {
    provider: Arc<EngineProvider>,
    registry: Arc<ScriptRegistry>,
}

impl InvocationDispatcher {
    pub fn new(provider: Arc<EngineProvider>, registry: Arc<ScriptRegistry>) -> Self {
        Self { provider, registry }
    }

    /// Call `function` on the script registered under `key`.
    pub fn call(&self, key: &str, function: &str, args: &[Value]) -> Result<Value, ScriptError> {
        let started = Instant::now();
        match self.dispatch(key, function, args) {
            Ok(value) => {
                debug!(
                    key,
                    function,
                    args = args.len(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "script function returned"
                );
                Ok(value)
            }
            Err(err) => {
                error!(key, function, kind = %err.kind(), error = %err, "script call failed");
                Err(err)
            }
        }
    }

    /// [`call`](Self::call) followed by a checked conversion of the result.
    pub fn call_as<T>(&self, key: &str, function: &str, args: &[Value]) -> Result<T, ScriptError>
    where
        T: TryFrom<Value, Error = ConversionError>,
    {
        let value = self.call(key, function, args)?;
        T::try_from(value).map_err(|source| {
            let err = ScriptError::Conversion {
                key: key.to_string(),
                function: function.to_string(),
                source,
            };
            error!(key, function, error = %err, "script result conversion failed");
            err
        })
    }

    fn dispatch(&self, key: &str, function: &str, args: &[Value]) -> Result<Value, ScriptError> {
        self.provider.engine()?;
        let form = self
            .registry
            .lookup(key)
            .ok_or_else(|| ScriptError::UnknownScript {
                key: key.to_string(),
            })?;
        if !form.supports_invoke() {
            return Err(ScriptError::NotInvocable {
                key: key.to_string(),
                engine: form.engine_name().to_string(),
            });
        }
        form.invoke(function, args)
            .map_err(|err| ScriptError::invocation(key, function, err))
    }
}

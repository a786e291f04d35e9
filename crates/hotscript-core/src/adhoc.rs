//! One-shot evaluation that never touches the registry.
//!
//! Every call recompiles. Use registration for anything called repeatedly.

use crate::error::ScriptError;
use crate::pipeline::ScriptSource;
use crate::provider::EngineProvider;
use crate::value::{Bindings, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};

/// Label used in diagnostics for inline ad-hoc source.
pub const EVAL_LABEL: &str = "<eval>";

#[derive(Debug, Clone)]
pub struct AdhocEvaluator {
    provider: Arc<EngineProvider>,
}

impl AdhocEvaluator {
    pub fn new(provider: Arc<EngineProvider>) -> Self {
        Self { provider }
    }

    /// Compile and run `source` once with `bindings`.
    pub fn eval(&self, source: &str, bindings: &Bindings) -> Result<Value, ScriptError> {
        self.run(EVAL_LABEL, source, bindings, None)
            .inspect_err(|err| log_failure(EVAL_LABEL, None, err))
    }

    /// Compile and run `source`, then call `function` on the fresh body.
    pub fn eval_call(
        &self,
        source: &str,
        bindings: &Bindings,
        function: &str,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        self.run(EVAL_LABEL, source, bindings, Some((function, args)))
            .inspect_err(|err| log_failure(EVAL_LABEL, Some(function), err))
    }

    /// Read `path`, then behave like [`eval_call`](Self::eval_call).
    pub fn eval_file(
        &self,
        path: &Path,
        bindings: &Bindings,
        function: &str,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        let label = path.display().to_string();
        ScriptSource::file(path)
            .read_to_string()
            .and_then(|source| self.run(&label, &source, bindings, Some((function, args))))
            .inspect_err(|err| log_failure(&label, Some(function), err))
    }

    fn run(
        &self,
        label: &str,
        source: &str,
        bindings: &Bindings,
        call: Option<(&str, &[Value])>,
    ) -> Result<Value, ScriptError> {
        let body = self.provider.compile(label, source)?;
        let value = body
            .evaluate(bindings)
            .map_err(|err| ScriptError::runtime(label, err))?;

        let Some((function, args)) = call else {
            debug!(source = label, "ad-hoc script evaluated");
            return Ok(value);
        };

        let engine = self.provider.engine()?;
        if !engine.capabilities().supports_invoke {
            return Err(ScriptError::NotInvocable {
                key: label.to_string(),
                engine: engine.engine_name().to_string(),
            });
        }
        let result = body
            .invoke(function, args)
            .map_err(|err| ScriptError::invocation(label, function, err))?;
        debug!(source = label, function, "ad-hoc function returned");
        Ok(result)
    }
}

fn log_failure(label: &str, function: Option<&str>, err: &ScriptError) {
    error!(
        source = label,
        function = function.unwrap_or_default(),
        kind = %err.kind(),
        error = %err,
        "ad-hoc evaluation failed"
    );
}

//! Engine seam: the opaque scripting runtime the registry delegates to.
//!
//! hotscript never parses or runs script syntax itself. A [`ScriptEngine`]
//! turns source text into a [`CompiledScript`], and the compiled body is
//! then executed and invoked without going back to the engine.

use crate::value::{Bindings, Value};
use std::time::Duration;
use thiserror::Error;

/// Runtime feature surface for a scripting engine.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct EngineCapabilities {
    /// The engine offers a compile step separate from execution.
    pub supports_precompilation: bool,
    /// Compiled bodies can invoke a named top-level function.
    pub supports_invoke: bool,
    /// Concurrent `compile` calls on one engine instance are known to be safe.
    pub thread_safe_compile: bool,
    /// Deadline applied to each function invocation, if any.
    pub max_execution_time: Option<Duration>,
}

/// Failure reported by an engine. Carries the engine's own diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("function `{0}` is not defined")]
    MissingFunction(String),

    #[error("`{name}` is a {found}, not a function")]
    NotAFunction { name: String, found: String },

    #[error("execution exceeded {0:?}")]
    DeadlineExceeded(Duration),

    #[error("value conversion failed: {0}")]
    Conversion(String),

    #[error("operation not supported by {engine}: {operation}")]
    Unsupported {
        engine: String,
        operation: &'static str,
    },
}

/// Unified interface for scripting runtimes.
pub trait ScriptEngine: Send + Sync + 'static {
    /// Human-readable runtime name (`lua-5.4`, ...).
    fn engine_name(&self) -> &str;

    /// Canonical language identifier this engine was located by.
    fn language(&self) -> &str;

    /// Report runtime capabilities to callers.
    fn capabilities(&self) -> EngineCapabilities;

    /// Parse `source` into an executable body. `name` labels diagnostics.
    ///
    /// Compilation must not run any top-level statements.
    fn compile(&self, name: &str, source: &str) -> Result<Box<dyn CompiledScript>, EngineError>;
}

/// An engine-owned, pre-parsed script body.
///
/// Implementations must be callable from many threads at once.
pub trait CompiledScript: Send + Sync {
    /// Run the body once with `bindings` visible as variables.
    ///
    /// This is the pre-execution step that establishes the script's
    /// top-level functions. Bindings are not retained afterwards.
    fn evaluate(&self, bindings: &Bindings) -> Result<Value, EngineError>;

    /// Call a top-level function defined by a previous [`evaluate`].
    ///
    /// [`evaluate`]: CompiledScript::evaluate
    fn invoke(&self, function: &str, args: &[Value]) -> Result<Value, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capabilities_all_false() {
        let caps = EngineCapabilities::default();
        assert!(!caps.supports_precompilation);
        assert!(!caps.supports_invoke);
        assert!(!caps.thread_safe_compile);
        assert_eq!(caps.max_execution_time, None);
    }

    #[test]
    fn engine_error_messages_name_the_culprit() {
        assert_eq!(
            EngineError::MissingFunction("hello".into()).to_string(),
            "function `hello` is not defined"
        );
        let err = EngineError::NotAFunction {
            name: "x".into(),
            found: "number".into(),
        };
        assert_eq!(err.to_string(), "`x` is a number, not a function");
        let err = EngineError::Unsupported {
            engine: "toy".into(),
            operation: "invoke",
        };
        assert!(err.to_string().contains("toy"));
    }
}

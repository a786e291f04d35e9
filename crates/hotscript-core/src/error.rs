//! Error types for hotscript-core

use crate::engine::EngineError;
use crate::value::ConversionError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using the library's error type
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Flat classification of [`ScriptError`], stable for matching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SourceUnavailable,
    CompileError,
    RuntimeError,
    NotInvocable,
    UnknownScript,
    InvocationError,
    EngineUnavailable,
    PrecompilationUnsupported,
    RegistryFull,
    Conversion,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceUnavailable => "source_unavailable",
            Self::CompileError => "compile_error",
            Self::RuntimeError => "runtime_error",
            Self::NotInvocable => "not_invocable",
            Self::UnknownScript => "unknown_script",
            Self::InvocationError => "invocation_error",
            Self::EngineUnavailable => "engine_unavailable",
            Self::PrecompilationUnsupported => "precompilation_unsupported",
            Self::RegistryFull => "registry_full",
            Self::Conversion => "conversion",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a function invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationFailure {
    #[error("function is not defined")]
    MissingFunction,

    #[error("target is a {0}, not a function")]
    NotAFunction(String),

    #[error("timed out after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("{0}")]
    Raised(String),
}

/// Main error type for hotscript-core
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Stream or file input could not be read
    #[error("script source {source_name} is unavailable: {error}")]
    SourceUnavailable {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    /// Engine rejected the source text
    #[error("failed to compile script `{script}`: {diagnostics}")]
    Compile { script: String, diagnostics: String },

    /// Pre-execution or ad-hoc execution raised
    #[error("script `{script}` failed during execution: {diagnostics}")]
    Runtime { script: String, diagnostics: String },

    #[error("script `{key}` is not invocable by engine {engine}")]
    NotInvocable { key: String, engine: String },

    #[error("script `{key}` is not registered")]
    UnknownScript { key: String },

    #[error("calling `{function}` on script `{key}` failed: {failure}")]
    Invocation {
        key: String,
        function: String,
        failure: InvocationFailure,
    },

    #[error("no scripting engine available for language `{language}`")]
    EngineUnavailable { language: String },

    #[error("engine {engine} does not support precompilation")]
    PrecompilationUnsupported { engine: String },

    #[error("script registry is full ({capacity} entries), cannot add `{key}`")]
    RegistryFull { key: String, capacity: usize },

    /// Function result did not have the type the caller asked for
    #[error("result of `{function}` on script `{key}` has the wrong type: {source}")]
    Conversion {
        key: String,
        function: String,
        source: ConversionError,
    },
}

impl ScriptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Self::Compile { .. } => ErrorKind::CompileError,
            Self::Runtime { .. } => ErrorKind::RuntimeError,
            Self::NotInvocable { .. } => ErrorKind::NotInvocable,
            Self::UnknownScript { .. } => ErrorKind::UnknownScript,
            Self::Invocation { .. } => ErrorKind::InvocationError,
            Self::EngineUnavailable { .. } => ErrorKind::EngineUnavailable,
            Self::PrecompilationUnsupported { .. } => ErrorKind::PrecompilationUnsupported,
            Self::RegistryFull { .. } => ErrorKind::RegistryFull,
            Self::Conversion { .. } => ErrorKind::Conversion,
        }
    }

    pub(crate) fn source_unavailable(source_name: impl Into<String>, error: std::io::Error) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            error,
        }
    }

    pub(crate) fn compile(script: &str, err: EngineError) -> Self {
        let diagnostics = match err {
            EngineError::Syntax(message) => message,
            other => other.to_string(),
        };
        Self::Compile {
            script: script.to_string(),
            diagnostics,
        }
    }

    pub(crate) fn runtime(script: &str, err: EngineError) -> Self {
        Self::Runtime {
            script: script.to_string(),
            diagnostics: err.to_string(),
        }
    }

    /// Map an engine failure during invocation. An engine that refuses the
    /// call outright makes the script not invocable.
    pub(crate) fn invocation(key: &str, function: &str, err: EngineError) -> Self {
        let failure = match err {
            EngineError::Unsupported { engine, .. } => {
                return Self::NotInvocable {
                    key: key.to_string(),
                    engine,
                };
            }
            EngineError::MissingFunction(_) => InvocationFailure::MissingFunction,
            EngineError::NotAFunction { found, .. } => InvocationFailure::NotAFunction(found),
            EngineError::DeadlineExceeded(limit) => InvocationFailure::DeadlineExceeded(limit),
            EngineError::Runtime(message) => InvocationFailure::Raised(message),
            other => InvocationFailure::Raised(other.to_string()),
        };
        Self::Invocation {
            key: key.to_string(),
            function: function.to_string(),
            failure,
        }
    }
}

//! Registration pipeline: source → compile → pre-execute → publish.
//!
//! A form becomes visible under its key only after pre-execution has
//! succeeded. Any failure along the way leaves the registry untouched,
//! including a previous entry for the same key.

use crate::error::ScriptError;
use crate::provider::EngineProvider;
use crate::registry::{CompiledForm, ScriptRegistry};
use crate::value::{Bindings, Value};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Where registration reads script text from.
pub enum ScriptSource {
    Text(String),
    Reader(Box<dyn Read + Send>),
    File(PathBuf),
}

impl ScriptSource {
    pub fn text(source: impl Into<String>) -> Self {
        Self::Text(source.into())
    }

    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }

    /// Short label for logs and diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Text(_) => "<text>".to_string(),
            Self::Reader(_) => "<stream>".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }

    /// Stream and file inputs must yield non-empty text.
    pub(crate) fn read_to_string(self) -> Result<String, ScriptError> {
        let label = self.describe();
        let text = match self {
            Self::Text(text) => return Ok(text),
            Self::Reader(mut reader) => {
                let mut text = String::new();
                reader
                    .read_to_string(&mut text)
                    .map_err(|err| ScriptError::source_unavailable(&label, err))?;
                text
            }
            Self::File(path) => std::fs::read_to_string(&path)
                .map_err(|err| ScriptError::source_unavailable(&label, err))?,
        };

        if text.trim().is_empty() {
            return Err(ScriptError::source_unavailable(
                label,
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "script source is empty"),
            ));
        }
        Ok(text)
    }
}

impl fmt::Debug for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScriptSource").field(&self.describe()).finish()
    }
}

impl From<&str> for ScriptSource {
    fn from(source: &str) -> Self {
        Self::text(source)
    }
}

impl From<String> for ScriptSource {
    fn from(source: String) -> Self {
        Self::Text(source)
    }
}

impl From<PathBuf> for ScriptSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&Path> for ScriptSource {
    fn from(path: &Path) -> Self {
        Self::file(path)
    }
}

/// Compiles, pre-executes and publishes scripts into a [`ScriptRegistry`].
#[derive(Debug, Clone)]
pub struct RegistrationPipeline {
    provider: Arc<EngineProvider>,
    registry: Arc<ScriptRegistry>,
}

impl RegistrationPipeline {
    pub fn new(provider: Arc<EngineProvider>, registry: Arc<ScriptRegistry>) -> Self {
        Self { provider, registry }
    }

    /// Register `source` under `key`, returning the pre-execution result.
    pub fn register(
        &self,
        key: &str,
        source: ScriptSource,
        bindings: &Bindings,
    ) -> Result<Value, ScriptError> {
        let origin = source.describe();
        let result = self.register_inner(key, source, bindings);
        if let Err(err) = &result {
            error!(
                key,
                source = %origin,
                kind = %err.kind(),
                error = %err,
                "script registration failed"
            );
        }
        result
    }

    fn register_inner(
        &self,
        key: &str,
        source: ScriptSource,
        bindings: &Bindings,
    ) -> Result<Value, ScriptError> {
        let engine = self.provider.engine()?;
        if !self.provider.supports_precompilation() {
            return Err(ScriptError::PrecompilationUnsupported {
                engine: engine.engine_name().to_string(),
            });
        }

        let text = source.read_to_string()?;
        let started = Instant::now();
        let body = self.provider.compile(key, &text)?;
        let value = body
            .evaluate(bindings)
            .map_err(|err| ScriptError::runtime(key, err))?;

        let form = CompiledForm::new(key, body, Arc::clone(engine));
        let published = self.registry.publish(form)?;

        info!(
            key,
            generation = published.generation,
            replaced = published.replaced.is_some(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "script registered"
        );
        Ok(value)
    }
}

//! Engine provider: resolves one scripting engine by language id at startup
//! and hands it to the registry, dispatcher and ad-hoc evaluator.
//!
//! The provider is constructed explicitly and passed in, never looked up
//! globally, so tests can substitute a fake engine.

use crate::engine::{CompiledScript, ScriptEngine};
use crate::error::ScriptError;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};

/// Options handed to engine factories.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub call_timeout: Option<Duration>,
}

/// Resolves a language identifier to an engine handle.
pub trait EngineLocator {
    fn locate(&self, language: &str) -> Option<Arc<dyn ScriptEngine>>;
}

type EngineFactory = Arc<dyn Fn(&EngineOptions) -> Arc<dyn ScriptEngine> + Send + Sync>;

/// Locator over a table of engine factories keyed by lowercase language id.
pub struct BuiltinLocator {
    factories: BTreeMap<String, EngineFactory>,
    options: EngineOptions,
}

impl fmt::Debug for BuiltinLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinLocator")
            .field("languages", &self.languages())
            .field("options", &self.options)
            .finish()
    }
}

impl Default for BuiltinLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinLocator {
    /// Locator with every engine compiled into this build.
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut locator = Self::empty();
        #[cfg(feature = "lua")]
        {
            locator = locator.with_aliases(
                &["lua", "lua54", "lua5.4"],
                |options: &EngineOptions| -> Arc<dyn ScriptEngine> {
                    Arc::new(
                        crate::lua_engine::LuaEngine::new()
                            .with_call_timeout(options.call_timeout),
                    )
                },
            );
        }
        locator
    }

    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
            options: EngineOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Add (or override) the engine for `language`.
    #[must_use]
    pub fn with_engine<F>(self, language: &str, factory: F) -> Self
    where
        F: Fn(&EngineOptions) -> Arc<dyn ScriptEngine> + Send + Sync + 'static,
    {
        self.with_aliases(&[language], factory)
    }

    fn with_aliases<F>(mut self, languages: &[&str], factory: F) -> Self
    where
        F: Fn(&EngineOptions) -> Arc<dyn ScriptEngine> + Send + Sync + 'static,
    {
        let factory: EngineFactory = Arc::new(factory);
        for language in languages {
            self.factories
                .insert(normalize_language(language), Arc::clone(&factory));
        }
        self
    }

    pub fn languages(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl EngineLocator for BuiltinLocator {
    fn locate(&self, language: &str) -> Option<Arc<dyn ScriptEngine>> {
        self.factories
            .get(&normalize_language(language))
            .map(|factory| factory(&self.options))
    }
}

fn normalize_language(language: &str) -> String {
    language.trim().to_ascii_lowercase()
}

/// Holds the process-wide engine handle and its probed capabilities.
///
/// An unavailable provider is still a valid value: every operation routed
/// through it fails with `EngineUnavailable`.
pub struct EngineProvider {
    language: String,
    engine: Option<Arc<dyn ScriptEngine>>,
    supports_precompilation: bool,
    compile_lock: Option<Mutex<()>>,
}

impl fmt::Debug for EngineProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineProvider")
            .field("language", &self.language)
            .field("engine", &self.engine.as_ref().map(|e| e.engine_name()))
            .field("supports_precompilation", &self.supports_precompilation)
            .field("serialized_compile", &self.compile_lock.is_some())
            .finish()
    }
}

impl EngineProvider {
    /// Locate the engine for `language`. A missing engine is logged and
    /// yields an unavailable provider.
    pub fn init(language: &str, locator: &dyn EngineLocator) -> Self {
        match locator.locate(language) {
            Some(engine) => {
                info!(
                    language,
                    engine = engine.engine_name(),
                    "script engine initialized"
                );
                Self::from_engine(engine)
            }
            None => {
                error!(language, "no script engine found for language");
                Self::unavailable(language)
            }
        }
    }

    /// Like [`EngineProvider::init`] but fails fast when no engine is found.
    pub fn try_init(language: &str, locator: &dyn EngineLocator) -> Result<Self, ScriptError> {
        let provider = Self::init(language, locator);
        if provider.is_available() {
            Ok(provider)
        } else {
            Err(ScriptError::EngineUnavailable {
                language: language.to_string(),
            })
        }
    }

    /// Wrap an already constructed engine. Compilation is serialized.
    pub fn from_engine(engine: Arc<dyn ScriptEngine>) -> Self {
        let caps = engine.capabilities();
        Self {
            language: engine.language().to_string(),
            supports_precompilation: caps.supports_precompilation,
            engine: Some(engine),
            compile_lock: Some(Mutex::new(())),
        }
    }

    pub fn unavailable(language: &str) -> Self {
        Self {
            language: language.to_string(),
            engine: None,
            supports_precompilation: false,
            compile_lock: None,
        }
    }

    /// Serialize `compile` calls on this engine (the default). Turning it
    /// off only takes effect for engines reporting thread-safe compilation.
    #[must_use]
    pub fn serialize_compile(mut self, serialize: bool) -> Self {
        let thread_safe = self
            .engine
            .as_ref()
            .is_some_and(|engine| engine.capabilities().thread_safe_compile);
        self.compile_lock = (serialize || !thread_safe).then(|| Mutex::new(()));
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    pub fn supports_precompilation(&self) -> bool {
        self.supports_precompilation
    }

    pub fn compiles_serially(&self) -> bool {
        self.compile_lock.is_some()
    }

    pub fn engine(&self) -> Result<&Arc<dyn ScriptEngine>, ScriptError> {
        self.engine
            .as_ref()
            .ok_or_else(|| ScriptError::EngineUnavailable {
                language: self.language.clone(),
            })
    }

    /// Compile `source`, labelling diagnostics with `name`.
    pub fn compile(&self, name: &str, source: &str) -> Result<Box<dyn CompiledScript>, ScriptError> {
        let engine = self.engine()?;
        let _guard = match &self.compile_lock {
            Some(lock) => Some(lock.lock().unwrap_or_else(|e| e.into_inner())),
            None => None,
        };
        debug!(script = name, engine = engine.engine_name(), "compiling script");
        engine
            .compile(name, source)
            .map_err(|err| ScriptError::compile(name, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCapabilities, EngineError};
    use crate::error::ErrorKind;

    struct NamedEngine {
        caps: EngineCapabilities,
    }

    impl ScriptEngine for NamedEngine {
        fn engine_name(&self) -> &str {
            "named"
        }

        fn language(&self) -> &str {
            "named"
        }

        fn capabilities(&self) -> EngineCapabilities {
            self.caps.clone()
        }

        fn compile(&self, _name: &str, source: &str) -> Result<Box<dyn CompiledScript>, EngineError> {
            Err(EngineError::Syntax(format!("cannot parse {source}")))
        }
    }

    fn named(caps: EngineCapabilities) -> Arc<dyn ScriptEngine> {
        Arc::new(NamedEngine { caps })
    }

    #[test]
    fn unknown_language_yields_unavailable_provider() {
        let provider = EngineProvider::init("cobol", &BuiltinLocator::empty());
        assert!(!provider.is_available());
        assert!(!provider.supports_precompilation());
        let err = provider.compile("k", "x").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::EngineUnavailable);
    }

    #[test]
    fn try_init_fails_fast() {
        let err = EngineProvider::try_init("cobol", &BuiltinLocator::empty()).unwrap_err();
        assert!(matches!(err, ScriptError::EngineUnavailable { language } if language == "cobol"));
    }

    #[test]
    fn custom_engines_are_located_case_insensitively() {
        let locator = BuiltinLocator::empty().with_engine("Named", |_| {
            named(EngineCapabilities {
                supports_precompilation: true,
                ..EngineCapabilities::default()
            })
        });
        assert_eq!(locator.languages(), vec!["named".to_string()]);

        let provider = EngineProvider::try_init(" NAMED ", &locator).unwrap();
        assert!(provider.supports_precompilation());
        assert_eq!(provider.language(), "named");
    }

    #[test]
    fn compile_errors_carry_script_name() {
        let provider = EngineProvider::from_engine(named(EngineCapabilities::default()));
        match provider.compile("rules", "garbage").err().unwrap() {
            ScriptError::Compile { script, diagnostics } => {
                assert_eq!(script, "rules");
                assert_eq!(diagnostics, "cannot parse garbage");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn compile_serialization_cannot_be_dropped_for_unsafe_engines() {
        let unsafe_compile = EngineProvider::from_engine(named(EngineCapabilities::default()))
            .serialize_compile(false);
        assert!(unsafe_compile.compiles_serially());

        let safe_compile = EngineProvider::from_engine(named(EngineCapabilities {
            thread_safe_compile: true,
            ..EngineCapabilities::default()
        }))
        .serialize_compile(false);
        assert!(!safe_compile.compiles_serially());
        assert!(
            EngineProvider::from_engine(named(EngineCapabilities::default())).compiles_serially()
        );
    }

    #[cfg(feature = "lua")]
    #[test]
    fn builtin_locator_knows_lua_aliases() {
        let locator = BuiltinLocator::new();
        for alias in ["lua", "LUA", "lua54", "lua5.4"] {
            let engine = locator.locate(alias).unwrap();
            assert_eq!(engine.engine_name(), "lua-5.4");
        }
    }

    #[cfg(feature = "lua")]
    #[test]
    fn builtin_locator_passes_timeout_to_lua() {
        let locator = BuiltinLocator::new().with_options(EngineOptions {
            call_timeout: Some(Duration::from_millis(25)),
        });
        let engine = locator.locate("lua").unwrap();
        assert_eq!(
            engine.capabilities().max_execution_time,
            Some(Duration::from_millis(25))
        );
    }
}

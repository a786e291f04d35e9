//! Host configuration (hotscript.toml).
//!
//! ```toml
//! language = "lua"
//! serialize_compile = true
//! max_entries = 512
//! call_timeout_ms = 250
//!
//! [log]
//! level = "info"
//! format = "json"
//!
//! [[scripts]]
//! key = "rules"
//! path = "scripts/rules.lua"
//! bindings = { prefix = "rule:" }
//! ```

use crate::concurrent_map::MAX_SHARDS;
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A script registered by [`ScriptHost::preload`](crate::host::ScriptHost::preload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreloadScript {
    pub key: String,
    pub path: PathBuf,
    #[serde(default)]
    pub bindings: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Language id handed to the engine locator.
    pub language: String,

    /// Hold a lock around every compile. Can only be relaxed for engines
    /// that report thread-safe compilation.
    pub serialize_compile: bool,

    /// Maximum number of registered keys. Unbounded when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,

    /// Deadline for each function invocation, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timeout_ms: Option<u64>,

    /// Registry shard count.
    pub shards: usize,

    pub log: LogConfig,

    pub scripts: Vec<PreloadScript>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            language: "lua".to_string(),
            serialize_compile: true,
            max_entries: None,
            call_timeout_ms: None,
            shards: crate::concurrent_map::DEFAULT_SHARDS,
            log: LogConfig::default(),
            scripts: Vec::new(),
        }
    }
}

impl HostConfig {
    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;

        // relative preload paths are resolved against the config file
        if let Some(base) = path.parent() {
            for script in &mut config.scripts {
                if script.path.is_relative() {
                    script.path = base.join(&script.path);
                }
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.language.trim().is_empty() {
            return Err(ConfigError::Invalid("language must not be empty".into()));
        }
        if self.max_entries == Some(0) {
            return Err(ConfigError::Invalid("max_entries must be at least 1".into()));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("call_timeout_ms must be at least 1".into()));
        }
        if self.shards == 0 || self.shards > MAX_SHARDS {
            return Err(ConfigError::Invalid(format!(
                "shards must be between 1 and {MAX_SHARDS}, got {}",
                self.shards
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for script in &self.scripts {
            if script.key.is_empty() {
                return Err(ConfigError::Invalid("preload script key must not be empty".into()));
            }
            if !seen.insert(script.key.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "preload script key `{}` listed twice",
                    script.key
                )));
            }
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = HostConfig::from_toml_str("").unwrap();
        assert_eq!(config, HostConfig::default());
        assert_eq!(config.language, "lua");
        assert!(config.serialize_compile);
        assert!(config.call_timeout().is_none());
    }

    #[test]
    fn full_document_parses() {
        let config = HostConfig::from_toml_str(
            r#"
            language = "Lua54"
            serialize_compile = false
            max_entries = 8
            call_timeout_ms = 250
            shards = 16

            [log]
            level = "debug"
            format = "json"

            [[scripts]]
            key = "rules"
            path = "rules.lua"
            bindings = { prefix = "rule:", limit = 3 }
            "#,
        )
        .unwrap();

        assert_eq!(config.language, "Lua54");
        assert!(!config.serialize_compile);
        assert_eq!(config.max_entries, Some(8));
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.scripts.len(), 1);
        assert_eq!(config.scripts[0].bindings["limit"], serde_json::json!(3));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for doc in [
            "language = ' '",
            "max_entries = 0",
            "call_timeout_ms = 0",
            "shards = 0",
            "shards = 100000",
            "[[scripts]]\nkey = ''\npath = 'a.lua'",
            "[[scripts]]\nkey = 'a'\npath = 'a.lua'\n[[scripts]]\nkey = 'a'\npath = 'b.lua'",
        ] {
            assert!(
                matches!(HostConfig::from_toml_str(doc), Err(ConfigError::Invalid(_))),
                "accepted: {doc}"
            );
        }
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            HostConfig::from_toml_str("language = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_resolves_relative_script_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hotscript.toml");
        std::fs::write(&path, "[[scripts]]\nkey = 'a'\npath = 'a.lua'\n").unwrap();

        let config = HostConfig::load(&path).unwrap();
        assert_eq!(config.scripts[0].path, dir.path().join("a.lua"));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = HostConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }
}

//! hotscript-core: compiled-script registry and invocation dispatcher
//!
//! Lets a host keep hot-swappable logic (parsing rules and the like) in
//! scripts outside its binary. Scripts are compiled once, pre-executed
//! once, and then their functions are called as often as needed.
//!
//! # Architecture
//!
//! ```text
//! Host → RegistrationPipeline → ScriptRegistry (write)
//! Host → InvocationDispatcher → ScriptRegistry (read) → CompiledForm
//! Host → AdhocEvaluator → EngineProvider (compile + run, no caching)
//! ```
//!
//! # Modules
//!
//! - `value`: tagged `Value` and `Bindings`
//! - `engine`: the `ScriptEngine` / `CompiledScript` seam
//! - `lua_engine`: Lua 5.4 engine (feature-gated: `lua`, on by default)
//! - `provider`: engine location and the process-wide engine handle
//! - `registry`: key → compiled form mapping
//! - `pipeline`: compile → pre-execute → publish
//! - `dispatcher`: named-function calls on registered scripts
//! - `adhoc`: one-shot evaluation
//! - `host`: `ScriptHost` facade
//! - `config`: TOML host configuration
//! - `logging`: tracing subscriber setup for hosts
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod adhoc;
pub mod concurrent_map;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod host;
pub mod logging;
#[cfg(feature = "lua")]
pub mod lua_engine;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod value;

pub use adhoc::AdhocEvaluator;
pub use config::{ConfigError, HostConfig, PreloadScript};
pub use dispatcher::InvocationDispatcher;
pub use engine::{CompiledScript, EngineCapabilities, EngineError, ScriptEngine};
pub use error::{ErrorKind, InvocationFailure, Result, ScriptError};
pub use host::{PreloadReport, ScriptHost};
#[cfg(feature = "lua")]
pub use lua_engine::LuaEngine;
pub use pipeline::{RegistrationPipeline, ScriptSource};
pub use provider::{BuiltinLocator, EngineLocator, EngineOptions, EngineProvider};
pub use registry::{CompiledForm, ScriptRegistry};
pub use value::{Bindings, ConversionError, Value};

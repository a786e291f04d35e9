//! Shared fixtures for hotscript-core integration tests.
//!
//! `FakeEngine` understands a tiny line-based language:
//!
//! ```text
//! fn NAME => JSON      define NAME returning a constant
//! fn NAME => args      define NAME returning its arguments as an array
//! fn NAME => raise     define NAME that always fails
//! return JSON          pre-execution result
//! return $NAME         pre-execution result is the binding NAME
//! raise MESSAGE        pre-execution fails
//! ```
//!
//! Any other non-empty line is a syntax error. Functions only become
//! callable after pre-execution, like in a real engine.

#![allow(dead_code)]

use hotscript_core::{
    Bindings, CompiledScript, EngineCapabilities, EngineError, EngineProvider, ScriptEngine,
    ScriptHost, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Clone, Debug)]
enum Body {
    Const(Value),
    Args,
    Raise,
}

#[derive(Clone, Debug)]
enum Outcome {
    Const(Value),
    Binding(String),
    Raise(String),
}

pub struct FakeEngine {
    compiles: Arc<AtomicUsize>,
    caps: EngineCapabilities,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            compiles: Arc::new(AtomicUsize::new(0)),
            caps: EngineCapabilities {
                supports_precompilation: true,
                supports_invoke: true,
                ..EngineCapabilities::default()
            },
        }
    }

    pub fn with_capabilities(mut self, caps: EngineCapabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Shared counter of successful and failed `compile` calls.
    pub fn compile_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.compiles)
    }
}

impl ScriptEngine for FakeEngine {
    fn engine_name(&self) -> &str {
        "fake"
    }

    fn language(&self) -> &str {
        "fake"
    }

    fn capabilities(&self) -> EngineCapabilities {
        self.caps.clone()
    }

    fn compile(&self, _name: &str, source: &str) -> Result<Box<dyn CompiledScript>, EngineError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);

        let mut functions = BTreeMap::new();
        let mut outcome = Outcome::Const(Value::Null);
        for (lineno, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(def) = line.strip_prefix("fn ") {
                let (name, body) = def
                    .split_once("=>")
                    .ok_or_else(|| syntax(lineno, "expected `=>`"))?;
                let body = match body.trim() {
                    "args" => Body::Args,
                    "raise" => Body::Raise,
                    json => Body::Const(parse_json(lineno, json)?),
                };
                functions.insert(name.trim().to_string(), body);
            } else if let Some(rest) = line.strip_prefix("return ") {
                outcome = match rest.trim().strip_prefix('$') {
                    Some(binding) => Outcome::Binding(binding.to_string()),
                    None => Outcome::Const(parse_json(lineno, rest)?),
                };
            } else if let Some(message) = line.strip_prefix("raise ") {
                outcome = Outcome::Raise(message.to_string());
            } else {
                return Err(syntax(lineno, line));
            }
        }

        Ok(Box::new(FakeScript {
            functions,
            outcome,
            evaluated: AtomicBool::new(false),
        }))
    }
}

fn syntax(lineno: usize, detail: &str) -> EngineError {
    EngineError::Syntax(format!("line {}: {detail}", lineno + 1))
}

fn parse_json(lineno: usize, text: &str) -> Result<Value, EngineError> {
    serde_json::from_str::<serde_json::Value>(text.trim())
        .map(Value::from)
        .map_err(|err| syntax(lineno, &err.to_string()))
}

struct FakeScript {
    functions: BTreeMap<String, Body>,
    outcome: Outcome,
    evaluated: AtomicBool,
}

impl CompiledScript for FakeScript {
    fn evaluate(&self, bindings: &Bindings) -> Result<Value, EngineError> {
        let value = match &self.outcome {
            Outcome::Const(value) => value.clone(),
            Outcome::Binding(name) => bindings.get(name).cloned().unwrap_or_default(),
            Outcome::Raise(message) => return Err(EngineError::Runtime(message.clone())),
        };
        self.evaluated.store(true, Ordering::SeqCst);
        Ok(value)
    }

    fn invoke(&self, function: &str, args: &[Value]) -> Result<Value, EngineError> {
        if !self.evaluated.load(Ordering::SeqCst) {
            return Err(EngineError::MissingFunction(function.to_string()));
        }
        match self.functions.get(function) {
            Some(Body::Const(value)) => Ok(value.clone()),
            Some(Body::Args) => Ok(Value::Array(args.to_vec())),
            Some(Body::Raise) => Err(EngineError::Runtime(format!("{function} raised"))),
            None => Err(EngineError::MissingFunction(function.to_string())),
        }
    }
}

/// Host over a fresh [`FakeEngine`] plus its compile counter.
pub fn fake_host() -> (ScriptHost, Arc<AtomicUsize>) {
    let engine = FakeEngine::new();
    let counter = engine.compile_counter();
    (ScriptHost::new(EngineProvider::from_engine(Arc::new(engine))), counter)
}

pub fn compiles(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

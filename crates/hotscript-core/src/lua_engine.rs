use crate::engine::{CompiledScript, EngineCapabilities, EngineError, ScriptEngine};
use crate::value::{Bindings, Value};
use mlua::{Function, HookTriggers, Lua, MultiValue, RegistryKey};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Instructions executed between deadline checks.
const DEADLINE_CHECK_STRIDE: u32 = 1_000;

/// Nesting limit when converting Lua tables, guards against cycles.
const MAX_TABLE_DEPTH: usize = 64;

/// `ScriptEngine` backed by Lua 5.4.
///
/// Every compiled script gets its own Lua state, so scripts registered under
/// different keys never see each other's globals.
#[derive(Debug, Default)]
pub struct LuaEngine {
    call_timeout: Option<Duration>,
}

impl LuaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort function invocations that run longer than `timeout`.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }
}

impl ScriptEngine for LuaEngine {
    fn engine_name(&self) -> &str {
        "lua-5.4"
    }

    fn language(&self) -> &str {
        "lua"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_precompilation: true,
            supports_invoke: true,
            thread_safe_compile: true,
            max_execution_time: self.call_timeout,
        }
    }

    fn compile(&self, name: &str, source: &str) -> Result<Box<dyn CompiledScript>, EngineError> {
        let lua = Lua::new();
        let chunk = {
            let function = lua
                .load(source.trim_start_matches('\u{FEFF}'))
                .set_name(name)
                .into_function()
                .map_err(compile_error)?;
            lua.create_registry_value(function)
                .map_err(runtime_error)?
        };
        Ok(Box::new(LuaCompiledScript {
            state: Mutex::new(LuaState { lua, chunk }),
            call_timeout: self.call_timeout,
        }))
    }
}

struct LuaState {
    lua: Lua,
    chunk: RegistryKey,
}

struct LuaCompiledScript {
    state: Mutex<LuaState>,
    call_timeout: Option<Duration>,
}

impl LuaCompiledScript {
    fn lock(&self) -> Result<MutexGuard<'_, LuaState>, EngineError> {
        self.state
            .lock()
            .map_err(|_| EngineError::Runtime("lua state lock poisoned".to_string()))
    }
}

impl CompiledScript for LuaCompiledScript {
    /// Bindings are visible as globals for the run only. They sit behind a
    /// temporary `__index` on the globals table, so anything the chunk
    /// assigns (including a name that was bound) becomes a real global and
    /// outlives the run, while bindings it never assigned disappear.
    fn evaluate(&self, bindings: &Bindings) -> Result<Value, EngineError> {
        let state = self.lock()?;
        let lua = &state.lua;
        let globals = lua.globals();

        let scope = lua.create_table().map_err(runtime_error)?;
        for (name, value) in bindings.iter() {
            scope
                .raw_set(name, to_lua(lua, value)?)
                .map_err(conversion_error)?;
        }
        let meta = lua.create_table().map_err(runtime_error)?;
        meta.raw_set("__index", scope).map_err(runtime_error)?;

        // bound names hide existing globals for the run
        let mut shadowed = Vec::new();
        for (name, _) in bindings.iter() {
            let previous: mlua::Value = globals.raw_get(name).map_err(runtime_error)?;
            if !matches!(previous, mlua::Value::Nil) {
                globals.raw_set(name, mlua::Value::Nil).map_err(runtime_error)?;
                shadowed.push((name, previous));
            }
        }
        let previous_meta = globals.get_metatable();
        globals.set_metatable(Some(meta));

        let chunk: Function = lua.registry_value(&state.chunk).map_err(runtime_error)?;
        let result = chunk.call::<_, MultiValue>(());

        globals.set_metatable(previous_meta);
        let restored = shadowed.into_iter().try_for_each(|(name, previous)| {
            let current: mlua::Value = globals.raw_get(name)?;
            if matches!(current, mlua::Value::Nil) {
                globals.raw_set(name, previous)?;
            }
            Ok::<_, mlua::Error>(())
        });

        let values = result.map_err(runtime_error)?;
        restored.map_err(runtime_error)?;
        from_lua_multi(values)
    }

    fn invoke(&self, function: &str, args: &[Value]) -> Result<Value, EngineError> {
        let state = self.lock()?;
        let lua = &state.lua;

        let target: mlua::Value = lua.globals().raw_get(function).map_err(runtime_error)?;
        let func = match target {
            mlua::Value::Function(func) => func,
            mlua::Value::Nil => return Err(EngineError::MissingFunction(function.to_string())),
            other => {
                return Err(EngineError::NotAFunction {
                    name: function.to_string(),
                    found: other.type_name().to_string(),
                });
            }
        };

        let lua_args = args
            .iter()
            .map(|arg| to_lua(lua, arg))
            .collect::<Result<Vec<_>, _>>()?;
        let values = call_with_deadline(lua, &func, MultiValue::from_vec(lua_args), self.call_timeout)?;
        from_lua_multi(values)
    }
}

fn call_with_deadline<'lua>(
    lua: &'lua Lua,
    func: &Function<'lua>,
    args: MultiValue<'lua>,
    timeout: Option<Duration>,
) -> Result<MultiValue<'lua>, EngineError> {
    let Some(timeout) = timeout else {
        return func.call(args).map_err(runtime_error);
    };

    let deadline = Instant::now() + timeout;
    let expired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&expired);
    let triggers = HookTriggers {
        every_nth_instruction: Some(DEADLINE_CHECK_STRIDE),
        ..HookTriggers::default()
    };
    // Once expired, every later tick raises again. Code that catches errors
    // with pcall in a loop is only stopped when a tick lands outside the
    // protected call.
    lua.set_hook(triggers, move |_lua, _debug| {
        if flag.load(Ordering::Relaxed) || Instant::now() >= deadline {
            flag.store(true, Ordering::Relaxed);
            return Err(mlua::Error::RuntimeError("deadline exceeded".to_string()));
        }
        Ok(())
    });

    let result = func.call::<_, MultiValue>(args);
    lua.remove_hook();

    if expired.load(Ordering::Relaxed) {
        return Err(EngineError::DeadlineExceeded(timeout));
    }
    result.map_err(runtime_error)
}

fn compile_error(err: mlua::Error) -> EngineError {
    match err {
        mlua::Error::SyntaxError { message, .. } => EngineError::Syntax(message),
        other => EngineError::Runtime(other.to_string()),
    }
}

fn runtime_error(err: mlua::Error) -> EngineError {
    EngineError::Runtime(err.to_string())
}

fn conversion_error(err: mlua::Error) -> EngineError {
    EngineError::Conversion(err.to_string())
}

fn to_lua<'lua>(lua: &'lua Lua, value: &Value) -> Result<mlua::Value<'lua>, EngineError> {
    Ok(match value {
        Value::Null => mlua::Value::Nil,
        Value::Bool(b) => mlua::Value::Boolean(*b),
        Value::I64(i) => mlua::Value::Integer(*i),
        Value::F64(f) => mlua::Value::Number(*f),
        Value::String(s) => mlua::Value::String(lua.create_string(s).map_err(conversion_error)?),
        Value::Array(items) => {
            let table = lua.create_table().map_err(conversion_error)?;
            for (idx, item) in items.iter().enumerate() {
                table
                    .raw_set(idx + 1, to_lua(lua, item)?)
                    .map_err(conversion_error)?;
            }
            mlua::Value::Table(table)
        }
        Value::Object(map) => {
            let table = lua.create_table().map_err(conversion_error)?;
            for (key, item) in map {
                table
                    .raw_set(key.as_str(), to_lua(lua, item)?)
                    .map_err(conversion_error)?;
            }
            mlua::Value::Table(table)
        }
    })
}

/// No results is `Null`, one result is itself, several become an array.
fn from_lua_multi(values: MultiValue<'_>) -> Result<Value, EngineError> {
    let mut values = values.into_vec();
    if values.len() <= 1 {
        return values.pop().map_or(Ok(Value::Null), |v| from_lua(v, 0));
    }
    values
        .into_iter()
        .map(|v| from_lua(v, 0))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn from_lua(value: mlua::Value<'_>, depth: usize) -> Result<Value, EngineError> {
    match value {
        mlua::Value::Nil => Ok(Value::Null),
        mlua::Value::Boolean(b) => Ok(Value::Bool(b)),
        mlua::Value::Integer(i) => Ok(Value::I64(i)),
        mlua::Value::Number(n) => Ok(Value::F64(n)),
        mlua::Value::String(s) => Ok(Value::String(
            String::from_utf8_lossy(s.as_bytes()).into_owned(),
        )),
        mlua::Value::Table(table) => {
            if depth >= MAX_TABLE_DEPTH {
                return Err(EngineError::Conversion(format!(
                    "table nesting exceeds {MAX_TABLE_DEPTH} levels"
                )));
            }
            let entries = table
                .pairs::<mlua::Value, mlua::Value>()
                .collect::<mlua::Result<Vec<_>>>()
                .map_err(conversion_error)?;
            table_to_value(entries, depth)
        }
        other => Err(EngineError::Conversion(format!(
            "cannot convert lua {} to a value",
            other.type_name()
        ))),
    }
}

/// Tables keyed exactly by `1..=n` are arrays; everything else is an object.
/// An empty table is an empty array.
fn table_to_value(
    entries: Vec<(mlua::Value<'_>, mlua::Value<'_>)>,
    depth: usize,
) -> Result<Value, EngineError> {
    let count = entries.len();
    let is_sequence = entries.iter().all(|(key, _)| {
        matches!(key, mlua::Value::Integer(i) if *i >= 1 && usize::try_from(*i).is_ok_and(|i| i <= count))
    });

    if is_sequence {
        let mut items = vec![Value::Null; count];
        for (key, item) in entries {
            if let mlua::Value::Integer(i) = key {
                items[(i - 1) as usize] = from_lua(item, depth + 1)?;
            }
        }
        return Ok(Value::Array(items));
    }

    let mut map = BTreeMap::new();
    for (key, item) in entries {
        let key = match key {
            mlua::Value::String(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
            mlua::Value::Integer(i) => i.to_string(),
            mlua::Value::Number(n) => n.to_string(),
            mlua::Value::Boolean(b) => b.to_string(),
            other => {
                return Err(EngineError::Conversion(format!(
                    "unsupported table key type {}",
                    other.type_name()
                )));
            }
        };
        map.insert(key, from_lua(item, depth + 1)?);
    }
    Ok(Value::Object(map))
}

//! Tagged values exchanged with script engines.
//!
//! Script results never reach the host as an untyped object. Every result
//! is a [`Value`], and the caller decides what it expects with an explicit,
//! fallible conversion (`String::try_from(value)?`).

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Engine-independent script value.
///
/// Mirrors the set of shapes a dynamic language can hand back: scalars,
/// sequences and string-keyed maps.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::I64(_) => "I64",
            Self::F64(_) => "F64",
            Self::String(_) => "String",
            Self::Array(_) => "Array",
            Self::Object(_) => "Object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// `None` for [`Value::Null`], the value otherwise.
    pub fn non_null(self) -> Option<Self> {
        if self.is_null() { None } else { Some(self) }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of a numeric value; floats only when they are whole.
    pub fn coerce_i64(&self) -> Option<i64> {
        match self {
            Self::I64(i) => Some(*i),
            Self::F64(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    pub fn coerce_f64(&self) -> Option<f64> {
        match self {
            Self::I64(i) => Some(*i as f64),
            Self::F64(f) => Some(*f),
            _ => None,
        }
    }

    /// Fallible conversion into any type with a `TryFrom<Value>` impl.
    pub fn try_into_typed<T>(self) -> Result<T, ConversionError>
    where
        T: TryFrom<Self, Error = ConversionError>,
    {
        T::try_from(self)
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::I64(i) => serde_json::Value::from(*i),
            Self::F64(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::F64(n.as_f64().unwrap_or(f64::NAN)), Self::I64),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::I64(i) => write!(f, "{i}"),
            Self::F64(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
            Self::Array(_) | Self::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

/// Raised when a [`Value`] does not have the shape the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct ConversionError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl ConversionError {
    fn new(expected: &'static str, value: &Value) -> Self {
        Self {
            expected,
            found: value.variant_name(),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(ConversionError::new("Bool", &other)),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value
            .coerce_i64()
            .ok_or_else(|| ConversionError::new("I64", &value))
    }
}

impl TryFrom<Value> for f64 {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value
            .coerce_f64()
            .ok_or_else(|| ConversionError::new("F64", &value))
    }
}

impl TryFrom<Value> for String {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(ConversionError::new("String", &other)),
        }
    }
}

impl TryFrom<Value> for Vec<Value> {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(items) => Ok(items),
            other => Err(ConversionError::new("Array", &other)),
        }
    }
}

impl TryFrom<Value> for BTreeMap<String, Value> {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(map),
            other => Err(ConversionError::new("Object", &other)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::I64(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::I64(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::I64(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::F64(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Object(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

/// Named values visible to a script for the duration of one
/// compile/execute operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    vars: BTreeMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.vars.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bindings = Self::new();
        for (name, value) in iter {
            bindings.insert(name, value);
        }
        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_is_null() {
        assert_eq!(Value::default(), Value::Null);
        assert!(Value::Null.is_null());
        assert_eq!(Value::Null.non_null(), None);
    }

    #[test]
    fn string_conversion_checks_variant() {
        let ok: Result<String, _> = Value::from("hi").try_into();
        assert_eq!(ok.unwrap(), "hi");

        let err = String::try_from(Value::I64(3)).unwrap_err();
        assert_eq!(err.expected, "String");
        assert_eq!(err.found, "I64");
        assert_eq!(err.to_string(), "expected String, found I64");
    }

    #[test]
    fn whole_floats_coerce_to_integers() {
        assert_eq!(i64::try_from(Value::F64(4.0)).unwrap(), 4);
        assert!(i64::try_from(Value::F64(4.5)).is_err());
        assert_eq!(f64::try_from(Value::I64(2)).unwrap(), 2.0);
    }

    #[test]
    fn option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".into()));
    }

    #[test]
    fn json_conversion_preserves_structure() {
        let json = serde_json::json!({"name": "a", "tags": [1, 2.5, true, null]});
        let value = Value::from(json.clone());
        match &value {
            Value::Object(map) => {
                assert_eq!(map["name"], Value::String("a".into()));
                assert_eq!(
                    map["tags"],
                    Value::Array(vec![
                        Value::I64(1),
                        Value::F64(2.5),
                        Value::Bool(true),
                        Value::Null
                    ])
                );
            }
            other => panic!("expected object, got {other:?}"),
        }
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn display_renders_scalars_plainly() {
        assert_eq!(Value::from("hi world").to_string(), "hi world");
        assert_eq!(Value::Null.to_string(), "nil");
        assert_eq!(Value::from(vec![Value::I64(1)]).to_string(), "[1]");
    }

    #[test]
    fn bindings_builder_and_iteration_order() {
        let bindings = Bindings::new().with("b", 2).with("a", "one");
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings.get("a"), Some(&Value::from("one")));
        let names: Vec<_> = bindings.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn bindings_from_iterator_last_wins() {
        let bindings: Bindings = vec![("x", 1), ("x", 2)].into_iter().collect();
        assert_eq!(bindings.get("x"), Some(&Value::I64(2)));
    }

    proptest! {
        #[test]
        fn i64_roundtrips_through_value(n in any::<i64>()) {
            prop_assert_eq!(i64::try_from(Value::from(n)).unwrap(), n);
        }

        #[test]
        fn string_roundtrips_through_json(s in ".*") {
            let value = Value::from(s.clone());
            prop_assert_eq!(Value::from(value.to_json()), Value::String(s));
        }
    }
}

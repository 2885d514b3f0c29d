use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::BatchError;

/// A value stored in an [`ExecutionContext`].
///
/// Every variant has a restart-safe JSON form, so a context can always be
/// handed to a `JobRepository` as an opaque string blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    /// Any serde-serializable object, stored in its JSON form.
    Object(serde_json::Value),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Object(_) => "object",
        }
    }

    fn validate(&self) -> Result<(), BatchError> {
        match self {
            Value::Float(value) if !value.is_finite() => Err(BatchError::InvalidState(format!(
                "float value {} has no restart-safe representation",
                value
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(value) => write!(f, "{}", value),
            Value::Integer(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::Object(value) => write!(f, "{}", value),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

/// Durable checkpoint state of a step execution.
///
/// An insertion-ordered map from string keys to [`Value`]s. Every mutation
/// marks the context dirty; the flag is only reset by
/// [`clear_dirty_flag`](ExecutionContext::clear_dirty_flag), which callers
/// invoke once the context has been persisted.
///
/// Equality is structural: two contexts holding the same entries are equal
/// whatever their insertion order or dirty flag.
///
/// # Examples
///
/// ```
/// use spring_batch_core::core::execution_context::ExecutionContext;
///
/// let mut context = ExecutionContext::new();
/// context.put("reader.read.count", 42_i64).unwrap();
///
/// assert!(context.is_dirty());
/// assert_eq!(context.get_int("reader.read.count").unwrap(), 42);
///
/// context.clear_dirty_flag();
/// assert!(!context.is_dirty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    entries: IndexMap<String, Value>,
    #[serde(skip)]
    dirty: bool,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    /// `BatchError::InvalidState` when the value has no restart-safe form
    /// (a NaN or infinite float).
    pub fn put(&mut self, key: &str, value: impl Into<Value>) -> Result<(), BatchError> {
        let value = value.into();
        value.validate()?;
        self.entries.insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    /// Stores any serializable object under `key`.
    ///
    /// The object is serialized right away and read back once: a value that
    /// can not be represented, or whose JSON form does not deserialize again
    /// (a NaN field becomes `null`), is rejected here rather than on restart.
    pub fn put_object<T>(&mut self, key: &str, value: &T) -> Result<(), BatchError>
    where
        T: Serialize + DeserializeOwned,
    {
        let json = serde_json::to_value(value).map_err(|error| {
            BatchError::InvalidState(format!("value for key=[{}] is not serializable: {}", key, error))
        })?;
        serde_json::from_value::<T>(json.clone()).map_err(|error| {
            BatchError::InvalidState(format!("value for key=[{}] can not be restored: {}", key, error))
        })?;
        self.put(key, Value::Object(json))
    }

    /// Copies every entry of `other` into this context.
    pub fn put_all(&mut self, other: &ExecutionContext) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
        if !other.entries.is_empty() {
            self.dirty = true;
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_string(&self, key: &str) -> Result<&str, BatchError> {
        match self.entries.get(key) {
            Some(Value::String(value)) => Ok(value),
            other => Err(Self::mismatch(key, "string", other)),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64, BatchError> {
        match self.entries.get(key) {
            Some(Value::Integer(value)) => Ok(*value),
            other => Err(Self::mismatch(key, "integer", other)),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<f64, BatchError> {
        match self.entries.get(key) {
            Some(Value::Float(value)) => Ok(*value),
            other => Err(Self::mismatch(key, "float", other)),
        }
    }

    pub fn get_object<T: DeserializeOwned>(&self, key: &str) -> Result<T, BatchError> {
        match self.entries.get(key) {
            Some(Value::Object(value)) => serde_json::from_value(value.clone()).map_err(|error| {
                BatchError::InvalidState(format!("value for key=[{}] can not be read back: {}", key, error))
            }),
            other => Err(Self::mismatch(key, "object", other)),
        }
    }

    /// Like [`get_string`](Self::get_string) but returns `default` when the key is absent.
    pub fn get_string_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, BatchError> {
        if self.contains_key(key) {
            self.get_string(key)
        } else {
            Ok(default)
        }
    }

    /// Like [`get_int`](Self::get_int) but returns `default` when the key is absent.
    pub fn get_int_or(&self, key: &str, default: i64) -> Result<i64, BatchError> {
        if self.contains_key(key) {
            self.get_int(key)
        } else {
            Ok(default)
        }
    }

    /// Like [`get_float`](Self::get_float) but returns `default` when the key is absent.
    pub fn get_float_or(&self, key: &str, default: f64) -> Result<f64, BatchError> {
        if self.contains_key(key) {
            self.get_float(key)
        } else {
            Ok(default)
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.entries.shift_remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn contains_value(&self, value: &Value) -> bool {
        self.entries.values().any(|stored| stored == value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Acknowledges that the current content has been durably persisted.
    pub fn clear_dirty_flag(&mut self) {
        self.dirty = false;
    }

    /// Serializes the context into the blob handed to a `JobRepository`.
    pub fn to_json(&self) -> Result<String, BatchError> {
        serde_json::to_string(self).map_err(|error| BatchError::InvalidState(error.to_string()))
    }

    /// Rebuilds a context from a blob produced by [`to_json`](Self::to_json).
    ///
    /// The restored context is not dirty.
    pub fn from_json(json: &str) -> Result<Self, BatchError> {
        if json.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_str(json).map_err(|error| BatchError::InvalidState(error.to_string()))
    }

    fn mismatch(key: &str, expected: &'static str, found: Option<&Value>) -> BatchError {
        BatchError::TypeMismatch {
            key: key.to_string(),
            expected,
            found: found.map_or("none", Value::type_name),
        }
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        // IndexMap equality ignores ordering
        self.entries == other.entries
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();

        write!(f, "{{")?;
        for (index, key) in keys.into_iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, self.entries[key])?;
        }
        write!(f, "}}")
    }
}

//! Handler output representation

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HandlerError;

/// JSON object returned by a worker module's `handle` entry point.
///
/// Only JSON-representable values can be stored, so the output always
/// serializes and round-trips without loss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerOutput(Map<String, Value>);

impl HandlerOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output with a single `"result"` key, the shape most modules return.
    ///
    /// # Example
    /// ```
    /// use kre_runner_sdk::HandlerOutput;
    ///
    /// let out = HandlerOutput::result("Hello World!");
    /// assert_eq!(out.to_json().unwrap(), r#"{"result":"Hello World!"}"#);
    /// ```
    pub fn result(value: impl Into<Value>) -> Self {
        Self::new().with("result", value)
    }

    /// Builder pattern: add a key
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Build from any serializable value that maps to a JSON object
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, HandlerError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(HandlerError::InvalidField {
                field: "<output>".to_string(),
                expected: "object",
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn to_json(&self) -> Result<String, HandlerError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for HandlerOutput {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

//! Per-call request data handed to worker modules

use crate::error::HandlerError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// String-keyed data for a single invocation.
///
/// Created fresh by the host for every call and dropped once the module
/// returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestData(Map<String, Value>);

impl RequestData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: add a field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Get a raw field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a field or fail with [`HandlerError::MissingKey`].
    ///
    /// # Example
    /// ```
    /// use kre_runner_sdk::RequestData;
    /// use serde_json::json;
    ///
    /// let data = RequestData::new().with("name", "World");
    /// assert_eq!(data.require("name").unwrap(), &json!("World"));
    /// assert!(data.require("age").is_err());
    /// ```
    pub fn require(&self, key: &str) -> Result<&Value, HandlerError> {
        self.0
            .get(key)
            .ok_or_else(|| HandlerError::MissingKey(key.to_string()))
    }

    /// Get a string field, failing when it is absent or not a string.
    pub fn require_str(&self, key: &str) -> Result<&str, HandlerError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| HandlerError::InvalidField {
                field: key.to_string(),
                expected: "string",
            })
    }

    /// Deserialize a field into a typed value.
    /// Returns None if the field doesn't exist or has the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Deserialize the whole payload into a typed struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RequestData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for RequestData {
    type Error = HandlerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(HandlerError::InvalidField {
                field: "<request>".to_string(),
                expected: "object",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_str() {
        let data = RequestData::new().with("name", "World").with("age", 3);

        assert_eq!(data.require_str("name").unwrap(), "World");
        assert!(matches!(
            data.require_str("missing"),
            Err(HandlerError::MissingKey(key)) if key == "missing"
        ));
        assert!(matches!(
            data.require_str("age"),
            Err(HandlerError::InvalidField { expected: "string", .. })
        ));
        assert_eq!(data.get_as::<u32>("age"), Some(3));
    }

    #[test]
    fn test_from_json_value() {
        let data = RequestData::try_from(json!({"name": "World"})).unwrap();
        assert_eq!(data.len(), 1);

        assert!(RequestData::try_from(json!(["World"])).is_err());
    }

    #[test]
    fn test_parse_typed() {
        #[derive(Deserialize)]
        struct Greet {
            name: String,
        }

        let data = RequestData::new().with("name", "Ada");
        let greet: Greet = data.parse().unwrap();
        assert_eq!(greet.name, "Ada");
    }
}

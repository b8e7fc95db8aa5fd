//! Typed access to a node's semi-structured configuration payload.
//!
//! Every accessor fails with [`NodeError::InvalidTaskConfig`] naming the
//! offending field, using a dotted path for nested objects
//! (e.g. `speed.value`).

use serde_json::{Map, Value};

use crate::NodeError;

/// Read-only view over a JSON object.
#[derive(Debug, Clone)]
pub struct ConfigReader<'a> {
    map: &'a Map<String, Value>,
    prefix: Option<String>,
}

impl<'a> ConfigReader<'a> {
    /// Wrap a payload.  `null` is treated as an empty object so nodes without
    /// configuration (e.g. `Start`) accept a missing `data` field.
    pub fn new(config: &'a Value) -> Result<Self, NodeError> {
        static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
        match config {
            Value::Object(map) => Ok(Self { map, prefix: None }),
            Value::Null => Ok(Self {
                map: EMPTY.get_or_init(Map::new),
                prefix: None,
            }),
            _ => Err(NodeError::config("data", "must be an object")),
        }
    }

    fn path(&self, field: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.to_owned(),
        }
    }

    fn get(&self, field: &str) -> Option<&'a Value> {
        self.map.get(field).filter(|v| !v.is_null())
    }

    fn missing(&self, field: &str) -> NodeError {
        NodeError::config(self.path(field), "is missing")
    }

    fn mistyped(&self, field: &str, expected: &str) -> NodeError {
        NodeError::config(self.path(field), format!("must be {expected}"))
    }

    pub fn str(&self, field: &str) -> Result<&'a str, NodeError> {
        let value = self.get(field).ok_or_else(|| self.missing(field))?;
        value.as_str().ok_or_else(|| self.mistyped(field, "a string"))
    }

    pub fn f64(&self, field: &str) -> Result<f64, NodeError> {
        self.opt_f64(field)?.ok_or_else(|| self.missing(field))
    }

    pub fn bool(&self, field: &str) -> Result<bool, NodeError> {
        self.opt_bool(field)?.ok_or_else(|| self.missing(field))
    }

    /// Nested object; errors inside it are reported as `field.<name>`.
    pub fn object(&self, field: &str) -> Result<ConfigReader<'a>, NodeError> {
        let value = self.get(field).ok_or_else(|| self.missing(field))?;
        let map = value
            .as_object()
            .ok_or_else(|| self.mistyped(field, "an object"))?;
        Ok(ConfigReader {
            map,
            prefix: Some(self.path(field)),
        })
    }

    pub fn opt_str(&self, field: &str) -> Result<Option<&'a str>, NodeError> {
        match self.get(field) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .ok_or_else(|| self.mistyped(field, "a string")),
        }
    }

    pub fn opt_f64(&self, field: &str) -> Result<Option<f64>, NodeError> {
        match self.get(field) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.mistyped(field, "a number")),
        }
    }

    pub fn opt_bool(&self, field: &str) -> Result<Option<bool>, NodeError> {
        match self.get(field) {
            None => Ok(None),
            Some(v) => v
                .as_bool()
                .map(Some)
                .ok_or_else(|| self.mistyped(field, "a boolean")),
        }
    }

    /// Optional list of strings; non-string entries are skipped.
    pub fn opt_str_list(&self, field: &str) -> Result<Vec<&'a str>, NodeError> {
        match self.get(field) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.iter().filter_map(Value::as_str).collect()),
            Some(_) => Err(self.mistyped(field, "a list")),
        }
    }

    /// Non-negative number of milliseconds.
    pub fn millis(&self, field: &str) -> Result<u64, NodeError> {
        let value = self.f64(field)?;
        if value < 0.0 || !value.is_finite() {
            return Err(self.mistyped(field, "a non-negative number of milliseconds"));
        }
        Ok(value as u64)
    }

    pub fn opt_millis(&self, field: &str, default: u64) -> Result<u64, NodeError> {
        match self.get(field) {
            None => Ok(default),
            Some(_) => self.millis(field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_of(err: NodeError) -> String {
        match err {
            NodeError::InvalidTaskConfig { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_and_mistyped_fields_are_named() {
        let config = json!({ "text": 42 });
        let reader = ConfigReader::new(&config).unwrap();
        assert_eq!(field_of(reader.str("text").unwrap_err()), "text");
        assert_eq!(field_of(reader.f64("time").unwrap_err()), "time");
    }

    #[test]
    fn nested_fields_use_dotted_paths() {
        let config = json!({ "speed": { "value": "fast" } });
        let reader = ConfigReader::new(&config).unwrap();
        let speed = reader.object("speed").unwrap();
        assert_eq!(field_of(speed.f64("value").unwrap_err()), "speed.value");

        let config = json!({ "end": { "coordinates": { "x": 1 } } });
        let reader = ConfigReader::new(&config).unwrap();
        let coords = reader.object("end").unwrap().object("coordinates").unwrap();
        assert_eq!(field_of(coords.f64("y").unwrap_err()), "end.coordinates.y");
    }

    #[test]
    fn null_payload_reads_as_empty() {
        let reader = ConfigReader::new(&Value::Null).unwrap();
        assert_eq!(reader.opt_bool("anything").unwrap(), None);
        assert!(ConfigReader::new(&json!([1, 2])).is_err());
    }

    #[test]
    fn negative_millis_are_rejected() {
        let config = json!({ "time": -5 });
        let reader = ConfigReader::new(&config).unwrap();
        assert!(reader.millis("time").is_err());
        assert_eq!(reader.opt_millis("other", 100).unwrap(), 100);
    }
}

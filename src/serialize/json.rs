use serde_json::{Map, Number, Value};
use std::fs;
use std::path::Path;

use super::Serializer;
use crate::error::{Error, Result};

/// A single pretty-printed JSON document per file
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl Serializer for JsonFormat {
    fn extension(&self) -> &str {
        "json"
    }

    fn write_file(&self, data: &Value, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(data)?;
        fs::write(path, content).map_err(|e| Error::file_io(path, e))
    }

    fn read_file(&self, path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path).map_err(|e| Error::file_io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn combine(&self, parts: Vec<Value>) -> Result<Value> {
        Ok(parts.into_iter().fold(Value::Null, merge_values))
    }
}

/// Deep merge of two partial results
///
/// Arrays concatenate, objects merge key by key, numbers add up, nulls are
/// absorbed; any other pairing keeps the later value.
pub fn merge_values(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Null, right) => right,
        (left, Value::Null) => left,
        (Value::Array(mut left), Value::Array(right)) => {
            left.extend(right);
            Value::Array(left)
        }
        (Value::Object(left), Value::Object(right)) => Value::Object(merge_objects(left, right)),
        (Value::Number(left), Value::Number(right)) => add_numbers(&left, &right),
        (_, right) => right,
    }
}

fn merge_objects(mut left: Map<String, Value>, right: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in right {
        let merged = match left.remove(&key) {
            Some(existing) => merge_values(existing, value),
            None => value,
        };
        left.insert(key, merged);
    }
    left
}

fn add_numbers(left: &Number, right: &Number) -> Value {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Value::from(sum);
        }
    }
    if let (Some(a), Some(b)) = (left.as_u64(), right.as_u64()) {
        if let Some(sum) = a.checked_add(b) {
            return Value::from(sum);
        }
    }
    let sum = left.as_f64().unwrap_or(0.0) + right.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).map(Value::Number).unwrap_or(Value::Null)
}

use serde_json::Value;
use std::path::Path;

use super::{append_lines, concat_values, read_lines, records, write_lines, Serializer};
use crate::error::Result;

/// Plain text log, one record per line
///
/// Summaries and timings use this format. A string record is written as-is
/// unless it spans lines or would itself parse as JSON; those strings and all
/// other values are written as compact JSON, so reading decodes each line back
/// to the record that produced it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFormat;

impl LogFormat {
    fn encode(data: &Value) -> Result<Vec<String>> {
        Ok(records(data, "log")?.iter().map(Self::encode_record).collect())
    }

    fn encode_record(record: &Value) -> String {
        match record {
            Value::String(s) if Self::is_plain(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn is_plain(s: &str) -> bool {
        !s.contains(['\n', '\r']) && serde_json::from_str::<Value>(s).is_err()
    }

    fn decode_record(line: String) -> Value {
        serde_json::from_str(&line).unwrap_or(Value::String(line))
    }
}

impl Serializer for LogFormat {
    fn extension(&self) -> &str {
        "txt"
    }

    fn write_file(&self, data: &Value, path: &Path) -> Result<()> {
        write_lines(&Self::encode(data)?, path)
    }

    fn read_file(&self, path: &Path) -> Result<Value> {
        let lines = read_lines(path)?;
        Ok(Value::Array(lines.into_iter().map(Self::decode_record).collect()))
    }

    fn combine(&self, parts: Vec<Value>) -> Result<Value> {
        Ok(concat_values(parts))
    }

    fn supports_fast_merge(&self) -> bool {
        true
    }

    fn append(&self, records: &Value, path: &Path) -> Result<()> {
        append_lines(&Self::encode(records)?, path)
    }
}

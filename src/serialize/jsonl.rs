use serde_json::Value;
use std::path::Path;

use super::{append_lines, concat_values, read_lines, records, write_lines, Serializer};
use crate::error::Result;

/// One compact JSON value per line
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesFormat;

impl JsonLinesFormat {
    fn encode(data: &Value) -> Result<Vec<String>> {
        Ok(records(data, "JSON lines")?
            .iter()
            .map(Value::to_string)
            .collect())
    }
}

impl Serializer for JsonLinesFormat {
    fn extension(&self) -> &str {
        "jsonl"
    }

    fn write_file(&self, data: &Value, path: &Path) -> Result<()> {
        write_lines(&Self::encode(data)?, path)
    }

    fn read_file(&self, path: &Path) -> Result<Value> {
        let records = read_lines(path)?
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line))
            .collect::<std::result::Result<Vec<Value>, _>>()?;
        Ok(Value::Array(records))
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

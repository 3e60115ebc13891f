//! Typed result files
//!
//! Every results file an experiment declares has a [`FileType`]: either a
//! rich [`Serializer`] (log, JSON, JSON lines, or a user implementation) or
//! the raw-text atomic marker, whose extension and behaviour are fixed.
//! [`merge_files`] combines the files written by each piece into the merged
//! location.

mod json;
mod jsonl;
mod log;

pub use json::{merge_values, JsonFormat};
pub use jsonl::JsonLinesFormat;
pub use log::LogFormat;

use serde_json::Value;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};

/// A file format that can write, read and combine result data
pub trait Serializer: Send + Sync + fmt::Debug {
    /// File extension used by the default name template
    fn extension(&self) -> &str;

    fn write_file(&self, data: &Value, path: &Path) -> Result<()>;

    fn read_file(&self, path: &Path) -> Result<Value>;

    /// Combine the contents of several files, in order, into one value
    fn combine(&self, parts: Vec<Value>) -> Result<Value>;

    /// Whether files of this format can be merged by byte concatenation
    fn supports_fast_merge(&self) -> bool {
        false
    }

    /// Add records to the end of an existing file, creating it if absent
    fn append(&self, records: &Value, path: &Path) -> Result<()> {
        let existing = if path.exists() {
            self.read_file(path)?
        } else {
            Value::Null
        };
        let combined = self.combine(vec![existing, records.clone()])?;
        self.write_file(&combined, path)
    }

    /// Read per-stage files, in stage order, and combine their contents
    fn consolidate_stages(&self, stage_paths: &[PathBuf]) -> Result<Value> {
        let parts = stage_paths
            .iter()
            .map(|path| self.read_file(path))
            .collect::<Result<Vec<_>>>()?;
        self.combine(parts)
    }
}

/// How a results file is stored
#[derive(Debug, Clone)]
pub enum FileFormat {
    /// Raw text written and read verbatim
    Text { extension: String },
    Serialized(Arc<dyn Serializer>),
}

impl FileFormat {
    pub fn text(extension: &str) -> Self {
        Self::Text {
            extension: extension.to_string(),
        }
    }

    pub fn log() -> Self {
        Self::Serialized(Arc::new(LogFormat))
    }

    pub fn json() -> Self {
        Self::Serialized(Arc::new(JsonFormat))
    }

    pub fn json_lines() -> Self {
        Self::Serialized(Arc::new(JsonLinesFormat))
    }

    pub fn custom(serializer: Arc<dyn Serializer>) -> Self {
        Self::Serialized(serializer)
    }

    pub fn extension(&self) -> &str {
        match self {
            Self::Text { extension } => extension,
            Self::Serialized(serializer) => serializer.extension(),
        }
    }

    pub fn write(&self, data: &Value, path: &Path) -> Result<()> {
        match self {
            Self::Text { .. } => {
                let text = match data {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                fs::write(path, text).map_err(|e| Error::file_io(path, e))
            }
            Self::Serialized(serializer) => serializer.write_file(data, path),
        }
    }

    pub fn read(&self, path: &Path) -> Result<Value> {
        match self {
            Self::Text { .. } => fs::read_to_string(path)
                .map(Value::String)
                .map_err(|e| Error::file_io(path, e)),
            Self::Serialized(serializer) => serializer.read_file(path),
        }
    }

    pub fn append(&self, records: &Value, path: &Path) -> Result<()> {
        match self {
            Self::Text { .. } => append_lines(&to_lines(records), path),
            Self::Serialized(serializer) => serializer.append(records, path),
        }
    }

    pub fn consolidate_stages(&self, stage_paths: &[PathBuf]) -> Result<Value> {
        match self {
            Self::Text { .. } => {
                let mut text = String::new();
                for path in stage_paths {
                    text.push_str(&fs::read_to_string(path).map_err(|e| Error::file_io(path, e))?);
                }
                Ok(Value::String(text))
            }
            Self::Serialized(serializer) => serializer.consolidate_stages(stage_paths),
        }
    }

    fn concatenates(&self) -> bool {
        match self {
            Self::Text { .. } => true,
            Self::Serialized(serializer) => serializer.supports_fast_merge(),
        }
    }
}

/// Format of a declared results file plus its fast-merge hint
#[derive(Debug, Clone)]
pub struct FileType {
    pub format: FileFormat,
    pub fast_merge: bool,
}

impl FileType {
    pub fn new(format: FileFormat) -> Self {
        Self {
            format,
            fast_merge: false,
        }
    }

    pub fn fast(format: FileFormat) -> Self {
        Self {
            format,
            fast_merge: true,
        }
    }
}

impl From<FileFormat> for FileType {
    fn from(format: FileFormat) -> Self {
        Self::new(format)
    }
}

/// Merge piece files into `merged_path`
///
/// Every input is opened (fast path) or fully read (full path) before the
/// output is created, so a missing piece never leaves a partial merged file.
pub fn merge_files(piece_paths: &[PathBuf], merged_path: &Path, file_type: &FileType) -> Result<()> {
    let format = &file_type.format;
    if file_type.fast_merge && format.concatenates() {
        debug!(
            "Fast merging {} files into {}",
            piece_paths.len(),
            merged_path.display()
        );
        return concatenate_files(piece_paths, merged_path);
    }

    match format {
        FileFormat::Text { .. } => concatenate_files(piece_paths, merged_path),
        FileFormat::Serialized(serializer) => {
            debug!(
                "Merging {} files into {} via {:?}",
                piece_paths.len(),
                merged_path.display(),
                serializer
            );
            let parts = piece_paths
                .iter()
                .map(|path| serializer.read_file(path))
                .collect::<Result<Vec<_>>>()?;
            let combined = serializer.combine(parts)?;
            serializer.write_file(&combined, merged_path)
        }
    }
}

fn concatenate_files(paths: &[PathBuf], merged_path: &Path) -> Result<()> {
    let mut inputs = paths
        .iter()
        .map(|path| File::open(path).map_err(|e| Error::file_io(path, e)))
        .collect::<Result<Vec<_>>>()?;

    let mut output = File::create(merged_path).map_err(|e| Error::file_io(merged_path, e))?;
    for input in inputs.iter_mut() {
        io::copy(input, &mut output).map_err(|e| Error::file_io(merged_path, e))?;
    }
    output.flush().map_err(|e| Error::file_io(merged_path, e))
}

/// One line per record: strings verbatim, everything else as compact JSON
pub(crate) fn to_lines(data: &Value) -> Vec<String> {
    match data {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(record_line).collect(),
        other => vec![record_line(other)],
    }
}

fn record_line(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Array elements of `data`; line formats store nothing else
pub(crate) fn records<'a>(data: &'a Value, format: &str) -> Result<&'a [Value]> {
    match data {
        Value::Array(items) => Ok(items),
        other => Err(Error::config(format!(
            "{format} files hold an array of records, got {}",
            value_kind(other)
        ))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn write_lines(lines: &[String], path: &Path) -> Result<()> {
    let mut content = String::new();
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    fs::write(path, content).map_err(|e| Error::file_io(path, e))
}

pub(crate) fn append_lines(lines: &[String], path: &Path) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::file_io(path, e))?;
    for line in lines {
        writeln!(file, "{line}").map_err(|e| Error::file_io(path, e))?;
    }
    Ok(())
}

pub(crate) fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| Error::file_io(path, e))?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Concatenate arrays; non-array parts count as a single element, nulls as none
pub(crate) fn concat_values(parts: Vec<Value>) -> Value {
    let mut items = Vec::new();
    for part in parts {
        match part {
            Value::Null => {}
            Value::Array(values) => items.extend(values),
            other => items.push(other),
        }
    }
    Value::Array(items)
}

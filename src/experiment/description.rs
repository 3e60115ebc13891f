//! Experiment description files
//!
//! A description is a list of `key value` lines. Lines starting with `#`
//! and blank lines are skipped; every other line must hold exactly two
//! whitespace-separated tokens.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    entries: BTreeMap<String, String>,
}

impl Description {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            match tokens.as_slice() {
                [key, value] => {
                    entries.insert(key.to_string(), value.to_string());
                }
                _ => {
                    return Err(Error::Description {
                        line: index + 1,
                        content: line.to_string(),
                    })
                }
            }
        }

        Ok(Self { entries })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::file_io(path, e))?;
        Self::parse(&content)
    }

    /// Apply overrides on top of the parsed entries
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        for (key, value) in overrides {
            self.entries.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::config(format!("description is missing required key '{key}'")))
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let description = Description::parse(
            "# word count run\nname wc\n\nwork_prefix /work/me\n  # indented comment\nscratch_prefix /scratch/me\n",
        )
        .unwrap();

        assert_eq!(description.len(), 3);
        assert_eq!(description.get("name"), Some("wc"));
        assert_eq!(description.get("scratch_prefix"), Some("/scratch/me"));
    }

    #[test]
    fn test_parse_rejects_malformed_line() {
        let err = Description::parse("name wc\nrelative_results_dir a b\n").unwrap_err();
        match err {
            Error::Description { line, content } => {
                assert_eq!(line, 2);
                assert_eq!(content, "relative_results_dir a b");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_later_lines_and_overrides_win() {
        let mut overrides = BTreeMap::new();
        overrides.insert("group".to_string(), "ablation".to_string());

        let description = Description::parse("name first\nname second\ngroup base\n")
            .unwrap()
            .with_overrides(&overrides);

        assert_eq!(description.get("name"), Some("second"));
        assert_eq!(description.get("group"), Some("ablation"));
    }

    #[test]
    fn test_require_missing_key() {
        let description = Description::parse("name wc\n").unwrap();
        assert!(description.require("work_prefix").unwrap_err().is_configuration());
    }

    #[test]
    fn test_from_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Description::from_file(&dir.path().join("description.txt")).unwrap_err();
        assert!(err.is_io());
    }
}

//! Common test utilities and helpers

#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for a job directory with a description file and prefix directories
pub struct JobDirBuilder {
    temp_dir: TempDir,
    name: String,
    extra: Vec<(String, String)>,
    config: Option<String>,
    files: Vec<(PathBuf, String)>,
}

impl JobDirBuilder {
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
            name: name.to_string(),
            extra: Vec::new(),
            config: None,
            files: Vec::new(),
        })
    }

    /// Add a description key beyond the required ones
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.extra.push((key.to_string(), value.to_string()));
        self
    }

    /// Write `piecework.toml` with the given content
    pub fn with_config(mut self, content: &str) -> Self {
        self.config = Some(content.to_string());
        self
    }

    /// Create a file relative to the temp root before the description is written
    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.push((PathBuf::from(path), content.to_string()));
        self
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn build(self) -> Result<JobDir> {
        let root = self.temp_dir.path().to_path_buf();
        let job_dir = root.join("job");
        fs::create_dir_all(&job_dir)?;

        for (path, content) in &self.files {
            let full = root.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(full, content)?;
        }

        let mut description = format!(
            "# generated for tests\nname {}\nwork_prefix {}\nscratch_prefix {}\nrelative_results_dir results\n",
            self.name,
            root.join("work").display(),
            root.join("scratch").display()
        );
        for (key, value) in &self.extra {
            description.push_str(&format!("{key} {value}\n"));
        }
        fs::write(job_dir.join("description.txt"), description)?;

        if let Some(config) = &self.config {
            fs::write(job_dir.join("piecework.toml"), config)?;
        }

        Ok(JobDir {
            temp_dir: self.temp_dir,
            job_dir,
        })
    }
}

pub struct JobDir {
    temp_dir: TempDir,
    pub job_dir: PathBuf,
}

impl JobDir {
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Merged results directory
    pub fn work_results(&self) -> PathBuf {
        self.root().join("work").join("results")
    }

    /// Scratch results directory of one piece
    pub fn scratch_results(&self, suffix: &str) -> PathBuf {
        self.root().join("scratch").join(format!("results{suffix}"))
    }

    pub fn read_work(&self, file: &str) -> String {
        fs::read_to_string(self.work_results().join(file)).unwrap_or_default()
    }
}

//! Job configuration
//!
//! Settings for launching a job are layered, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. `<job_dir>/piecework.toml`
//! 3. `PIECEWORK_*` environment variables
//! 4. Command-line flags (applied by the CLI router)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::scheduler::SchedulerKind;

pub const CONFIG_FILE_NAME: &str = "piecework.toml";
pub const DEFAULT_TIME_BUDGET: &str = "00:20:00";
pub const DEFAULT_DESCRIPTION_FILE: &str = "description.txt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Backend that runs the pieces
    pub scheduler: SchedulerKind,
    /// Wall-clock budget per cluster job, as `HH:MM:SS`
    pub time_budget: String,
    /// Upper bound on concurrently running local pieces
    pub max_parallel: Option<usize>,
    /// Executable written into command files; defaults to the running binary
    pub program: Option<PathBuf>,
    /// Description file name, relative to the job directory
    pub description_file: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::Local,
            time_budget: DEFAULT_TIME_BUDGET.to_string(),
            max_parallel: None,
            program: None,
            description_file: DEFAULT_DESCRIPTION_FILE.to_string(),
        }
    }
}

impl JobConfig {
    /// Load the job directory's config file (if any), then apply environment overrides
    pub fn load(job_dir: &Path) -> Result<Self> {
        let path = job_dir.join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            debug!("Loading job config from {}", path.display());
            let content = std::fs::read_to_string(&path).map_err(|e| Error::file_io(&path, e))?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env(|key| std::env::var(key).ok())
    }

    pub fn merge_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(scheduler) = lookup("PIECEWORK_SCHEDULER") {
            self.scheduler = scheduler.parse()?;
        }

        if let Some(time_budget) = lookup("PIECEWORK_TIME_BUDGET") {
            self.time_budget = time_budget;
        }

        if let Some(max_parallel) = lookup("PIECEWORK_MAX_PARALLEL") {
            let value = max_parallel.parse::<usize>().map_err(|_| {
                Error::config(format!("PIECEWORK_MAX_PARALLEL must be a number, got '{max_parallel}'"))
            })?;
            self.max_parallel = Some(value);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        parse_time_budget(&self.time_budget)?;
        if self.max_parallel == Some(0) {
            return Err(Error::config("max_parallel must be at least 1"));
        }
        Ok(())
    }

    pub fn time_budget(&self) -> Result<Duration> {
        parse_time_budget(&self.time_budget)
    }

    pub fn description_path(&self, job_dir: &Path) -> PathBuf {
        job_dir.join(&self.description_file)
    }
}

/// Parse an `HH:MM:SS` wall-clock budget
pub fn parse_time_budget(value: &str) -> Result<Duration> {
    let invalid = || Error::config(format!("time budget must look like HH:MM:SS, got '{value}'"));

    let parts = value
        .split(':')
        .map(|part| part.parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>>>()?;

    match parts.as_slice() {
        [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => {
            Ok(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
        }
        _ => Err(invalid()),
    }
}

pub fn format_time_budget(budget: Duration) -> String {
    let total = budget.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

//! Scheduler backends
//!
//! A [`LaunchPlan`] lists, per stage, the piece command lines and the finish
//! command line. A [`Scheduler`] turns that plan into running work:
//!
//! - [`ClusterScheduler`] submits one batch job per stage, each holding on the
//!   previous stage's job, so stage `s` starts only after stage `s - 1` has
//!   merged and cleaned up.
//! - [`LocalScheduler`] runs every piece of a stage concurrently, waits for all
//!   of them, runs the finish command, then moves to the next stage.

pub mod cluster;
pub mod launcher;
pub mod local;

pub use cluster::{ClusterFlavor, ClusterScheduler};
pub use launcher::LauncherScript;
pub use local::LocalScheduler;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::subprocess::ProcessRunner;

/// Which backend runs a job
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    /// Run pieces as local processes
    #[default]
    Local,
    /// Submit with `sbatch`
    Slurm,
    /// Submit with `qsub` (Sun Grid Engine)
    Sge,
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerKind::Local => write!(f, "local"),
            SchedulerKind::Slurm => write!(f, "slurm"),
            SchedulerKind::Sge => write!(f, "sge"),
        }
    }
}

impl FromStr for SchedulerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(SchedulerKind::Local),
            "slurm" => Ok(SchedulerKind::Slurm),
            "sge" => Ok(SchedulerKind::Sge),
            other => Err(Error::config(format!(
                "unknown scheduler '{other}' (expected local, slurm or sge)"
            ))),
        }
    }
}

/// Commands for one stage of a launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePlan {
    pub stage: usize,
    pub job_name: String,
    pub process_file: PathBuf,
    pub finish_file: PathBuf,
    pub process_commands: Vec<String>,
    pub finish_command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    pub job_dir: PathBuf,
    pub num_pieces: usize,
    pub stages: Vec<StagePlan>,
}

/// What happened to one stage at launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSubmission {
    pub stage: usize,
    /// Scheduler job id, for cluster submissions
    pub job_id: Option<String>,
    /// Job id this stage was held on
    pub hold_on: Option<String>,
    /// Submission script written for this stage
    pub script: Option<PathBuf>,
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    fn kind(&self) -> SchedulerKind;

    /// Submit or run every stage of the plan, in stage order
    async fn submit(&self, plan: &LaunchPlan) -> Result<Vec<StageSubmission>>;
}

/// Build the backend selected by `kind`
pub fn create_scheduler(
    kind: SchedulerKind,
    runner: Arc<dyn ProcessRunner>,
    time_budget: Duration,
    max_parallel: Option<usize>,
) -> Box<dyn Scheduler> {
    match kind {
        SchedulerKind::Local => {
            Box::new(LocalScheduler::new(runner, time_budget, max_parallel))
        }
        SchedulerKind::Slurm => Box::new(ClusterScheduler::new(
            ClusterFlavor::Slurm,
            runner,
            time_budget,
        )),
        SchedulerKind::Sge => Box::new(ClusterScheduler::new(
            ClusterFlavor::Sge,
            runner,
            time_budget,
        )),
    }
}

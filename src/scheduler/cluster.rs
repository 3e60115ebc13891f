//! Batch cluster submission (SLURM and Sun Grid Engine)

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::scheduler::launcher::LauncherScript;
use crate::scheduler::{LaunchPlan, Scheduler, SchedulerKind, StageSubmission};
use crate::subprocess::{ProcessCommandBuilder, ProcessRunner};

static SBATCH_JOB_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Submitted batch job (\d+)").expect("sbatch pattern is valid")
});

static QSUB_JOB_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Your job (\d+)").expect("qsub pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterFlavor {
    Slurm,
    Sge,
}

impl ClusterFlavor {
    pub fn submit_program(&self) -> &'static str {
        match self {
            ClusterFlavor::Slurm => "sbatch",
            ClusterFlavor::Sge => "qsub",
        }
    }

    pub fn script_extension(&self) -> &'static str {
        match self {
            ClusterFlavor::Slurm => "sbatch",
            ClusterFlavor::Sge => "qsub",
        }
    }

    pub fn kind(&self) -> SchedulerKind {
        match self {
            ClusterFlavor::Slurm => SchedulerKind::Slurm,
            ClusterFlavor::Sge => SchedulerKind::Sge,
        }
    }

    /// Extract the job id from the submitter's stdout
    pub fn parse_job_id(&self, stdout: &str) -> Result<String> {
        let pattern = match self {
            ClusterFlavor::Slurm => &*SBATCH_JOB_ID,
            ClusterFlavor::Sge => &*QSUB_JOB_ID,
        };
        pattern
            .captures(stdout)
            .and_then(|caps| caps.get(1))
            .map(|id| id.as_str().to_string())
            .ok_or_else(|| {
                Error::submission(format!(
                    "could not find a job id in {} output: {:?}",
                    self.submit_program(),
                    stdout.trim()
                ))
            })
    }
}

pub struct ClusterScheduler {
    flavor: ClusterFlavor,
    runner: Arc<dyn ProcessRunner>,
    time_budget: Duration,
}

impl ClusterScheduler {
    pub fn new(flavor: ClusterFlavor, runner: Arc<dyn ProcessRunner>, time_budget: Duration) -> Self {
        Self {
            flavor,
            runner,
            time_budget,
        }
    }

    async fn submit_script(&self, job_dir: &Path, script_name: &str) -> Result<String> {
        let command = ProcessCommandBuilder::new(self.flavor.submit_program())
            .arg(script_name)
            .current_dir(job_dir)
            .build();
        let display = command.display();

        let output = self.runner.run(command).await?;
        if !output.status.success() {
            return Err(Error::submission(format!(
                "{display} failed with {}: {}",
                output.status,
                output.stderr.trim()
            )));
        }

        debug!("{} output: {}", self.flavor.submit_program(), output.stdout.trim());
        self.flavor.parse_job_id(&output.stdout)
    }
}

#[async_trait]
impl Scheduler for ClusterScheduler {
    fn kind(&self) -> SchedulerKind {
        self.flavor.kind()
    }

    async fn submit(&self, plan: &LaunchPlan) -> Result<Vec<StageSubmission>> {
        let mut submissions = Vec::with_capacity(plan.stages.len());
        let mut previous: Option<String> = None;

        for stage in &plan.stages {
            let script_name = format!("{}.{}", stage.job_name, self.flavor.script_extension());
            let script_path = plan.job_dir.join(&script_name);

            let script = LauncherScript::new(
                stage,
                &plan.job_dir,
                self.time_budget,
                previous.as_deref(),
            )
            .render(self.flavor)?;
            std::fs::write(&script_path, script).map_err(|e| Error::file_io(&script_path, e))?;

            let job_id = self.submit_script(&plan.job_dir, &script_name).await?;
            match &previous {
                Some(hold) => info!(
                    "Launched stage {} as job {} holding on {}",
                    stage.stage, job_id, hold
                ),
                None => info!("Launched stage {} as job {}", stage.stage, job_id),
            }

            submissions.push(StageSubmission {
                stage: stage.stage,
                job_id: Some(job_id.clone()),
                hold_on: previous.replace(job_id),
                script: Some(script_path),
            });
        }

        Ok(submissions)
    }
}

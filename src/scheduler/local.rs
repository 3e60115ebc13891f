//! Run a job's pieces as local processes

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::scheduler::{LaunchPlan, Scheduler, SchedulerKind, StageSubmission};
use crate::subprocess::{ProcessCommandBuilder, ProcessRunner};

/// Each piece line and finish line gets the whole time budget, as a cluster
/// job would.
pub struct LocalScheduler {
    runner: Arc<dyn ProcessRunner>,
    time_budget: Duration,
    max_parallel: Option<usize>,
}

impl LocalScheduler {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        time_budget: Duration,
        max_parallel: Option<usize>,
    ) -> Self {
        Self {
            runner,
            time_budget,
            max_parallel,
        }
    }

    async fn run_line(&self, job_dir: &Path, line: &str) -> Result<()> {
        let command = ProcessCommandBuilder::shell(line)
            .current_dir(job_dir)
            .timeout(self.time_budget)
            .build();
        let output = self.runner.run(command).await?;
        if output.status.success() {
            for captured in [&output.stdout, &output.stderr] {
                if !captured.trim().is_empty() {
                    debug!("{}", captured.trim_end());
                }
            }
            Ok(())
        } else {
            if !output.stderr.trim().is_empty() {
                warn!("{}", output.stderr.trim_end());
            }
            Err(Error::CommandFailed {
                command: line.to_string(),
                status: output.status.to_string(),
            })
        }
    }
}

#[async_trait]
impl Scheduler for LocalScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Local
    }

    async fn submit(&self, plan: &LaunchPlan) -> Result<Vec<StageSubmission>> {
        let limit = self.max_parallel.unwrap_or(plan.num_pieces).max(1);
        let mut submissions = Vec::with_capacity(plan.stages.len());

        for stage in &plan.stages {
            info!(
                "Running stage {} with {} pieces ({} at a time)",
                stage.stage,
                stage.process_commands.len(),
                limit
            );

            let runs: Vec<_> = stage
                .process_commands
                .iter()
                .map(|line| self.run_line(&plan.job_dir, line))
                .collect();
            let results: Vec<Result<()>> = stream::iter(runs).buffer_unordered(limit).collect().await;
            // Every piece has been waited for; only now surface the first failure
            results.into_iter().collect::<Result<Vec<_>>>()?;

            self.run_line(&plan.job_dir, &stage.finish_command).await?;
            info!("Finished stage {}", stage.stage);

            submissions.push(StageSubmission {
                stage: stage.stage,
                job_id: None,
                hold_on: None,
                script: None,
            });
        }

        Ok(submissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::StagePlan;
    use crate::subprocess::{MockProcessRunner, TokioProcessRunner};
    use std::path::PathBuf;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn stage(stage: usize, process: &[&str], finish: &str) -> StagePlan {
        StagePlan {
            stage,
            job_name: format!("job_{}_{stage}", process.len()),
            process_file: PathBuf::from(format!("process_{}_stage_{stage}", process.len())),
            finish_file: PathBuf::from(format!("finish_{}_stage_{stage}", process.len())),
            process_commands: process.iter().map(|s| s.to_string()).collect(),
            finish_command: finish.to_string(),
        }
    }

    #[tokio::test]
    async fn test_stage_finishes_after_all_pieces() {
        let dir = TempDir::new().unwrap();
        let plan = LaunchPlan {
            job_dir: dir.path().to_path_buf(),
            num_pieces: 3,
            stages: vec![
                stage(
                    0,
                    &["echo 0 > piece_0", "echo 1 > piece_1", "echo 2 > piece_2"],
                    "cat piece_0 piece_1 piece_2 > merged",
                ),
                stage(1, &["cp merged copy"], "test -s copy"),
            ],
        };

        let scheduler = LocalScheduler::new(Arc::new(TokioProcessRunner), HOUR, Some(2));
        let submissions = scheduler.submit(&plan).await.unwrap();

        assert_eq!(submissions.len(), 2);
        assert!(submissions.iter().all(|s| s.job_id.is_none()));
        let merged = std::fs::read_to_string(dir.path().join("merged")).unwrap();
        assert_eq!(merged, "0\n1\n2\n");
    }

    #[tokio::test]
    async fn test_failed_piece_skips_finish() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockProcessRunner::new();
        mock.expect_command("sh")
            .with_args(|args| args[1] == "piece 1")
            .returns_exit_code(2)
            .finish();
        mock.expect_command("sh").returns_success().finish();

        let plan = LaunchPlan {
            job_dir: dir.path().to_path_buf(),
            num_pieces: 2,
            stages: vec![stage(0, &["piece 0", "piece 1"], "finish")],
        };
        let scheduler = LocalScheduler::new(Arc::new(mock.clone()), HOUR, None);
        let err = scheduler.submit(&plan).await.unwrap_err();

        match err {
            Error::CommandFailed { command, status } => {
                assert_eq!(command, "piece 1");
                assert_eq!(status, "exit code 2");
            }
            other => panic!("unexpected error: {other}"),
        }
        let history = mock.history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|cmd| cmd.args[1] != "finish"));
    }

    #[tokio::test]
    async fn test_piece_over_time_budget_fails_stage() {
        let dir = TempDir::new().unwrap();
        let plan = LaunchPlan {
            job_dir: dir.path().to_path_buf(),
            num_pieces: 2,
            stages: vec![stage(0, &["true", "sleep 5"], "touch finished")],
        };

        let scheduler =
            LocalScheduler::new(Arc::new(TokioProcessRunner), Duration::from_millis(200), None);
        let err = scheduler.submit(&plan).await.unwrap_err();

        match err {
            Error::CommandFailed { command, status } => {
                assert_eq!(command, "sleep 5");
                assert_eq!(status, "timed out");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("finished").exists());
    }

    fn echoing_mock() -> MockProcessRunner {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("sh")
            .returns_stdout("piece 0 counted 12 words\n")
            .returns_stderr("warning: short input\n")
            .finish();
        mock
    }

    fn single_piece(dir: &TempDir) -> LaunchPlan {
        LaunchPlan {
            job_dir: dir.path().to_path_buf(),
            num_pieces: 1,
            stages: vec![stage(0, &["piece 0"], "finish")],
        }
    }

    #[tokio::test]
    async fn test_lines_carry_time_budget() {
        let dir = TempDir::new().unwrap();
        let mock = echoing_mock();
        let budget = Duration::from_secs(90);

        LocalScheduler::new(Arc::new(mock.clone()), budget, None)
            .submit(&single_piece(&dir))
            .await
            .unwrap();

        let history = mock.history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|cmd| cmd.timeout == Some(budget)));
        assert!(history
            .iter()
            .all(|cmd| cmd.working_dir.as_deref() == Some(dir.path())));
    }

    #[tokio::test]
    async fn test_successful_line_output_logged_at_debug() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("local.log");
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(std::fs::File::create(&log_path).unwrap()))
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);

        LocalScheduler::new(Arc::new(echoing_mock()), HOUR, None)
            .submit(&single_piece(&dir))
            .await
            .unwrap();
        drop(guard);

        let logged = std::fs::read_to_string(&log_path).unwrap();
        assert!(logged.contains("DEBUG"));
        assert!(logged.contains("piece 0 counted 12 words"));
        assert!(logged.contains("warning: short input"));
        assert!(!logged.contains("WARN"));
    }
}

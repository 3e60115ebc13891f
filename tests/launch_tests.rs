//! Launch through each scheduler backend with mocked or trivial commands

mod common;

use common::JobDirBuilder;
use piecework::app::AppConfig;
use piecework::config::JobConfig;
use piecework::controller::{JobContext, LaunchManifest};
use piecework::scheduler::SchedulerKind;
use piecework::subprocess::{ProcessRunner, SubprocessManager, TokioProcessRunner};
use piecework::Error;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

fn context(job_dir: &std::path::Path, config: JobConfig) -> JobContext {
    let kind = Arc::new(piecework::demo::word_count().unwrap());
    JobContext::new(kind, job_dir, config, BTreeMap::new(), AppConfig::default()).unwrap()
}

fn cluster_config(scheduler: SchedulerKind) -> JobConfig {
    JobConfig {
        scheduler,
        program: Some(PathBuf::from("/opt/piecework/bin/piecework")),
        time_budget: "02:00:00".to_string(),
        ..JobConfig::default()
    }
}

#[tokio::test]
async fn test_slurm_launch_chains_stages() {
    let job = JobDirBuilder::new("wc").unwrap().build().unwrap();
    let ctx = context(&job.job_dir, cluster_config(SchedulerKind::Slurm));

    let (subprocess, mut mock) = SubprocessManager::mock();
    mock.expect_command("sbatch")
        .with_args(|args| args[0] == "wc_4_0.sbatch")
        .returns_stdout("Submitted batch job 9001\n")
        .finish();
    mock.expect_command("sbatch")
        .with_args(|args| args[0] == "wc_4_1.sbatch")
        .returns_stdout("Submitted batch job 9002\n")
        .finish();

    let manifest = ctx.launch(4, subprocess.runner(), false).await.unwrap().unwrap();

    assert_eq!(manifest.experiment, "wc");
    assert_eq!(manifest.stages.len(), 2);
    assert_eq!(manifest.stages[1].hold_on.as_deref(), Some("9001"));
    assert_eq!(mock.calls_to("sbatch"), 2);

    let script = std::fs::read_to_string(ctx.job_dir().join("wc_4_1.sbatch")).unwrap();
    assert!(script.contains("#SBATCH -t 02:00:00"));
    assert!(script.contains("#SBATCH -d afterok:9001"));
    assert_eq!(script.matches(" process --num_pieces 4 ").count(), 4);
    assert!(script.contains("finish --num_pieces 4 --stage 1"));

    let written: LaunchManifest = serde_json::from_str(
        &std::fs::read_to_string(ctx.job_dir().join("launch_4.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(written.stages, manifest.stages);
}

#[tokio::test]
async fn test_unmatched_submission_output_is_error() {
    let job = JobDirBuilder::new("wc").unwrap().build().unwrap();
    let ctx = context(&job.job_dir, cluster_config(SchedulerKind::Sge));

    let (subprocess, mut mock) = SubprocessManager::mock();
    mock.expect_command("qsub")
        .returns_stdout("qsub: job rejected\n")
        .finish();

    let err = ctx.launch(2, subprocess.runner(), false).await.unwrap_err();
    assert!(matches!(err, Error::Submission(_)), "unexpected error: {err}");
    assert_eq!(mock.calls_to("qsub"), 1);
    assert!(!ctx.job_dir().join("launch_2.json").exists());
    // Command files are written before anything is submitted
    assert!(ctx.job_dir().join("process_2_stage_1").exists());
}

#[tokio::test]
async fn test_local_launch_runs_every_command() {
    let job = JobDirBuilder::new("wc").unwrap().build().unwrap();
    let config = JobConfig {
        program: Some(PathBuf::from("true")),
        max_parallel: Some(2),
        ..JobConfig::default()
    };
    let ctx = context(&job.job_dir, config);

    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);
    let manifest = ctx.launch(3, runner, false).await.unwrap().unwrap();

    assert_eq!(manifest.scheduler, SchedulerKind::Local);
    assert!(manifest.stages.iter().all(|s| s.job_id.is_none()));
    assert!(ctx.job_dir().join("launch_3.json").exists());
}

#[tokio::test]
async fn test_local_launch_stops_on_failed_piece() {
    let job = JobDirBuilder::new("wc").unwrap().build().unwrap();
    let config = JobConfig {
        program: Some(PathBuf::from("false")),
        ..JobConfig::default()
    };
    let ctx = context(&job.job_dir, config);

    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);
    let err = ctx.launch(2, runner, false).await.unwrap_err();
    assert!(matches!(err, Error::CommandFailed { .. }), "unexpected error: {err}");
}

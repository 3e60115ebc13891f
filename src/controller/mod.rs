//! Job controller: the `launch`, `process` and `finish` verbs
//!
//! `launch` writes, for every stage, a process file (one command line per
//! piece) and a finish file (one command line), then hands the commands to a
//! [`Scheduler`]. Each of those lines re-enters the controller as `process`
//! or `finish` in a fresh OS process; the only state shared between them is
//! the file system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::app::logging::scope_experiment_logging;
use crate::app::AppConfig;
use crate::config::JobConfig;
use crate::error::{Error, Result};
use crate::experiment::{timing_key, timing_records, Description, Experiment, ExperimentType, Piece, Timing};
use crate::scheduler::{
    create_scheduler, LaunchPlan, SchedulerKind, StagePlan, StageSubmission,
};
use crate::serialize::merge_files;
use crate::subprocess::ProcessRunner;

/// Record of one launch, written as `launch_<N>.json` in the job directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchManifest {
    pub experiment: String,
    pub scheduler: SchedulerKind,
    pub launched_at: DateTime<Utc>,
    pub num_pieces: usize,
    pub overrides: BTreeMap<String, String>,
    pub stages: Vec<StageSubmission>,
}

pub fn process_file_name(num_pieces: usize, stage: usize) -> String {
    format!("process_{num_pieces}_stage_{stage}")
}

pub fn finish_file_name(num_pieces: usize, stage: usize) -> String {
    format!("finish_{num_pieces}_stage_{stage}")
}

pub fn job_name(name: &str, num_pieces: usize, stage: usize) -> String {
    format!("{name}_{num_pieces}_{stage}")
}

pub fn manifest_file_name(num_pieces: usize) -> String {
    format!("launch_{num_pieces}.json")
}

/// Everything a verb needs to know about the job it works on
#[derive(Clone)]
pub struct JobContext {
    kind: Arc<ExperimentType>,
    job_dir: PathBuf,
    config: JobConfig,
    overrides: BTreeMap<String, String>,
    app: AppConfig,
}

impl JobContext {
    pub fn new(
        kind: Arc<ExperimentType>,
        job_dir: &Path,
        config: JobConfig,
        overrides: BTreeMap<String, String>,
        app: AppConfig,
    ) -> Result<Self> {
        // Command lines must work from whatever directory the scheduler starts them in
        let job_dir = job_dir
            .canonicalize()
            .map_err(|e| Error::file_io(job_dir, e))?;

        Ok(Self {
            kind,
            job_dir,
            config,
            overrides,
            app,
        })
    }

    pub fn kind(&self) -> &Arc<ExperimentType> {
        &self.kind
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn overrides(&self) -> &BTreeMap<String, String> {
        &self.overrides
    }

    /// The job's description file with command-line overrides applied
    pub fn description(&self) -> Result<Description> {
        let path = self.config.description_path(&self.job_dir);
        Ok(Description::from_file(&path)?.with_overrides(&self.overrides))
    }

    /// Executable named in command files
    pub fn program(&self) -> Result<PathBuf> {
        match &self.config.program {
            Some(program) => Ok(program.clone()),
            None => Ok(std::env::current_exe()?),
        }
    }

    fn check_pieces(&self, num_pieces: usize) -> Result<()> {
        if num_pieces == 0 {
            return Err(Error::config("num_pieces must be at least 1"));
        }
        Ok(())
    }

    /// Leading words shared by every command line: program, job dir and overrides
    fn command_prefix(&self) -> Result<Vec<String>> {
        let mut words = vec![
            self.program()?.display().to_string(),
            "--job_dir".to_string(),
            self.job_dir.display().to_string(),
        ];
        for (key, value) in &self.overrides {
            words.push("--set".to_string());
            words.push(format!("{key}={value}"));
        }
        Ok(words)
    }

    pub fn process_command(&self, num_pieces: usize, which_piece: usize, stage: usize) -> Result<String> {
        let mut words = self.command_prefix()?;
        words.extend([
            "process".to_string(),
            "--num_pieces".to_string(),
            num_pieces.to_string(),
            "--which_piece".to_string(),
            which_piece.to_string(),
            "--stage".to_string(),
            stage.to_string(),
        ]);
        Ok(shell_words::join(words))
    }

    pub fn finish_command(&self, num_pieces: usize, stage: usize) -> Result<String> {
        let mut words = self.command_prefix()?;
        words.extend([
            "finish".to_string(),
            "--num_pieces".to_string(),
            num_pieces.to_string(),
            "--stage".to_string(),
            stage.to_string(),
        ]);
        Ok(shell_words::join(words))
    }

    /// Command lines and job names for every stage
    pub fn plan(&self, num_pieces: usize) -> Result<LaunchPlan> {
        self.check_pieces(num_pieces)?;
        let description = self.description()?;
        let name = description.require("name")?;

        let stages = (0..self.kind.num_stages())
            .map(|stage| -> Result<StagePlan> {
                Ok(StagePlan {
                    stage,
                    job_name: job_name(name, num_pieces, stage),
                    process_file: self.job_dir.join(process_file_name(num_pieces, stage)),
                    finish_file: self.job_dir.join(finish_file_name(num_pieces, stage)),
                    process_commands: (0..num_pieces)
                        .map(|which| self.process_command(num_pieces, which, stage))
                        .collect::<Result<Vec<_>>>()?,
                    finish_command: self.finish_command(num_pieces, stage)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(LaunchPlan {
            job_dir: self.job_dir.clone(),
            num_pieces,
            stages,
        })
    }

    pub fn write_command_files(&self, plan: &LaunchPlan) -> Result<()> {
        for stage in &plan.stages {
            let mut process = stage.process_commands.join("\n");
            process.push('\n');
            std::fs::write(&stage.process_file, process)
                .map_err(|e| Error::file_io(&stage.process_file, e))?;

            std::fs::write(&stage.finish_file, format!("{}\n", stage.finish_command))
                .map_err(|e| Error::file_io(&stage.finish_file, e))?;

            debug!(
                "Wrote {} and {}",
                stage.process_file.display(),
                stage.finish_file.display()
            );
        }
        Ok(())
    }

    /// Write command files for every stage and submit them
    ///
    /// Returns `None` for a dry run, which stops after writing command files.
    pub async fn launch(
        &self,
        num_pieces: usize,
        runner: Arc<dyn ProcessRunner>,
        dry_run: bool,
    ) -> Result<Option<LaunchManifest>> {
        let plan = self.plan(num_pieces)?;
        let description = self.description()?;
        for (key, value) in &self.overrides {
            info!("Overriding description key {} = {}", key, value);
        }

        self.write_command_files(&plan)?;
        if dry_run {
            info!(
                "Dry run: wrote command files for {} stages in {}",
                plan.stages.len(),
                self.job_dir.display()
            );
            return Ok(None);
        }

        let scheduler = create_scheduler(
            self.config.scheduler,
            runner,
            self.config.time_budget()?,
            self.config.max_parallel,
        );
        info!(
            "Launching {} stages of {} pieces with the {} scheduler",
            plan.stages.len(),
            num_pieces,
            scheduler.kind()
        );
        let stages = scheduler.submit(&plan).await?;

        let manifest = LaunchManifest {
            experiment: description.require("name")?.to_string(),
            scheduler: scheduler.kind(),
            launched_at: Utc::now(),
            num_pieces,
            overrides: self.overrides.clone(),
            stages,
        };
        let path = self.job_dir.join(manifest_file_name(num_pieces));
        let content = serde_json::to_string_pretty(&manifest)?;
        std::fs::write(&path, content).map_err(|e| Error::file_io(&path, e))?;

        Ok(Some(manifest))
    }

    /// Run one piece's work for `stage`
    pub fn process(&self, num_pieces: usize, which_piece: usize, stage: usize) -> Result<Vec<Timing>> {
        self.kind.check_stage(stage)?;
        let description = self.description()?;
        let mut experiment = Experiment::new(
            Arc::clone(&self.kind),
            &description,
            num_pieces,
            Piece::Index(which_piece),
        )?;

        let _logging = scope_experiment_logging(&self.app, &experiment.log_target()?)?;
        experiment.do_work(stage)
    }

    /// Merge every piece's outputs for `stage`, then run the stage's cleanup
    pub fn finish(&self, num_pieces: usize, stage: usize) -> Result<Vec<Timing>> {
        self.kind.check_stage(stage)?;
        let description = self.description()?;
        let mut merged = Experiment::new(
            Arc::clone(&self.kind),
            &description,
            num_pieces,
            Piece::Merged,
        )?;
        let pieces = (0..num_pieces)
            .map(|which| {
                Experiment::new(
                    Arc::clone(&self.kind),
                    &description,
                    num_pieces,
                    Piece::Index(which),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let _logging = scope_experiment_logging(&self.app, &merged.log_target()?)?;

        let mut merge_times = Vec::new();
        for key in merged.outputs(stage) {
            let piece_paths = pieces
                .iter()
                .map(|piece| piece.file_name(key).map(Path::to_path_buf))
                .collect::<Result<Vec<_>>>()?;
            let file_type = merged.file_type(key)?;
            info!("Merging file {} (fast_merge={})", key, file_type.fast_merge);

            let start = Instant::now();
            merge_files(&piece_paths, merged.merged_file_name(key)?, file_type)?;
            merge_times.push(Timing::new(&format!("Merging {key}"), start.elapsed()));
        }

        let key = timing_key(stage);
        merged
            .file_type(&key)?
            .format
            .append(&timing_records(&merge_times), merged.merged_file_name(&key)?)?;

        let mut times = merge_times;
        times.extend(merged.do_cleanup(stage)?);
        Ok(times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::Capability;
    use crate::serialize::FileFormat;
    use crate::subprocess::MockProcessRunner;
    use serde_json::json;
    use tempfile::TempDir;

    fn kind() -> Arc<ExperimentType> {
        let counter = Capability::new("counter")
            .results_file("counts", FileFormat::json())
            .outputs(0, &["counts"])
            .work(0, &["count"]);
        Arc::new(
            ExperimentType::builder("counter", 1)
                .capability(counter)
                .function("count", |e: &mut Experiment| {
                    let which = e.piece().index().unwrap_or_default();
                    e.write_file("counts", &json!({ "pieces": 1, "last": which }))?;
                    e.summary.push(json!(format!("piece {which}")));
                    Ok(())
                })
                .build()
                .unwrap(),
        )
    }

    fn job(dir: &TempDir, config: JobConfig) -> JobContext {
        let root = dir.path();
        std::fs::write(
            root.join("description.txt"),
            format!(
                "name counter\nwork_prefix {}\nscratch_prefix {}\nrelative_results_dir results\n",
                root.join("work").display(),
                root.join("scratch").display()
            ),
        )
        .unwrap();
        JobContext::new(kind(), root, config, BTreeMap::new(), AppConfig::default()).unwrap()
    }

    fn config_with_program() -> JobConfig {
        JobConfig {
            program: Some(PathBuf::from("/opt/bin/counter")),
            ..JobConfig::default()
        }
    }

    #[test]
    fn test_command_files_written_for_every_stage() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, config_with_program());
        let plan = job.plan(3).unwrap();
        job.write_command_files(&plan).unwrap();

        let process = std::fs::read_to_string(job.job_dir().join("process_3_stage_0")).unwrap();
        let lines: Vec<&str> = process.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[2],
            format!(
                "/opt/bin/counter --job_dir {} process --num_pieces 3 --which_piece 2 --stage 0",
                job.job_dir().display()
            )
        );

        let finish = std::fs::read_to_string(job.job_dir().join("finish_3_stage_0")).unwrap();
        assert_eq!(finish.lines().count(), 1);
        assert!(finish.ends_with("finish --num_pieces 3 --stage 0\n"));
        assert_eq!(plan.stages[0].job_name, "counter_3_0");
    }

    #[test]
    fn test_overrides_travel_with_command_lines() {
        let dir = TempDir::new().unwrap();
        let mut job = job(&dir, config_with_program());
        job.overrides
            .insert("relative_results_dir".to_string(), "other run".to_string());

        let line = job.process_command(2, 0, 0).unwrap();
        assert!(line.contains("--set 'relative_results_dir=other run' process"));
        assert_eq!(
            job.description().unwrap().get("relative_results_dir"),
            Some("other run")
        );
    }

    #[test]
    fn test_zero_pieces_rejected() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, config_with_program());
        assert!(job.plan(0).unwrap_err().is_configuration());
    }

    #[test]
    fn test_process_then_finish_merges_outputs() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, config_with_program());
        for which in 0..3 {
            job.process(3, which, 0).unwrap();
        }
        let times = job.finish(3, 0).unwrap();
        assert_eq!(times[0].name, "Merging counts");

        let merged_dir = dir.path().join("work/results");
        let counts: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(merged_dir.join("counter_counts.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(counts["pieces"], json!(3));
        assert_eq!(counts["last"], json!(3));

        let summary = std::fs::read_to_string(merged_dir.join("counter_summary.txt")).unwrap();
        assert_eq!(summary, "piece 0\npiece 1\npiece 2\n");

        let timing = std::fs::read_to_string(merged_dir.join("counter_timing_0.txt")).unwrap();
        assert!(timing.contains("Merging counts\t"));
        assert!(timing.contains("consolidate_summaries\t"));
    }

    #[test]
    fn test_stage_out_of_range() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, config_with_program());
        assert!(job.process(1, 0, 1).unwrap_err().is_configuration());
        assert!(job.finish(1, 5).unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_dry_run_submits_nothing() {
        let dir = TempDir::new().unwrap();
        let job = job(&dir, config_with_program());
        let mock = MockProcessRunner::new();

        let manifest = job.launch(2, Arc::new(mock.clone()), true).await.unwrap();
        assert!(manifest.is_none());
        assert!(mock.history().is_empty());
        assert!(job.job_dir().join("process_2_stage_0").exists());
        assert!(!job.job_dir().join(manifest_file_name(2)).exists());
    }

    #[tokio::test]
    async fn test_sge_launch_writes_manifest() {
        let dir = TempDir::new().unwrap();
        let job = job(
            &dir,
            JobConfig {
                scheduler: SchedulerKind::Sge,
                ..config_with_program()
            },
        );
        let mut mock = MockProcessRunner::new();
        mock.expect_command("qsub")
            .returns_stdout("Your job 31 (\"counter_2_0\") has been submitted\n")
            .finish();

        let manifest = job
            .launch(2, Arc::new(mock), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manifest.scheduler, SchedulerKind::Sge);
        assert_eq!(manifest.stages[0].job_id.as_deref(), Some("31"));

        let written: LaunchManifest = serde_json::from_str(
            &std::fs::read_to_string(job.job_dir().join("launch_2.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(written, manifest);
        assert!(job.job_dir().join("counter_2_0.qsub").exists());
    }
}

//! Experiments: one piece of a split computation, or the merged view over all pieces
//!
//! An [`Experiment`] is built once per controller invocation. Piece instances
//! read and write under the scratch results directory (suffixed per piece);
//! the merged instance reads and writes under the shared work results
//! directory. Each kind creates only its own directory.

pub mod description;
pub mod pipeline;
pub mod registry;
pub mod suffix;

pub use description::Description;
pub use pipeline::{
    summary_stage_key, timing_key, Capability, ExperimentType, ExperimentTypeBuilder, StageFn,
    StageStep, CONSOLIDATE_SUMMARIES,
};
pub use registry::{FileRegistry, ResolvedFiles};
pub use suffix::{generate_suffix, piece_range, Piece};

use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::app::logging::LogTarget;
use crate::error::{Error, Result};
use crate::serialize::FileType;
use registry::ResolveContext;

/// Wall-clock duration of one named step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timing {
    pub name: String,
    pub duration: Duration,
}

impl Timing {
    pub fn new(name: &str, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            duration,
        }
    }

    /// `<name>\t<seconds>` line as stored in timing artifacts
    pub fn record(&self) -> String {
        format!("{}\t{:.6}", self.name, self.duration.as_secs_f64())
    }
}

pub fn timing_records(timings: &[Timing]) -> Value {
    Value::Array(timings.iter().map(|t| Value::String(t.record())).collect())
}

pub struct Experiment {
    kind: Arc<ExperimentType>,
    name: String,
    group: String,
    num_pieces: usize,
    piece: Piece,
    work_prefix: PathBuf,
    scratch_prefix: PathBuf,
    relative_results_dir: String,
    scratch_results_dir: PathBuf,
    work_results_dir: PathBuf,
    files: ResolvedFiles,
    description: Description,
    /// Records accumulated by work steps; written as the stage summary
    pub summary: Vec<Value>,
}

impl std::fmt::Debug for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Experiment")
            .field("kind", &self.kind.name())
            .field("name", &self.name)
            .field("num_pieces", &self.num_pieces)
            .field("piece", &self.piece)
            .field("scratch_results_dir", &self.scratch_results_dir)
            .field("work_results_dir", &self.work_results_dir)
            .finish()
    }
}

impl Experiment {
    pub fn new(
        kind: Arc<ExperimentType>,
        description: &Description,
        num_pieces: usize,
        piece: Piece,
    ) -> Result<Self> {
        suffix::validate_piece(num_pieces, piece)?;

        let name = description.require("name")?.to_string();
        let group = description.get("group").unwrap_or_default().to_string();
        let work_prefix = PathBuf::from(description.require("work_prefix")?);
        let scratch_prefix = PathBuf::from(description.require("scratch_prefix")?);
        let relative_results_dir = description
            .require("relative_results_dir")?
            .trim_matches('/')
            .to_string();

        let suffix = generate_suffix(num_pieces, piece);
        let scratch_results_dir = scratch_prefix.join(format!("{relative_results_dir}{suffix}"));
        let work_results_dir = work_prefix.join(&relative_results_dir);

        // Only one kind of instance creates each directory, so concurrently
        // starting pieces never race on the shared one.
        let own_dir = if piece.is_merged() {
            &work_results_dir
        } else {
            &scratch_results_dir
        };
        fs::create_dir_all(own_dir).map_err(|e| Error::file_io(own_dir, e))?;
        debug!("Using results directory {}", own_dir.display());

        let files = kind.registry().resolve(&ResolveContext {
            name: &name,
            scratch_results_dir: &scratch_results_dir,
            work_results_dir: &work_results_dir,
            merged: piece.is_merged(),
        })?;

        Ok(Self {
            kind,
            name,
            group,
            num_pieces,
            piece,
            work_prefix,
            scratch_prefix,
            relative_results_dir,
            scratch_results_dir,
            work_results_dir,
            files,
            description: description.clone(),
            summary: Vec::new(),
        })
    }

    pub fn from_description_file(
        kind: Arc<ExperimentType>,
        path: &Path,
        num_pieces: usize,
        piece: Piece,
    ) -> Result<Self> {
        let description = Description::from_file(path)?;
        Self::new(kind, &description, num_pieces, piece)
    }

    pub fn kind(&self) -> &ExperimentType {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn num_pieces(&self) -> usize {
        self.num_pieces
    }

    pub fn piece(&self) -> Piece {
        self.piece
    }

    pub fn num_stages(&self) -> usize {
        self.kind.num_stages()
    }

    pub fn work_prefix(&self) -> &Path {
        &self.work_prefix
    }

    pub fn scratch_prefix(&self) -> &Path {
        &self.scratch_prefix
    }

    pub fn relative_results_dir(&self) -> &str {
        &self.relative_results_dir
    }

    pub fn scratch_results_dir(&self) -> &Path {
        &self.scratch_results_dir
    }

    pub fn work_results_dir(&self) -> &Path {
        &self.work_results_dir
    }

    pub fn files(&self) -> &ResolvedFiles {
        &self.files
    }

    /// Any description value, including keys the orchestration layer ignores
    pub fn param(&self, key: &str) -> Option<&str> {
        self.description.get(key)
    }

    pub fn require_param(&self, key: &str) -> Result<&str> {
        self.description.require(key)
    }

    pub fn outputs(&self, stage: usize) -> &[String] {
        self.kind.outputs(stage)
    }

    pub fn file_name(&self, key: &str) -> Result<&Path> {
        self.files.file_name(key)
    }

    pub fn merged_file_name(&self, key: &str) -> Result<&Path> {
        self.files.merged_file_name(key)
    }

    pub fn figure_file_name(&self, key: &str) -> Result<&Path> {
        self.files.figure_file_name(key)
    }

    pub fn file_type(&self, key: &str) -> Result<&FileType> {
        self.files.file_type(key)
    }

    pub fn write_file(&self, key: &str, data: &Value) -> Result<()> {
        let file_type = self.file_type(key)?;
        let path = self.file_name(key)?;
        file_type.format.write(data, path)
    }

    pub fn read_file(&self, key: &str, merged: bool) -> Result<Value> {
        let path = if merged {
            self.merged_file_name(key)?
        } else {
            self.file_name(key)?
        };
        self.file_type(key)?.format.read(path)
    }

    /// Log file and line prefix for this instance
    pub fn log_target(&self) -> Result<LogTarget> {
        Ok(LogTarget {
            path: self.file_name("log")?.to_path_buf(),
            label: suffix::piece_label(self.num_pieces, self.piece),
        })
    }

    /// Run the stage's work steps, then write its timing and summary artifacts
    pub fn do_work(&mut self, stage: usize) -> Result<Vec<Timing>> {
        self.kind.check_stage(stage)?;
        info!("Beginning work for stage {}", stage);

        let kind = Arc::clone(&self.kind);
        let times = self.run_steps(stage, kind.work(stage))?;

        self.write_file(&timing_key(stage), &timing_records(&times))?;
        self.write_file(
            &summary_stage_key(stage),
            &Value::Array(self.summary.clone()),
        )?;

        info!("Done with work for stage {}", stage);
        Ok(times)
    }

    /// Run the stage's cleanup steps, appending their timings to the merged timing artifact
    pub fn do_cleanup(&mut self, stage: usize) -> Result<Vec<Timing>> {
        self.kind.check_stage(stage)?;
        info!("Beginning cleanup for stage {}", stage);

        let kind = Arc::clone(&self.kind);
        let times = self.run_steps(stage, kind.cleanup(stage))?;

        let key = timing_key(stage);
        let path = self.merged_file_name(&key)?;
        self.file_type(&key)?
            .format
            .append(&timing_records(&times), path)?;

        info!("Done with cleanup for stage {}", stage);
        Ok(times)
    }

    fn run_steps(&mut self, stage: usize, steps: &[StageStep]) -> Result<Vec<Timing>> {
        let mut times = Vec::with_capacity(steps.len());
        for step in steps {
            info!("Starting function {}", step.name());
            let start = Instant::now();
            step.call(self).map_err(|source| Error::Step {
                stage,
                step: step.name().to_string(),
                source,
            })?;
            times.push(Timing::new(step.name(), start.elapsed()));
        }
        Ok(times)
    }

    /// Concatenate every stage's summary, in stage order, into the `summary` file
    ///
    /// Stage files are read in their own format and the result is written in
    /// the format declared for `summary`.
    pub fn consolidate_summaries(&self) -> Result<()> {
        let stage_paths = (0..self.num_stages())
            .map(|stage| self.file_name(&summary_stage_key(stage)).map(Path::to_path_buf))
            .collect::<Result<Vec<_>>>()?;
        let summary = self
            .file_type(&summary_stage_key(0))?
            .format
            .consolidate_stages(&stage_paths)?;
        self.write_file("summary", &summary)
    }
}

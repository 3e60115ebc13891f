//! Stage pipeline composition
//!
//! An [`ExperimentType`] is assembled from an ordered list of [`Capability`]
//! descriptors. The built-in map-reduce capability always comes first; each
//! later capability appends its results files and per-stage outputs, work
//! steps and cleanup steps after those of the capabilities before it.
//! Step names are resolved against the registered functions when the type
//! is built.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::Experiment;
use crate::error::{Error, Result};
use crate::serialize::{FileFormat, FileType};

use super::registry::FileRegistry;

pub const CONSOLIDATE_SUMMARIES: &str = "consolidate_summaries";

/// A unit of stage work, run against a piece or the merged experiment
pub type StageFn = Arc<dyn Fn(&mut Experiment) -> anyhow::Result<()> + Send + Sync>;

pub fn summary_stage_key(stage: usize) -> String {
    format!("summary_stage_{stage}")
}

pub fn timing_key(stage: usize) -> String {
    format!("timing_{stage}")
}

#[derive(Clone)]
pub struct StageStep {
    name: String,
    func: StageFn,
}

impl StageStep {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, experiment: &mut Experiment) -> anyhow::Result<()> {
        (self.func)(experiment)
    }
}

impl fmt::Debug for StageStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StageStep({})", self.name)
    }
}

/// Declarations contributed by one level of an experiment type
#[derive(Debug, Clone, Default)]
pub struct Capability {
    name: String,
    registry: FileRegistry,
    outputs: Vec<Vec<String>>,
    work: Vec<Vec<String>>,
    cleanup: Vec<Vec<String>>,
}

impl Capability {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn results_file(mut self, key: &str, file_type: impl Into<FileType>) -> Self {
        self.registry.register(key, file_type, None);
        self
    }

    pub fn results_file_with_template(
        mut self,
        key: &str,
        file_type: impl Into<FileType>,
        template: &str,
    ) -> Self {
        self.registry.register(key, file_type, Some(template));
        self
    }

    pub fn figure_file(mut self, key: &str, template: &str) -> Self {
        self.registry.register_figure(key, template);
        self
    }

    pub fn outputs(mut self, stage: usize, keys: &[&str]) -> Self {
        stage_slot(&mut self.outputs, stage).extend(keys.iter().map(|k| k.to_string()));
        self
    }

    pub fn work(mut self, stage: usize, functions: &[&str]) -> Self {
        stage_slot(&mut self.work, stage).extend(functions.iter().map(|f| f.to_string()));
        self
    }

    pub fn cleanup(mut self, stage: usize, functions: &[&str]) -> Self {
        stage_slot(&mut self.cleanup, stage).extend(functions.iter().map(|f| f.to_string()));
        self
    }

    fn stage_count(&self) -> usize {
        self.outputs
            .len()
            .max(self.work.len())
            .max(self.cleanup.len())
    }
}

fn stage_slot(stages: &mut Vec<Vec<String>>, stage: usize) -> &mut Vec<String> {
    if stages.len() <= stage {
        stages.resize_with(stage + 1, Vec::new);
    }
    &mut stages[stage]
}

fn extend_stages(whole: &mut [Vec<String>], specific: &[Vec<String>]) {
    for (whole_stage, specific_stage) in whole.iter_mut().zip(specific) {
        whole_stage.extend(specific_stage.iter().cloned());
    }
}

/// Summary and log declarations every experiment type starts from
fn map_reduce_base() -> Capability {
    Capability::new("map_reduce")
        .results_file("summary", FileFormat::log())
        .results_file_with_template("log", FileFormat::text(""), "log.txt")
}

/// A fully composed experiment type
#[derive(Debug, Clone)]
pub struct ExperimentType {
    name: String,
    num_stages: usize,
    capabilities: Vec<String>,
    registry: FileRegistry,
    outputs: Vec<Vec<String>>,
    work: Vec<Vec<StageStep>>,
    cleanup: Vec<Vec<StageStep>>,
}

impl ExperimentType {
    pub fn builder(name: &str, num_stages: usize) -> ExperimentTypeBuilder {
        ExperimentTypeBuilder::new(name, num_stages)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_stages(&self) -> usize {
        self.num_stages
    }

    /// Capability names in composition order
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn registry(&self) -> &FileRegistry {
        &self.registry
    }

    pub fn check_stage(&self, stage: usize) -> Result<()> {
        if stage >= self.num_stages {
            return Err(Error::config(format!(
                "stage {stage} is out of range for '{}' with {} stages",
                self.name, self.num_stages
            )));
        }
        Ok(())
    }

    pub fn outputs(&self, stage: usize) -> &[String] {
        self.outputs.get(stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn work(&self, stage: usize) -> &[StageStep] {
        self.work.get(stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cleanup(&self, stage: usize) -> &[StageStep] {
        self.cleanup.get(stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stage_counts(&self) -> (usize, usize, usize) {
        (self.outputs.len(), self.work.len(), self.cleanup.len())
    }
}

pub struct ExperimentTypeBuilder {
    name: String,
    num_stages: usize,
    capabilities: Vec<Capability>,
    functions: HashMap<String, StageFn>,
}

impl ExperimentTypeBuilder {
    pub fn new(name: &str, num_stages: usize) -> Self {
        let mut functions: HashMap<String, StageFn> = HashMap::new();
        functions.insert(
            CONSOLIDATE_SUMMARIES.to_string(),
            Arc::new(|experiment: &mut Experiment| {
                experiment.consolidate_summaries()?;
                Ok(())
            }),
        );

        Self {
            name: name.to_string(),
            num_stages,
            capabilities: Vec::new(),
            functions,
        }
    }

    /// Add the next, more specific level of the type
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Register a function that stages can name as a work or cleanup step
    pub fn function<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&mut Experiment) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(func));
        self
    }

    pub fn build(self) -> Result<ExperimentType> {
        if self.num_stages == 0 {
            return Err(Error::config(format!(
                "experiment type '{}' must have at least one stage",
                self.name
            )));
        }

        let num_stages = self.num_stages;
        let mut registry = FileRegistry::new();
        let mut outputs = vec![Vec::new(); num_stages];
        let mut work_names = vec![Vec::new(); num_stages];
        let mut cleanup_names = vec![Vec::new(); num_stages];
        let mut capability_names = Vec::new();

        for capability in std::iter::once(map_reduce_base()).chain(self.capabilities) {
            if capability.stage_count() > num_stages {
                return Err(Error::config(format!(
                    "capability '{}' declares {} stages but '{}' has {}",
                    capability.name,
                    capability.stage_count(),
                    self.name,
                    num_stages
                )));
            }
            registry.extend(&capability.registry);
            extend_stages(&mut outputs, &capability.outputs);
            extend_stages(&mut work_names, &capability.work);
            extend_stages(&mut cleanup_names, &capability.cleanup);
            capability_names.push(capability.name);
        }

        for (stage, stage_outputs) in outputs.iter_mut().enumerate() {
            for key in [summary_stage_key(stage), timing_key(stage)] {
                let template = format!("{{name}}_{key}.txt");
                registry.register(&key, FileFormat::log(), Some(&template));
                stage_outputs.push(key);
            }
        }

        for (stage, stage_outputs) in outputs.iter().enumerate() {
            for key in stage_outputs {
                if !registry.results_files().iter().any(|d| &d.key == key) {
                    return Err(Error::config(format!(
                        "stage {stage} output '{key}' of '{}' has no results file declaration",
                        self.name
                    )));
                }
            }
        }

        if let Some(last) = cleanup_names.last_mut() {
            if !last.iter().any(|name| name == CONSOLIDATE_SUMMARIES) {
                last.push(CONSOLIDATE_SUMMARIES.to_string());
            }
        }

        let work = resolve_steps(&self.functions, work_names)?;
        let cleanup = resolve_steps(&self.functions, cleanup_names)?;

        Ok(ExperimentType {
            name: self.name,
            num_stages,
            capabilities: capability_names,
            registry,
            outputs,
            work,
            cleanup,
        })
    }
}

fn resolve_steps(
    functions: &HashMap<String, StageFn>,
    stages: Vec<Vec<String>>,
) -> Result<Vec<Vec<StageStep>>> {
    stages
        .into_iter()
        .enumerate()
        .map(|(stage, names)| {
            names
                .into_iter()
                .map(|name| match functions.get(&name) {
                    Some(func) => Ok(StageStep {
                        name,
                        func: Arc::clone(func),
                    }),
                    None => Err(Error::UnknownFunction { name, stage }),
                })
                .collect()
        })
        .collect()
}

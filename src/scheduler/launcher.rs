//! Batch submission scripts
//!
//! One script per stage: the header carries the scheduler directives, the
//! body starts every piece command in the background, waits for each of
//! them and runs the stage's finish file only when all pieces succeeded.

use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tera::{Context, Tera};

use crate::config::format_time_budget;
use crate::error::Result;
use crate::scheduler::cluster::ClusterFlavor;
use crate::scheduler::StagePlan;

const SLURM_HEADER: &str = r#"#!/bin/bash
#SBATCH -J {{ job_name }}
#SBATCH -o {{ output }}
#SBATCH -t {{ time_budget }}
{% if hold_jid %}#SBATCH -d afterok:{{ hold_jid }}
{% endif %}"#;

const SGE_HEADER: &str = r#"#!/bin/bash
#$ -N {{ job_name }}
#$ -o {{ output }}
#$ -j y
#$ -cwd
#$ -V
#$ -l h_rt={{ time_budget }}
{% if hold_jid %}#$ -hold_jid {{ hold_jid }}
{% endif %}"#;

const BODY: &str = r#"
cd {{ job_dir }}

pids=()
{% for command in process_commands %}{{ command }} &
pids+=($!)
{% endfor %}
status=0
for pid in "${pids[@]}"; do
    wait "$pid" || status=1
done

if [ "$status" -ne 0 ]; then
    echo "{{ job_name }}: a piece failed, not finishing" >&2
    exit 1
fi

bash {{ finish_file }}
"#;

#[derive(Debug, Clone, Serialize)]
pub struct LauncherScript {
    pub job_name: String,
    pub job_dir: String,
    pub output: String,
    pub time_budget: String,
    pub process_commands: Vec<String>,
    pub finish_file: String,
    pub hold_jid: Option<String>,
}

impl LauncherScript {
    pub fn new(
        plan: &StagePlan,
        job_dir: &Path,
        time_budget: Duration,
        hold_jid: Option<&str>,
    ) -> Self {
        Self {
            job_name: plan.job_name.clone(),
            job_dir: shell_words::quote(&job_dir.display().to_string()).into_owned(),
            output: format!("{}.out", plan.job_name),
            time_budget: format_time_budget(time_budget),
            process_commands: plan.process_commands.clone(),
            finish_file: shell_words::quote(&plan.finish_file.display().to_string()).into_owned(),
            hold_jid: hold_jid.map(str::to_string),
        }
    }

    pub fn render(&self, flavor: ClusterFlavor) -> Result<String> {
        let header = match flavor {
            ClusterFlavor::Slurm => SLURM_HEADER,
            ClusterFlavor::Sge => SGE_HEADER,
        };
        let template = format!("{header}{BODY}");
        let context = Context::from_serialize(self)?;
        Ok(Tera::one_off(&template, &context, false)?)
    }
}

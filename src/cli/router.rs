//! Command routing and execution
//!
//! This module routes the parsed verbs to the job controller.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::app::AppConfig;
use crate::cli::args::{Cli, Commands};
use crate::config::JobConfig;
use crate::controller::JobContext;
use crate::experiment::ExperimentType;
use crate::subprocess::SubprocessManager;

/// Execute a CLI command for experiments of type `kind`
pub async fn execute_command(kind: Arc<ExperimentType>, cli: Cli) -> Result<()> {
    let app = AppConfig::new(cli.verbose);
    let overrides = cli.override_map();
    let mut config = JobConfig::load(&cli.job_dir)
        .with_context(|| format!("loading job config from {}", cli.job_dir.display()))?;

    // Flags win over the config file and environment
    if let Commands::Launch {
        scheduler,
        time_budget,
        max_parallel,
        ..
    } = &cli.command
    {
        if let Some(scheduler) = scheduler {
            config.scheduler = *scheduler;
        }
        if let Some(time_budget) = time_budget {
            config.time_budget = time_budget.clone();
        }
        if max_parallel.is_some() {
            config.max_parallel = *max_parallel;
        }
        config.validate()?;
    }

    let job = JobContext::new(kind, &cli.job_dir, config, overrides, app)?;

    match cli.command {
        Commands::Launch {
            num_pieces,
            dry_run,
            ..
        } => {
            let subprocess = SubprocessManager::production();
            let manifest = job.launch(num_pieces, subprocess.runner(), dry_run).await?;
            if let Some(manifest) = manifest {
                info!(
                    "Launched '{}' in {} stages",
                    manifest.experiment,
                    manifest.stages.len()
                );
            }
            Ok(())
        }
        Commands::Process {
            num_pieces,
            which_piece,
            stage,
        } => {
            job.process(num_pieces, which_piece, stage)
                .with_context(|| format!("processing piece {which_piece} of stage {stage}"))?;
            Ok(())
        }
        Commands::Finish { num_pieces, stage } => {
            job.finish(num_pieces, stage)
                .with_context(|| format!("finishing stage {stage}"))?;
            Ok(())
        }
    }
}

/// Parse the process arguments and run them against `kind`
///
/// Entry point for binaries that define their own experiment type; returns
/// the error so the caller decides how to exit.
pub async fn run(kind: ExperimentType) -> Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    crate::app::init_logging(&AppConfig::new(cli.verbose));
    execute_command(Arc::new(kind), cli).await
}

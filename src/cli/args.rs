//! CLI argument structures
//!
//! The same three verbs drive every experiment type; a binary built on
//! piecework parses [`Cli`] and hands it to [`crate::cli::execute_command`]
//! together with its [`crate::experiment::ExperimentType`].

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::scheduler::SchedulerKind;

/// Split an experiment into pieces, run them, merge the results
#[derive(Parser, Debug)]
#[command(name = "piecework")]
#[command(about = "piecework - map-reduce experiment orchestration", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Job directory holding description.txt and the generated command files
    #[arg(long = "job_dir", value_name = "DIR")]
    pub job_dir: PathBuf,

    /// Override a description value (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
    pub overrides: Vec<(String, String)>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn override_map(&self) -> BTreeMap<String, String> {
        self.overrides.iter().cloned().collect()
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Write per-stage command files and submit them
    #[command(name = "launch")]
    Launch {
        #[arg(long = "num_pieces", default_value = "1")]
        num_pieces: usize,

        /// Where to run the pieces (overrides piecework.toml and PIECEWORK_SCHEDULER)
        #[arg(long, value_enum)]
        scheduler: Option<SchedulerKind>,

        /// Wall-clock budget per cluster job, as HH:MM:SS
        #[arg(long = "time_budget", value_name = "HH:MM:SS")]
        time_budget: Option<String>,

        /// Maximum concurrently running local pieces
        #[arg(long = "max_parallel")]
        max_parallel: Option<usize>,

        /// Write the command files without submitting anything
        #[arg(long = "dry_run")]
        dry_run: bool,
    },

    /// Run one piece of one stage
    #[command(name = "process")]
    Process {
        #[arg(long = "num_pieces", default_value = "1")]
        num_pieces: usize,

        #[arg(long = "which_piece", default_value = "0")]
        which_piece: usize,

        #[arg(long, default_value = "0")]
        stage: usize,
    },

    /// Merge a stage's piece outputs and run its cleanup
    #[command(name = "finish")]
    Finish {
        #[arg(long = "num_pieces", default_value = "1")]
        num_pieces: usize,

        #[arg(long, default_value = "0")]
        stage: usize,
    },
}

fn parse_override(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), val.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{value}'")),
    }
}

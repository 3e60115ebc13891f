//! # piecework
//!
//! Map-reduce orchestration for batch experiments. A computation is split
//! into pieces, each piece runs as its own process on a cluster scheduler or
//! locally, per-piece results are merged after every stage and cleanup steps
//! run on the merged view.
//!
//! ## Usage
//!
//! ```bash
//! piecework --job_dir jobs/wc launch --num_pieces 8 --scheduler slurm
//! piecework --job_dir jobs/wc process --num_pieces 8 --which_piece 3 --stage 0
//! piecework --job_dir jobs/wc finish --num_pieces 8 --stage 0
//! ```
//!
//! ## Modules
//!
//! - `experiment` - Experiment types, file registry, piece naming and the stage lifecycle
//! - `serialize` - File formats and merging of per-piece results
//! - `controller` - The launch, process and finish verbs
//! - `scheduler` - SLURM, SGE and local backends
//! - `subprocess` - Process abstraction with a mock runner for tests
//! - `config` - Per-job configuration from `piecework.toml` and the environment
//! - `app` - Logging and fatal error reporting
//! - `cli` - Argument parsing and routing
//! - `demo` - The built-in word count experiment
pub mod app;
pub mod cli;
pub mod config;
pub mod controller;
pub mod demo;
pub mod error;
pub mod experiment;
pub mod scheduler;
pub mod serialize;
pub mod subprocess;

pub use error::{Error, Result};

//! Logging configuration and initialization
//!
//! Console logging is installed once per process. Each verb that works on an
//! experiment additionally scopes a subscriber that also writes to that
//! experiment's log file, with every line tagged by the piece it came from.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::subscriber::DefaultGuard;
use tracing::{debug, trace};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::config::AppConfig;
use crate::error::{Error, Result};

/// Initialize tracing/logging for the application
pub fn init_logging(config: &AppConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level())
        .with_target(config.verbose >= 2)
        .with_thread_ids(config.verbose >= 3)
        .with_line_number(config.verbose >= 3)
        .init();

    debug!("piecework started with verbosity level: {}", config.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
}

/// Where an experiment instance logs, and how its lines are tagged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTarget {
    pub path: PathBuf,
    pub label: String,
}

/// Keeps experiment logging active until dropped
pub struct ExperimentLogGuard {
    // Exit the span before the scoped subscriber is removed
    _span: tracing::span::EnteredSpan,
    _default: DefaultGuard,
}

/// Log to the console and to `target` for the rest of the current scope
pub fn scope_experiment_logging(config: &AppConfig, target: &LogTarget) -> Result<ExperimentLogGuard> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&target.path)
        .map_err(|e| Error::file_io(&target.path, e))?;

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(config.log_level()))
        .with(fmt::layer().with_target(config.verbose >= 2))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        );

    let default = tracing::subscriber::set_default(subscriber);
    let span = tracing::info_span!("piece", which = %target.label).entered();

    Ok(ExperimentLogGuard {
        _span: span,
        _default: default,
    })
}

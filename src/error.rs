use std::path::PathBuf;
use thiserror::Error;

use crate::subprocess::ProcessError;

/// Result type used throughout piecework
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown function '{name}' referenced by stage {stage}")]
    UnknownFunction { name: String, stage: usize },

    #[error("Unknown results file key: {0}")]
    UnknownKey(String),

    #[error("Malformed description line {line}: {content:?}")]
    Description { line: usize, content: String },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("I/O error on {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Submission error: {0}")]
    Submission(String),

    #[error("Command failed ({status}): {command}")]
    CommandFailed { command: String, status: String },

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Stage {stage} step '{step}' failed: {source}")]
    Step {
        stage: usize,
        step: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config<E: std::fmt::Display>(msg: E) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create a submission error
    pub fn submission<E: std::fmt::Display>(msg: E) -> Self {
        Self::Submission(msg.to_string())
    }

    /// Attach a path to an I/O error
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }

    /// Whether this error stems from a bad description, type definition or config file
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::UnknownFunction { .. }
                | Self::UnknownKey(_)
                | Self::Description { .. }
                | Self::Toml(_)
                | Self::Template(_)
        )
    }

    /// Whether this error is a missing or unreadable file
    pub fn is_io(&self) -> bool {
        matches!(self, Self::FileIo { .. } | Self::Io(_))
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_configuration() {
            2
        } else {
            1
        }
    }
}

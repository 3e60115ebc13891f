//! Application module
//!
//! This module contains application-level functionality including:
//! - Verbosity configuration
//! - Console and per-experiment logging
//! - Fatal error reporting

pub mod config;
pub mod error_handling;
pub mod logging;

pub use config::AppConfig;
pub use error_handling::handle_fatal_error;
pub use logging::{init_logging, LogTarget};

//! CLI command handlers
//!
//! This module contains argument parsing and routing for the three verbs.

pub mod args;
pub mod router;

// Re-export the main CLI structures for convenience
pub use args::{Cli, Commands};
pub use router::{execute_command, run};

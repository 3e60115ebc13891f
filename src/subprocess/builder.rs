use std::path::Path;
use std::time::Duration;

use crate::subprocess::ProcessCommand;

/// Assembles the commands the schedulers hand to a [`ProcessRunner`]
///
/// [`ProcessRunner`]: crate::subprocess::ProcessRunner
pub struct ProcessCommandBuilder {
    command: ProcessCommand,
}

impl ProcessCommandBuilder {
    /// A submission program such as `sbatch` or `qsub`
    pub fn new(program: &str) -> Self {
        Self {
            command: ProcessCommand {
                program: program.to_string(),
                args: Vec::new(),
                working_dir: None,
                timeout: None,
            },
        }
    }

    /// A piece or finish line from a command file, run through `sh -c`
    pub fn shell(line: &str) -> Self {
        Self::new("sh").arg("-c").arg(line)
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.command.args.push(arg.to_string());
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.command.working_dir = Some(dir.to_path_buf());
        self
    }

    /// Kill the process once it has run this long
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.command.timeout = Some(limit);
        self
    }

    pub fn build(self) -> ProcessCommand {
        self.command
    }
}

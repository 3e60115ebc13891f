use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ProcessError;

#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ProcessCommand {
    /// Shell-quoted rendering of the command, for logs and error messages
    pub fn display(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Timeout,
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitStatus::Success => write!(f, "exit code 0"),
            ExitStatus::Error(code) => write!(f, "exit code {code}"),
            ExitStatus::Timeout => write!(f, "timed out"),
            ExitStatus::Signal(signal) => write!(f, "signal {signal}"),
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

/// Runs commands as child processes of the controller
///
/// Output is captured in full; a command that outlives its timeout is killed
/// and reported with [`ExitStatus::Timeout`].
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    fn spawn(command: &ProcessCommand) -> Result<tokio::process::Child, ProcessError> {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args);

        // Own process group, so a terminal ^C reaches the controller first
        #[cfg(unix)]
        cmd.process_group(0);

        if let Some(dir) = &command.working_dir {
            tracing::trace!("Working directory: {}", dir.display());
            cmd.current_dir(dir);
        }

        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::CommandNotFound(command.program.clone())
            } else {
                ProcessError::Io(e)
            }
        })
    }

    /// `None` when the limit ran out first; dropping the child kills it
    async fn wait_within(
        child: tokio::process::Child,
        limit: Option<Duration>,
    ) -> Result<Option<std::process::Output>, ProcessError> {
        let output = child.wait_with_output();
        match limit {
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(result) => Ok(Some(result?)),
                Err(_) => Ok(None),
            },
            None => Ok(Some(output.await?)),
        }
    }

    fn parse_exit_status(status: std::process::ExitStatus) -> ExitStatus {
        if status.success() {
            return ExitStatus::Success;
        }
        if let Some(code) = status.code() {
            return ExitStatus::Error(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitStatus::Signal(signal);
            }
        }
        ExitStatus::Error(1)
    }

    fn log_result(result: &ProcessOutput, command: &ProcessCommand) {
        match &result.status {
            ExitStatus::Success | ExitStatus::Error(_) => tracing::debug!(
                "{} after {:?}: {}",
                result.status,
                result.duration,
                command.display()
            ),
            ExitStatus::Signal(_) | ExitStatus::Timeout => tracing::warn!(
                "{} after {:?}: {}",
                result.status,
                result.duration,
                command.display()
            ),
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        tracing::debug!("Executing subprocess: {}", command.display());
        let start = std::time::Instant::now();

        let child = Self::spawn(&command)?;
        let result = match Self::wait_within(child, command.timeout).await? {
            Some(output) => ProcessOutput {
                status: Self::parse_exit_status(output.status),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration: start.elapsed(),
            },
            None => ProcessOutput {
                status: ExitStatus::Timeout,
                stdout: String::new(),
                stderr: String::new(),
                duration: start.elapsed(),
            },
        };

        Self::log_result(&result, &command);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_arguments() {
        let command = ProcessCommand {
            program: "sbatch".to_string(),
            args: vec!["my job.sbatch".to_string()],
            working_dir: None,
            timeout: None,
        };
        assert_eq!(command.display(), "sbatch 'my job.sbatch'");
    }

    #[test]
    fn test_exit_status_display() {
        assert_eq!(ExitStatus::Error(3).to_string(), "exit code 3");
        assert_eq!(ExitStatus::Signal(9).to_string(), "signal 9");
        assert_eq!(ExitStatus::Timeout.to_string(), "timed out");
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_exit_status_success() {
        use std::os::unix::process::ExitStatusExt;
        let status = std::process::ExitStatus::from_raw(0);
        assert_eq!(
            TokioProcessRunner::parse_exit_status(status),
            ExitStatus::Success
        );
    }
}

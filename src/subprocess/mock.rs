use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

type ArgsMatcher = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Scripted stand-in for the scheduler submission programs
///
/// Clones share expectations and the record of calls, so a test keeps one
/// handle while the scheduler under test owns another.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<Expectation>>>,
    calls: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct Expectation {
    program: String,
    matcher: Option<ArgsMatcher>,
    response: ProcessOutput,
    matched: usize,
    limit: Option<usize>,
}

impl Expectation {
    fn accepts(&self, command: &ProcessCommand) -> bool {
        self.program == command.program
            && self.matcher.as_ref().map_or(true, |matcher| matcher(&command.args))
    }
}

/// One expectation under construction; [`MockCommandConfig::finish`] installs it
pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: Expectation,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an expectation for `program` that succeeds with no output
    pub fn expect_command(&mut self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: Expectation {
                program: program.to_string(),
                matcher: None,
                response: ProcessOutput {
                    status: ExitStatus::Success,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: Duration::ZERO,
                },
                matched: 0,
                limit: None,
            },
        }
    }

    /// How many recorded calls ran `program`
    pub fn calls_to(&self, program: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|command| command.program == program)
            .count()
    }

    /// Every command run so far, in call order
    pub fn history(&self) -> Vec<ProcessCommand> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        lock(&self.calls).push(command.clone());

        let mut expectations = lock(&self.expectations);
        let Some(expectation) = expectations.iter_mut().find(|e| e.accepts(&command)) else {
            return Err(ProcessError::MockExpectationNotMet(format!(
                "no expectation matches {}",
                command.display()
            )));
        };

        expectation.matched += 1;
        match expectation.limit {
            Some(limit) if expectation.matched > limit => {
                Err(ProcessError::MockExpectationNotMet(format!(
                    "{} ran {} times, expected at most {limit}",
                    command.program, expectation.matched
                )))
            }
            _ => Ok(expectation.response.clone()),
        }
    }
}

impl MockCommandConfig {
    /// Only match calls whose arguments satisfy `matcher`
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.matcher = Some(Box::new(matcher));
        self
    }

    pub fn returns_stdout(mut self, stdout: &str) -> Self {
        self.expectation.response.stdout = stdout.to_string();
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        self.expectation.response.stderr = stderr.to_string();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.response.status = match code {
            0 => ExitStatus::Success,
            code => ExitStatus::Error(code),
        };
        self
    }

    pub fn returns_success(self) -> Self {
        self.returns_exit_code(0)
    }

    /// Fail any call past the `n`th that this expectation matches
    pub fn times(mut self, n: usize) -> Self {
        self.expectation.limit = Some(n);
        self
    }

    pub fn finish(self) {
        lock(&self.runner.expectations).push(self.expectation);
    }
}

//! Mock command runner for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use super::{read, write};
use crate::process::{CommandError, CommandOutput, CommandRunner, CommandSpec};

/// Mock implementation of the CommandRunner trait.
///
/// Outputs are scripted per program name (the file name of the program) and
/// consumed in order; once a program's script runs out, the default output
/// (exit 0, empty output) is returned. Every invocation is recorded.
///
/// # Example
///
/// ```rust,ignore
/// use reprocess_core::testing::MockCommandRunner;
///
/// let runner = MockCommandRunner::new();
/// runner.push_failure("cfmask", 1, "missing band 6");
///
/// // ... run the pipeline ...
///
/// assert_eq!(runner.calls()[0].program_name(), "cfmask");
/// ```
#[derive(Debug)]
pub struct MockCommandRunner {
    scripted: Arc<RwLock<HashMap<String, VecDeque<CommandOutput>>>>,
    default_output: Arc<RwLock<CommandOutput>>,
    calls: Arc<RwLock<Vec<CommandSpec>>>,
}

impl Default for MockCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCommandRunner {
    /// Create a new mock runner where every command succeeds.
    pub fn new() -> Self {
        Self {
            scripted: Arc::new(RwLock::new(HashMap::new())),
            default_output: Arc::new(RwLock::new(CommandOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Queue an output for the next run of `program`.
    pub fn push_output(&self, program: &str, output: CommandOutput) {
        write(&self.scripted)
            .entry(program.to_string())
            .or_default()
            .push_back(output);
    }

    /// Queue a bare exit code for `program`.
    pub fn push_exit(&self, program: &str, code: i32) {
        self.push_output(
            program,
            CommandOutput {
                exit_code: Some(code),
                stdout: String::new(),
                stderr: String::new(),
            },
        );
    }

    /// Queue a successful run of `program` printing `stdout`.
    pub fn push_stdout(&self, program: &str, stdout: &str) {
        self.push_output(
            program,
            CommandOutput {
                exit_code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
    }

    /// Queue a failed run of `program`.
    pub fn push_failure(&self, program: &str, code: i32, stderr: &str) {
        self.push_output(
            program,
            CommandOutput {
                exit_code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
    }

    /// Output for any program without a scripted output.
    pub fn set_default(&self, output: CommandOutput) {
        *write(&self.default_output) = output;
    }

    /// All recorded invocations, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        read(&self.calls).clone()
    }

    /// Recorded invocations of one program.
    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        read(&self.calls)
            .iter()
            .filter(|c| c.program_name() == program)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        write(&self.calls).push(spec.clone());

        let scripted = write(&self.scripted)
            .get_mut(&spec.program_name())
            .and_then(|queue| queue.pop_front());
        Ok(scripted.unwrap_or_else(|| read(&self.default_output).clone()))
    }
}

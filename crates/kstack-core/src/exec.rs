//! External process execution
//!
//! Every interaction with the outside world (`kubectl`, `helm`, `docker`) goes through a
//! [`CommandRunner`]. [`ProcessRunner`] spawns real processes; [`MockRunner`] records commands
//! in memory so lifecycle code can be tested without a cluster.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{CoreError, Result};

/// A single external command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment variables for the child process
    pub env: Vec<(String, String)>,
    /// Text written to the child's standard input
    pub stdin: Option<String>,
    /// Treat a non-zero exit as success (e.g. `kubectl diff`)
    pub allow_failure: bool,
    /// Let the child write directly to our stdout instead of capturing it
    pub inherit_stdout: bool,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    pub fn inherit_stdout(mut self) -> Self {
        self.inherit_stdout = true;
        self
    }

    /// Does the argument list start with `prefix`?
    pub fn args_start_with(&self, prefix: &[&str]) -> bool {
        self.args.len() >= prefix.len() && self.args.iter().zip(prefix).all(|(a, p)| a == p)
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, value)?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (`None` when killed by a signal)
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful exit with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed exit with the given stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes external commands
///
/// Implementations must be Send + Sync so hooks can capture them.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command and return its output whatever the exit status
    async fn output(&self, command: &ShellCommand) -> Result<CommandOutput>;

    /// Run a command, turning a non-zero exit into [`CoreError::CommandFailed`]
    /// unless the command allows failure
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput> {
        let output = self.output(command).await?;
        if output.success() || command.allow_failure {
            return Ok(output);
        }
        Err(CoreError::CommandFailed {
            command: command.to_string(),
            code: output.code,
            stderr: output.stderr.trim_end().to_string(),
        })
    }
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn output(&self, command: &ShellCommand) -> Result<CommandOutput> {
        debug!(command = %command, "running external command");

        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(if command.inherit_stdout {
                Stdio::inherit()
            } else {
                Stdio::piped()
            })
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| CoreError::Spawn {
            command: command.to_string(),
            source,
        })?;

        // stdin is written while stdout and stderr are drained
        let writer = match (&command.stdin, child.stdin.take()) {
            (Some(input), Some(mut stdin)) => {
                let input = input.clone().into_bytes();
                Some(tokio::spawn(async move {
                    stdin.write_all(&input).await?;
                    // Closing stdin signals EOF to the child
                    drop(stdin);
                    Ok::<_, std::io::Error>(())
                }))
            }
            _ => None,
        };

        let output = child.wait_with_output().await?;

        if let Some(writer) = writer {
            match writer.await.map_err(std::io::Error::other)? {
                Ok(()) => {}
                // Child exited before reading all of its input; the exit status decides
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(command = %command, "child closed stdin early");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

type Handler = dyn Fn(&ShellCommand) -> CommandOutput + Send + Sync;

/// In-memory runner for tests
///
/// Records every command. Without a handler every command succeeds with empty output.
#[derive(Clone, Default)]
pub struct MockRunner {
    calls: Arc<Mutex<Vec<ShellCommand>>>,
    handler: Option<Arc<Handler>>,
}

impl MockRunner {
    /// Create a runner where every command succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner that answers through `handler`
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&ShellCommand) -> CommandOutput + Send + Sync + 'static,
    {
        Self {
            calls: Arc::default(),
            handler: Some(Arc::new(handler)),
        }
    }

    /// All commands run so far, in order
    pub fn calls(&self) -> Vec<ShellCommand> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Rendered command lines, in order
    pub fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    /// Number of recorded commands whose arguments start with `prefix`
    pub fn count(&self, program: &str, prefix: &[&str]) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.program == program && c.args_start_with(prefix))
            .count()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn output(&self, command: &ShellCommand) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(command.clone());
        Ok(match &self.handler {
            Some(handler) => handler(command),
            None => CommandOutput::ok(""),
        })
    }
}

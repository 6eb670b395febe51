//! Command-execution facility for the permission engine.

use std::process::{Command, Stdio};

use tracing::debug;

use super::EngineError;

/// Opaque channel to the permission engine.
///
/// Calls block; the adapter runs them on the blocking pool.
pub trait CommandExecutor: Send + Sync {
    /// Run `command`. `Ok(true)` when the engine reports success.
    fn dispatch(&self, command: &str) -> Result<bool, EngineError>;

    /// Run `command` and return its textual reply, if the executor captures one.
    fn query(&self, command: &str) -> Result<Option<String>, EngineError> {
        self.dispatch(command).map(|_| None)
    }
}

/// Runs an external launcher (for example an RCON client) with the engine
/// command as its final argument.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: String,
    args: Vec<String>,
}

impl ProcessExecutor {
    /// Parse a whitespace-separated launcher such as `mcrcon -H 127.0.0.1 -p secret`.
    pub fn from_launcher(launcher: &str) -> Result<Self, EngineError> {
        let mut parts = launcher.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| EngineError::InvalidLauncher("launcher is empty".into()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, command: &str) -> Result<std::process::Output, EngineError> {
        Command::new(&self.program)
            .args(&self.args)
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| EngineError::Launch {
                program: self.program.clone(),
                source,
            })
    }
}

impl CommandExecutor for ProcessExecutor {
    fn dispatch(&self, command: &str) -> Result<bool, EngineError> {
        let output = self.run(command)?;
        let success = output.status.success();
        debug!(command, success, "Executed engine command");
        Ok(success)
    }

    fn query(&self, command: &str) -> Result<Option<String>, EngineError> {
        let output = self.run(command)?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string))
    }
}

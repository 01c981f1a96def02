//! Docker CLI command builder.
//!
//! Every engine call goes through [`DockerCommand`] so output capture,
//! logging and failure classification stay consistent. Child processes are
//! killed when the future driving them is dropped, which lets callers bound
//! each call with a timeout.

use crate::error::{classify_failure, FailureContext, Result, RuntimeError};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DockerCommand {
    program: String,
    subcommand: Option<String>,
    args: Vec<String>,
    context: FailureContext,
    target: String,
}

impl DockerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            subcommand: None,
            args: Vec::new(),
            context: FailureContext::Lifecycle,
            target: String::new(),
        }
    }

    /// Set the subcommand (e.g. "create", "exec", "rm").
    pub fn subcommand<S: Into<String>>(mut self, cmd: S) -> Self {
        self.subcommand = Some(cmd.into());
        self
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
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

    /// How a failure of this command is classified, and what it acted on.
    pub fn classify_as(mut self, context: FailureContext, target: impl Into<String>) -> Self {
        self.context = context;
        self.target = target.into();
        self
    }

    /// Full argument vector, subcommand first.
    pub fn to_args(&self) -> Vec<String> {
        self.subcommand
            .iter()
            .cloned()
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Run to completion and return trimmed stdout.
    pub async fn execute_with_output(self) -> Result<String> {
        let mut cmd = self.build_command();
        debug!(program = %self.program, args = ?self.to_args(), "Executing runtime command");

        let output = cmd.output().await.map_err(|e| self.spawn_error(e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(status = %output.status, stderr = %stderr.trim(), "Runtime command failed");
            Err(classify_failure(self.context, &self.target, &stderr))
        }
    }

    /// Run to completion, discarding stdout.
    pub async fn execute(self) -> Result<()> {
        self.execute_with_output().await.map(|_| ())
    }

    /// Spawn with piped stdout and stderr for streaming consumption.
    pub fn spawn_piped(self) -> Result<Child> {
        let mut cmd = self.build_command();
        debug!(program = %self.program, args = ?self.to_args(), "Spawning runtime command");
        cmd.spawn().map_err(|e| self.spawn_error(e))
    }

    fn spawn_error(&self, err: std::io::Error) -> RuntimeError {
        if err.kind() == std::io::ErrorKind::NotFound {
            RuntimeError::CommandFailed(format!(
                "container engine CLI '{}' not found in PATH",
                self.program
            ))
        } else {
            RuntimeError::Io(err)
        }
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_command_builder() {
        let cmd = DockerCommand::new("docker")
            .subcommand("ps")
            .arg("-a")
            .args(["--format", "{{.Names}}"]);

        assert_eq!(cmd.to_args(), vec!["ps", "-a", "--format", "{{.Names}}"]);
    }

    #[test]
    fn test_docker_command_without_subcommand() {
        let cmd = DockerCommand::new("docker").arg("--version");
        assert_eq!(cmd.to_args(), vec!["--version"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let err = DockerCommand::new("definitely-not-a-container-engine-cli")
            .subcommand("info")
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::CommandFailed(msg) if msg.contains("not found in PATH")));
    }
}

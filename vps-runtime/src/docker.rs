//! Docker engine adapter driven through the `docker` CLI.
//!
//! The CLI talks to the local control socket; any Docker-compatible CLI
//! (for example `podman`) can be substituted through [`DockerRuntime::with_program`].

use crate::{
    command::DockerCommand,
    container::{ContainerSpec, ImageRef, ImageSpec, RuntimeHandle, RuntimeState},
    error::{classify_failure, FailureContext, Result, RuntimeError},
    resources::write_build_context,
    ContainerRuntime, ExecStream,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tokio::{
    io::AsyncReadExt,
    process::{Child, ChildStdout},
    task::JoinHandle,
};
use tracing::{debug, info, instrument};

/// Grace period, in seconds, given to a container on `stop` before SIGKILL.
const STOP_GRACE_SECS: u32 = 10;

const EXEC_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct DockerRuntime {
    program: String,
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> DockerCommand {
        DockerCommand::new(&self.program)
    }

    /// Arguments for `docker create`, image last.
    pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec![
            "--name".to_string(),
            spec.name.clone(),
            "--memory".to_string(),
            spec.limits.memory_bytes.to_string(),
            "--cpu-period".to_string(),
            spec.limits.cpu_period.to_string(),
            "--cpu-quota".to_string(),
            spec.limits.cpu_quota.to_string(),
            "--restart".to_string(),
            spec.restart_policy.as_str().to_string(),
        ];
        if spec.tty {
            args.push("--tty".to_string());
        }
        for (key, value) in &spec.env {
            args.push("--env".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(spec.image.to_string());
        args
    }

    async fn image_exists(&self, tag: &str) -> Result<bool> {
        match self
            .command()
            .subcommand("image")
            .args(["inspect", "--format", "{{.Id}}", tag])
            .classify_as(FailureContext::Build, tag)
            .execute()
            .await
        {
            Ok(()) => Ok(true),
            Err(RuntimeError::Unreachable(msg)) => Err(RuntimeError::Unreachable(msg)),
            Err(_) => Ok(false),
        }
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    #[instrument(skip(self, image), fields(image = %image.tag))]
    async fn ensure_image(&self, image: &ImageSpec) -> Result<ImageRef> {
        if self.image_exists(&image.tag).await? {
            debug!("Base image already present");
            return Ok(ImageRef::new(&image.tag));
        }

        info!("Building base image");
        let context_dir = tempfile::Builder::new().prefix("vps-image-").tempdir()?;
        write_build_context(image, context_dir.path())?;

        let dockerfile = context_dir.path().join(&image.dockerfile);
        self.command()
            .subcommand("build")
            .arg("--tag")
            .arg(&image.tag)
            .arg("--file")
            .arg(dockerfile.to_string_lossy())
            .arg(context_dir.path().to_string_lossy())
            .classify_as(FailureContext::Build, &image.tag)
            .execute()
            .await?;

        info!("Base image built");
        Ok(ImageRef::new(&image.tag))
    }

    #[instrument(skip(self, spec), fields(vps = %spec.name))]
    async fn create(&self, spec: &ContainerSpec) -> Result<RuntimeHandle> {
        let id = self
            .command()
            .subcommand("create")
            .args(Self::create_args(spec))
            .classify_as(FailureContext::Create, &spec.name)
            .execute_with_output()
            .await?;

        // Pull progress may precede the id when the image is fetched on demand.
        let id = id.lines().last().unwrap_or_default().trim().to_string();
        if id.is_empty() {
            return Err(RuntimeError::CreateFailed {
                name: spec.name.clone(),
                detail: "engine returned no container id".to_string(),
            });
        }

        debug!(handle = %id, "Container created");
        Ok(RuntimeHandle::new(id))
    }

    async fn start(&self, handle: &RuntimeHandle) -> Result<()> {
        self.command()
            .subcommand("start")
            .arg(handle.as_str())
            .classify_as(FailureContext::Lifecycle, handle.as_str())
            .execute()
            .await
    }

    async fn stop(&self, handle: &RuntimeHandle) -> Result<()> {
        self.command()
            .subcommand("stop")
            .args(["--time", &STOP_GRACE_SECS.to_string(), handle.as_str()])
            .classify_as(FailureContext::Lifecycle, handle.as_str())
            .execute()
            .await
    }

    async fn restart(&self, handle: &RuntimeHandle) -> Result<()> {
        self.command()
            .subcommand("restart")
            .args(["--time", &STOP_GRACE_SECS.to_string(), handle.as_str()])
            .classify_as(FailureContext::Lifecycle, handle.as_str())
            .execute()
            .await
    }

    async fn remove(&self, handle: &RuntimeHandle, force: bool) -> Result<()> {
        let mut cmd = self.command().subcommand("rm");
        if force {
            cmd = cmd.arg("--force");
        }
        cmd.arg(handle.as_str())
            .classify_as(FailureContext::Lifecycle, handle.as_str())
            .execute()
            .await
    }

    async fn exec(&self, handle: &RuntimeHandle, command: &[String]) -> Result<ExecStream> {
        let mut child = self
            .command()
            .subcommand("exec")
            .arg(handle.as_str())
            .args(command.iter().cloned())
            .classify_as(FailureContext::Exec, handle.as_str())
            .spawn_piped()?;

        let stdout = child.stdout.take().ok_or_else(|| RuntimeError::ExecFailed {
            target: handle.to_string(),
            detail: "exec stdout was not captured".to_string(),
        })?;

        // Drained concurrently so a chatty stderr cannot block the child.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let state = ExecState {
            child,
            stdout,
            stderr_task,
            target: handle.to_string(),
            done: false,
        };

        Ok(stream::unfold(state, next_exec_chunk).boxed())
    }

    async fn inspect(&self, handle: &RuntimeHandle) -> Result<Option<RuntimeState>> {
        let result = self
            .command()
            .subcommand("inspect")
            .args(["--type", "container", "--format", "{{.State.Status}}"])
            .arg(handle.as_str())
            .classify_as(FailureContext::Lifecycle, handle.as_str())
            .execute_with_output()
            .await;

        match result {
            Ok(status) => Ok(Some(RuntimeState::from_engine_status(&status))),
            Err(RuntimeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn lookup(&self, name: &str) -> Result<Option<RuntimeHandle>> {
        let output = self
            .command()
            .subcommand("ps")
            .args(["--all", "--no-trunc", "--filter"])
            .arg(format!("name=^{name}$"))
            .args(["--format", "{{.ID}} {{.Names}}"])
            .classify_as(FailureContext::Lifecycle, name)
            .execute_with_output()
            .await?;

        Ok(parse_lookup_output(&output, name))
    }
}

/// Pick the id whose name matches exactly from `ps --format "{{.ID}} {{.Names}}"`.
fn parse_lookup_output(output: &str, name: &str) -> Option<RuntimeHandle> {
    output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let id = parts.next()?;
        let names = parts.next()?;
        names
            .split(',')
            .any(|n| n.trim_start_matches('/') == name)
            .then(|| RuntimeHandle::new(id))
    })
}

struct ExecState {
    child: Child,
    stdout: ChildStdout,
    stderr_task: Option<JoinHandle<String>>,
    target: String,
    done: bool,
}

async fn next_exec_chunk(mut state: ExecState) -> Option<(Result<Bytes>, ExecState)> {
    if state.done {
        return None;
    }

    let mut buf = vec![0u8; EXEC_CHUNK_SIZE];
    match state.stdout.read(&mut buf).await {
        Ok(0) => {
            state.done = true;
            let stderr = match state.stderr_task.take() {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };
            match state.child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => {
                    let detail = if stderr.trim().is_empty() {
                        format!("exec exited with {status}")
                    } else {
                        stderr
                    };
                    let err = classify_failure(FailureContext::Exec, &state.target, &detail);
                    Some((Err(err), state))
                }
                Err(e) => Some((Err(RuntimeError::Io(e)), state)),
            }
        }
        Ok(n) => {
            buf.truncate(n);
            Some((Ok(Bytes::from(buf)), state))
        }
        Err(e) => {
            state.done = true;
            Some((Err(RuntimeError::Io(e)), state))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ResourceLimits, RestartPolicy};

    fn spec() -> ContainerSpec {
        ContainerSpec {
            image: ImageRef::new("nxh-i7/ubuntu22.04-tmate"),
            name: "alpha".to_string(),
            env: vec![("SUPPORT_NUMBER".to_string(), "+1 555 0100".to_string())],
            limits: ResourceLimits::default(),
            restart_policy: RestartPolicy::UnlessStopped,
            tty: true,
        }
    }

    #[test]
    fn test_create_args_carry_fixed_policy() {
        let args = DockerRuntime::create_args(&spec());
        let joined = args.join(" ");

        assert!(joined.contains("--name alpha"));
        assert!(joined.contains("--memory 536870912"));
        assert!(joined.contains("--cpu-period 100000"));
        assert!(joined.contains("--cpu-quota 50000"));
        assert!(joined.contains("--restart unless-stopped"));
        assert!(args.contains(&"--tty".to_string()));
        assert!(args.contains(&"SUPPORT_NUMBER=+1 555 0100".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("nxh-i7/ubuntu22.04-tmate"));
    }

    #[test]
    fn test_parse_lookup_output_exact_match() {
        let output = "aaa111 alpha-2\nbbb222 alpha\n";
        assert_eq!(
            parse_lookup_output(output, "alpha"),
            Some(RuntimeHandle::new("bbb222"))
        );
        assert_eq!(parse_lookup_output(output, "beta"), None);
        assert_eq!(parse_lookup_output("", "alpha"), None);
    }
}

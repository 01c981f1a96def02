//! Remote shell session bootstrapper.
//!
//! Runs the terminal-sharing agent inside a VPS and scans its output for the
//! SSH connection string it announces once connected.

use crate::error::Result;
use futures_util::StreamExt;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, instrument};
use vps_runtime::{ContainerRuntime, ExecStream, RuntimeError, RuntimeHandle};

/// Starts a detached tmate session on a fixed socket if none exists, waits
/// briefly for it to connect, and prints its SSH endpoint. Prints nothing
/// while the session is still connecting.
pub const DEFAULT_AGENT_SCRIPT: &str = "\
S=/tmp/vps-tmate.sock; \
tmate -S $S has-session 2>/dev/null || tmate -S $S new-session -d; \
timeout 3 tmate -S $S wait tmate-ready 2>/dev/null && tmate -S $S display -p '#{tmate_ssh}'; \
exit 0";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Command executed inside the container.
    pub agent_command: Vec<String>,
    /// How long to listen for the endpoint before answering `Pending`.
    pub window: Duration,
    /// Delay suggested to the caller along with `Pending`.
    pub retry_after: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            agent_command: vec![
                "sh".to_string(),
                "-c".to_string(),
                DEFAULT_AGENT_SCRIPT.to_string(),
            ],
            window: Duration::from_secs(15),
            retry_after: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Ready { endpoint: String },
    /// The agent is still starting. Not an error.
    Pending { retry_after: Duration },
}

#[derive(Clone)]
pub struct SessionBootstrapper {
    runtime: Arc<dyn ContainerRuntime>,
    config: SessionConfig,
    call_timeout: Duration,
}

impl SessionBootstrapper {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        config: SessionConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            config,
            call_timeout,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the agent in the container behind `handle` and wait for an endpoint.
    #[instrument(skip(self), fields(handle = %handle.short()))]
    pub async fn open(&self, handle: &RuntimeHandle) -> Result<SessionOutcome> {
        let mut stream = tokio::time::timeout(
            self.call_timeout,
            self.runtime.exec(handle, &self.config.agent_command),
        )
        .await
        .map_err(|_| {
            RuntimeError::Unreachable(format!(
                "exec did not respond within {:?}",
                self.call_timeout
            ))
        })??;

        let scan = scan_for_endpoint(&mut stream);
        let endpoint = match tokio::time::timeout(self.config.window, scan).await {
            Ok(found) => found?,
            Err(_) => {
                debug!("no endpoint within {:?}", self.config.window);
                None
            }
        };

        Ok(match endpoint {
            Some(endpoint) => SessionOutcome::Ready { endpoint },
            None => SessionOutcome::Pending {
                retry_after: self.config.retry_after,
            },
        })
    }
}

/// Read `stream` line by line until a line carries an endpoint.
async fn scan_for_endpoint(stream: &mut ExecStream) -> Result<Option<String>> {
    let mut buffer = String::new();
    while let Some(chunk) = stream.next().await {
        buffer.push_str(&String::from_utf8_lossy(&chunk?));

        while let Some(newline) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline).collect();
            if let Some(endpoint) = extract_endpoint(&line) {
                return Ok(Some(endpoint));
            }
        }
    }
    Ok(extract_endpoint(&buffer))
}

fn endpoint_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"ssh\s+(?:-p\s*\d+\s+)?[A-Za-z0-9._-]+@[A-Za-z0-9.-]+(?::\d+)?")
            .expect("endpoint pattern is valid")
    })
}

/// First SSH connection string in `line`, trimmed.
pub fn extract_endpoint(line: &str) -> Option<String> {
    endpoint_pattern()
        .find(line)
        .map(|m| m.as_str().trim().to_string())
        .filter(|endpoint| !endpoint.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_endpoint() {
        assert_eq!(
            extract_endpoint("ssh Xk2bT9aQ@lon1.tmate.io\n").as_deref(),
            Some("ssh Xk2bT9aQ@lon1.tmate.io")
        );
    }

    #[test]
    fn test_extract_from_announcement_line() {
        let line = "[tmate] ssh session: ssh wQ7n-Hb3@nyc1.tmate.io  ";
        assert_eq!(
            extract_endpoint(line).as_deref(),
            Some("ssh wQ7n-Hb3@nyc1.tmate.io")
        );
    }

    #[test]
    fn test_extract_with_port() {
        assert_eq!(
            extract_endpoint("ssh -p 2222 abc@tmate.example.org").as_deref(),
            Some("ssh -p 2222 abc@tmate.example.org")
        );
    }

    #[test]
    fn test_no_endpoint() {
        assert_eq!(extract_endpoint(""), None);
        assert_eq!(extract_endpoint("Connecting to ssh.tmate.io..."), None);
        assert_eq!(extract_endpoint("web session: https://tmate.io/t/abc"), None);
    }
}

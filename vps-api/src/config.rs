use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use vps_orchestrator::{OrchestratorConfig, SessionConfig};
use vps_runtime::resources::{vps_base_image, DEFAULT_IMAGE_TAG};
use vps_runtime::ResourceLimits;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Seconds between reconciliation sweeps. 0 disables them.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    #[serde(default = "default_runtime_timeout")]
    pub runtime_timeout_secs: u64,

    #[serde(default = "default_image_build_timeout")]
    pub image_build_timeout_secs: u64,

    #[serde(default = "default_image_tag")]
    pub image_tag: String,

    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,

    #[serde(default = "default_cpu_quota_percent")]
    pub cpu_quota_percent: u64,

    #[serde(default = "default_session_window")]
    pub session_window_secs: u64,

    #[serde(default = "default_session_retry_after")]
    pub session_retry_after_secs: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn default_bind_addr() -> String {
    std::env::var("VPS_API_BIND").unwrap_or_else(|_| "0.0.0.0:5000".to_string())
}

fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("VPS_API_DB_PATH") {
        return PathBuf::from(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".vps").join("api").join("vps.db")
}

fn default_reconcile_interval() -> u64 {
    env_or("VPS_API_RECONCILE_INTERVAL", 60)
}

fn default_runtime_timeout() -> u64 {
    env_or("VPS_RUNTIME_TIMEOUT", 30)
}

fn default_image_build_timeout() -> u64 {
    env_or("VPS_IMAGE_BUILD_TIMEOUT", 600) // 10 minutes
}

fn default_image_tag() -> String {
    std::env::var("VPS_IMAGE_TAG").unwrap_or_else(|_| DEFAULT_IMAGE_TAG.to_string())
}

fn default_memory_mb() -> u64 {
    env_or("VPS_MEMORY_MB", ResourceLimits::DEFAULT_MEMORY_MB)
}

fn default_cpu_quota_percent() -> u64 {
    env_or("VPS_CPU_QUOTA_PERCENT", ResourceLimits::DEFAULT_CPU_PERCENT)
}

fn default_session_window() -> u64 {
    env_or("VPS_SESSION_WINDOW", 15)
}

fn default_session_retry_after() -> u64 {
    env_or("VPS_SESSION_RETRY_AFTER", 10)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            reconcile_interval_secs: default_reconcile_interval(),
            runtime_timeout_secs: default_runtime_timeout(),
            image_build_timeout_secs: default_image_build_timeout(),
            image_tag: default_image_tag(),
            memory_mb: default_memory_mb(),
            cpu_quota_percent: default_cpu_quota_percent(),
            session_window_secs: default_session_window(),
            session_retry_after_secs: default_session_retry_after(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Provisioning policy and timeouts for the orchestrator. Fails on
    /// resource limits the engine would reject or misread.
    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig> {
        let base = OrchestratorConfig::default();
        let limits = ResourceLimits::new(self.memory_mb, self.cpu_quota_percent)
            .context("invalid VPS_MEMORY_MB / VPS_CPU_QUOTA_PERCENT")?;

        Ok(OrchestratorConfig {
            image: vps_base_image(&self.image_tag),
            limits,
            call_timeout: Duration::from_secs(self.runtime_timeout_secs),
            build_timeout: Duration::from_secs(self.image_build_timeout_secs),
            session: SessionConfig {
                window: Duration::from_secs(self.session_window_secs),
                retry_after: Duration::from_secs(self.session_retry_after_secs),
                ..base.session
            },
            ..base
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: PathBuf::from("/tmp/vps-test.db"),
            reconcile_interval_secs: 0,
            runtime_timeout_secs: 5,
            image_build_timeout_secs: 120,
            image_tag: "example/vps:test".to_string(),
            memory_mb: 1024,
            cpu_quota_percent: 25,
            session_window_secs: 3,
            session_retry_after_secs: 7,
        }
    }

    #[test]
    fn test_orchestrator_config_mapping() {
        let orchestrator = config().orchestrator_config().unwrap();

        assert_eq!(orchestrator.image.tag, "example/vps:test");
        assert_eq!(orchestrator.limits.memory_bytes, 1024 * 1024 * 1024);
        assert_eq!(orchestrator.limits.cpu_quota, 25_000);
        assert_eq!(orchestrator.call_timeout, Duration::from_secs(5));
        assert_eq!(orchestrator.build_timeout, Duration::from_secs(120));
        assert_eq!(orchestrator.session.window, Duration::from_secs(3));
        assert_eq!(orchestrator.session.retry_after, Duration::from_secs(7));
        assert!(!orchestrator.session.agent_command.is_empty());
    }

    #[test]
    fn test_orchestrator_config_rejects_bad_limits() {
        let overflow = Config {
            memory_mb: u64::MAX / 1024,
            ..config()
        };
        assert!(overflow.orchestrator_config().is_err());

        let unlimited = Config {
            cpu_quota_percent: 0,
            ..config()
        };
        let err = unlimited.orchestrator_config().unwrap_err();
        assert!(format!("{err:#}").contains("cpu share"));
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("VPS_TEST_CONFIG_GARBAGE", "not-a-number");
        assert_eq!(env_or("VPS_TEST_CONFIG_GARBAGE", 42u64), 42);
        assert_eq!(env_or("VPS_TEST_CONFIG_UNSET", 7u64), 7);
    }
}

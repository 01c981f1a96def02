use crate::session::SessionConfig;
use std::time::Duration;
use vps_runtime::resources::{vps_base_image, DEFAULT_IMAGE_TAG};
use vps_runtime::{ImageSpec, ResourceLimits, RestartPolicy};

/// Name of the environment variable carrying a VPS's support metadata.
pub const SUPPORT_ENV_VAR: &str = "SUPPORT_NUMBER";

/// Fixed provisioning policy and timeouts of the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub image: ImageSpec,
    pub limits: ResourceLimits,
    pub restart_policy: RestartPolicy,
    /// Upper bound for every runtime call except the image build.
    pub call_timeout: Duration,
    pub build_timeout: Duration,
    pub session: SessionConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            image: vps_base_image(DEFAULT_IMAGE_TAG),
            limits: ResourceLimits::default(),
            restart_policy: RestartPolicy::default(),
            call_timeout: Duration::from_secs(30),
            build_timeout: Duration::from_secs(600),
            session: SessionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.image.tag, "nxh-i7/ubuntu22.04-tmate");
        assert_eq!(config.limits.memory_bytes, 512 * 1024 * 1024);
        assert_eq!(config.limits.cpu_quota * 2, config.limits.cpu_period);
        assert_eq!(config.restart_policy, RestartPolicy::UnlessStopped);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
    }
}

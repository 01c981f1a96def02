//! Value types passed across the runtime adapter boundary.

use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one container instance.
///
/// A VPS keeps its name across reinstalls but receives a new handle every
/// time its container is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeHandle(String);

impl RuntimeHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, the way container engines abbreviate ids.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RuntimeHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Tag of a built image, as returned by `ensure_image`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One file of an image build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFile {
    pub path: String,
    pub contents: String,
    pub executable: bool,
}

/// Everything needed to build an image when it is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub tag: String,
    /// Path of the Dockerfile inside the build context.
    pub dockerfile: String,
    pub files: Vec<BuildFile>,
}

/// Resource ceiling applied identically to every container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_bytes: u64,
    pub cpu_period: u64,
    pub cpu_quota: u64,
}

impl ResourceLimits {
    pub const DEFAULT_MEMORY_MB: u64 = 512;
    pub const DEFAULT_CPU_PERCENT: u64 = 50;
    /// The engine refuses smaller memory limits.
    pub const MIN_MEMORY_MB: u64 = 6;
    const CPU_PERIOD: u64 = 100_000;
    const MIB: u64 = 1024 * 1024;

    /// Limits from a memory size in MiB and a share of one core in percent.
    ///
    /// A zero quota would mean "unlimited" to the engine, so at least 1% is
    /// required.
    pub fn new(memory_mb: u64, cpu_percent: u64) -> Result<Self> {
        if memory_mb < Self::MIN_MEMORY_MB {
            return Err(RuntimeError::InvalidLimits(format!(
                "memory must be at least {} MiB, got {memory_mb}",
                Self::MIN_MEMORY_MB
            )));
        }
        if cpu_percent == 0 {
            return Err(RuntimeError::InvalidLimits(
                "cpu share must be at least 1%".to_string(),
            ));
        }

        let memory_bytes = memory_mb.checked_mul(Self::MIB).ok_or_else(|| {
            RuntimeError::InvalidLimits(format!("memory of {memory_mb} MiB is out of range"))
        })?;
        let cpu_quota = Self::CPU_PERIOD
            .checked_mul(cpu_percent)
            .map(|quota| quota / 100)
            .ok_or_else(|| {
                RuntimeError::InvalidLimits(format!("cpu share of {cpu_percent}% is out of range"))
            })?;

        Ok(Self {
            memory_bytes,
            cpu_period: Self::CPU_PERIOD,
            cpu_quota,
        })
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: Self::DEFAULT_MEMORY_MB * Self::MIB,
            cpu_period: Self::CPU_PERIOD,
            cpu_quota: Self::CPU_PERIOD * Self::DEFAULT_CPU_PERCENT / 100,
        }
    }
}

/// Engine-side restart policy attached at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    OnFailure,
    #[default]
    UnlessStopped,
    Always,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::OnFailure => "on-failure",
            Self::UnlessStopped => "unless-stopped",
            Self::Always => "always",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: ImageRef,
    pub name: String,
    pub env: Vec<(String, String)>,
    pub limits: ResourceLimits,
    pub restart_policy: RestartPolicy,
    pub tty: bool,
}

/// State of a container as observed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeState {
    Running,
    Stopped,
}

impl RuntimeState {
    /// Map an engine status string (`docker inspect .State.Status`).
    pub fn from_engine_status(status: &str) -> Self {
        match status.trim() {
            "running" | "restarting" | "paused" => Self::Running,
            _ => Self::Stopped,
        }
    }
}

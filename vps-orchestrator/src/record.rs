//! VPS records, principals and the request types of the orchestrator.

use crate::error::{Result, VpsError};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use utoipa::ToSchema;
use vps_runtime::{RuntimeHandle, RuntimeState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl FromStr for Role {
    type Err = VpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(VpsError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

/// An authenticated actor, resolved by the auth layer in front of the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Principal {
    pub identity: String,
    pub role: Role,
}

impl Principal {
    pub fn new(identity: impl Into<String>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
        }
    }

    pub fn admin(identity: impl Into<String>) -> Self {
        Self::new(identity, Role::Admin)
    }

    pub fn user(identity: impl Into<String>) -> Self {
        Self::new(identity, Role::User)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VpsStatus {
    Creating,
    Running,
    Stopped,
    Error,
    /// Terminal. Only ever reported in the snapshot returned by delete.
    Deleted,
}

impl From<RuntimeState> for VpsStatus {
    fn from(state: RuntimeState) -> Self {
        match state {
            RuntimeState::Running => VpsStatus::Running,
            RuntimeState::Stopped => VpsStatus::Stopped,
        }
    }
}

impl fmt::Display for VpsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VpsStatus::Creating => "creating",
            VpsStatus::Running => "running",
            VpsStatus::Stopped => "stopped",
            VpsStatus::Error => "error",
            VpsStatus::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VpsRecord {
    pub id: i64,
    pub name: String,
    pub owner: String,
    pub support: String,
    /// Container bound to this VPS. `None` before the first successful
    /// create and after the container was lost.
    pub runtime_handle: Option<String>,
    pub status: VpsStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VpsRecord {
    pub fn handle(&self) -> Option<RuntimeHandle> {
        self.runtime_handle.clone().map(RuntimeHandle::from)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateVpsRequest {
    pub name: String,
    pub owner: String,
    /// Support contact shown inside the VPS. Opaque to the orchestrator.
    #[serde(default)]
    pub support: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Start,
    Stop,
    Restart,
    Reinstall,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Restart => "restart",
            LifecycleAction::Reinstall => "reinstall",
        }
    }
}

impl FromStr for LifecycleAction {
    type Err = VpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(LifecycleAction::Start),
            "stop" => Ok(LifecycleAction::Stop),
            "restart" => Ok(LifecycleAction::Restart),
            "reinstall" => Ok(LifecycleAction::Reinstall),
            other => Err(VpsError::Validation(format!("unknown action '{other}'"))),
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_.-]{0,62}$").expect("VPS name pattern is valid")
    })
}

/// VPS names double as container names and must start with a letter, which
/// keeps them disjoint from numeric record ids.
pub fn validate_name(name: &str) -> Result<()> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(VpsError::Validation(format!(
            "invalid VPS name '{name}': use 1-63 letters, digits, '_', '.' or '-', starting with a letter"
        )))
    }
}

pub fn validate_owner(owner: &str) -> Result<()> {
    if owner.trim().is_empty() {
        return Err(VpsError::Validation("owner must not be empty".to_string()));
    }
    Ok(())
}

//! VPS lifecycle orchestration
//!
//! This crate owns the VPS records and drives their containers through a
//! [`vps_runtime::ContainerRuntime`]. It is consumed by the vps-api HTTP
//! service but can also be used by CLI commands, background workers, or
//! other entry points.

pub mod access;
pub mod config;
pub mod db;
pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod record;
pub mod session;
pub mod store;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use access::{authorize, Action, Decision, DenyReason};
pub use config::OrchestratorConfig;
pub use error::{ErrorKind, Result, VpsError};
pub use orchestrator::{ReconcileReport, VpsOrchestrator};
pub use record::{CreateVpsRequest, LifecycleAction, Principal, Role, VpsRecord, VpsStatus};
pub use session::{SessionConfig, SessionOutcome};
pub use store::{RecordUpdate, VpsStore};

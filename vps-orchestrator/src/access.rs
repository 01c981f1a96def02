//! Access control guard.
//!
//! The single place where roles and ownership are evaluated. Every
//! orchestrator entry point asks [`authorize`] before touching a record.

use crate::record::{LifecycleAction, Principal, Role, VpsRecord};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Start,
    Stop,
    Restart,
    Reinstall,
    Delete,
    Ssh,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Reinstall => "reinstall",
            Action::Delete => "delete",
            Action::Ssh => "ssh",
        }
    }

    fn admin_only(&self) -> bool {
        matches!(self, Action::Create | Action::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LifecycleAction> for Action {
    fn from(action: LifecycleAction) -> Self {
        match action {
            LifecycleAction::Start => Action::Start,
            LifecycleAction::Stop => Action::Stop,
            LifecycleAction::Restart => Action::Restart,
            LifecycleAction::Reinstall => Action::Reinstall,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The record belongs to someone else. Must look like an absent record.
    NotOwner,
    /// The action needs the admin role.
    AdminOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Decide whether `principal` may perform `action` on `record`.
///
/// `record` is `None` only for actions without a target (create). Ownership
/// is checked before the role restriction so that a user asking to delete
/// someone else's VPS learns nothing about its existence.
pub fn authorize(principal: &Principal, record: Option<&VpsRecord>, action: Action) -> Decision {
    if principal.role == Role::Admin {
        return Decision::Allow;
    }

    match record {
        Some(record) if record.owner != principal.identity => Decision::Deny(DenyReason::NotOwner),
        _ if action.admin_only() => Decision::Deny(DenyReason::AdminOnly),
        Some(_) => Decision::Allow,
        None => Decision::Deny(DenyReason::NotOwner),
    }
}

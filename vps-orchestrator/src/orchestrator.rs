//! The VPS lifecycle state machine.
//!
//! Every entry point authorizes through [`crate::access::authorize`], takes
//! the per-record lock for mutations, drives the container runtime with a
//! bounded timeout and commits the resulting state to the store. Mutations
//! run on their own task so a dropped request cannot cancel them halfway.

use crate::access::{authorize, Action, Decision, DenyReason};
use crate::config::{OrchestratorConfig, SUPPORT_ENV_VAR};
use crate::error::{Result, VpsError};
use crate::locks::LockRegistry;
use crate::record::{
    validate_name, validate_owner, CreateVpsRequest, LifecycleAction, Principal, VpsRecord,
    VpsStatus,
};
use crate::session::{SessionBootstrapper, SessionOutcome};
use crate::store::{RecordUpdate, VpsStore};
use chrono::Utc;
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn, Instrument};
use vps_runtime::{ContainerRuntime, ContainerSpec, ImageRef, RuntimeError, RuntimeHandle};

#[derive(Debug, Clone, Copy)]
enum Power {
    Start,
    Stop,
    Restart,
}

impl Power {
    fn action(self) -> Action {
        match self {
            Power::Start => Action::Start,
            Power::Stop => Action::Stop,
            Power::Restart => Action::Restart,
        }
    }
}

/// Summary of one reconciliation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub updated: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct VpsOrchestrator {
    store: VpsStore,
    runtime: Arc<dyn ContainerRuntime>,
    locks: LockRegistry,
    image: Arc<OnceCell<ImageRef>>,
    config: Arc<OrchestratorConfig>,
    sessions: SessionBootstrapper,
}

impl VpsOrchestrator {
    pub fn new(
        pool: SqlitePool,
        runtime: Arc<dyn ContainerRuntime>,
        config: OrchestratorConfig,
    ) -> Self {
        let sessions = SessionBootstrapper::new(
            runtime.clone(),
            config.session.clone(),
            config.call_timeout,
        );

        Self {
            store: VpsStore::new(pool),
            runtime,
            locks: LockRegistry::new(),
            image: Arc::new(OnceCell::new()),
            config: Arc::new(config),
            sessions,
        }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &SqlitePool {
        self.store.pool()
    }

    pub fn store(&self) -> &VpsStore {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Create, start and persist a new VPS. Admin only.
    #[instrument(skip_all, fields(vps = %req.name, principal = %principal.identity))]
    pub async fn create(&self, principal: &Principal, req: CreateVpsRequest) -> Result<VpsRecord> {
        let this = self.clone();
        let principal = principal.clone();
        self.run_detached(async move { this.create_inner(&principal, req).await })
            .await
    }

    /// Records the principal may see.
    pub async fn list(&self, principal: &Principal) -> Result<Vec<VpsRecord>> {
        let records = self.store.list_for(principal).await?;

        // The query only narrows the rows; the guard decides visibility.
        Ok(records
            .into_iter()
            .filter(|record| authorize(principal, Some(record), Action::Read).is_allowed())
            .collect())
    }

    pub async fn get(&self, principal: &Principal, key: &str) -> Result<VpsRecord> {
        self.resolve(principal, key, Action::Read).await
    }

    /// Dispatch a lifecycle action by value.
    pub async fn perform(
        &self,
        principal: &Principal,
        key: &str,
        action: LifecycleAction,
    ) -> Result<VpsRecord> {
        match action {
            LifecycleAction::Start => self.start(principal, key).await,
            LifecycleAction::Stop => self.stop(principal, key).await,
            LifecycleAction::Restart => self.restart(principal, key).await,
            LifecycleAction::Reinstall => self.reinstall(principal, key).await,
        }
    }

    #[instrument(skip_all, fields(vps = %key, principal = %principal.identity))]
    pub async fn start(&self, principal: &Principal, key: &str) -> Result<VpsRecord> {
        self.power_detached(principal, key, Power::Start).await
    }

    #[instrument(skip_all, fields(vps = %key, principal = %principal.identity))]
    pub async fn stop(&self, principal: &Principal, key: &str) -> Result<VpsRecord> {
        self.power_detached(principal, key, Power::Stop).await
    }

    #[instrument(skip_all, fields(vps = %key, principal = %principal.identity))]
    pub async fn restart(&self, principal: &Principal, key: &str) -> Result<VpsRecord> {
        self.power_detached(principal, key, Power::Restart).await
    }

    /// Replace the container of a VPS with a fresh one, keeping its metadata.
    #[instrument(skip_all, fields(vps = %key, principal = %principal.identity))]
    pub async fn reinstall(&self, principal: &Principal, key: &str) -> Result<VpsRecord> {
        let this = self.clone();
        let principal = principal.clone();
        let key = key.to_string();
        self.run_detached(async move { this.reinstall_inner(&principal, &key).await })
            .await
    }

    /// Remove the container, then the record. Returns the final snapshot with
    /// status `deleted`. Admin only.
    #[instrument(skip_all, fields(vps = %key, principal = %principal.identity))]
    pub async fn delete(&self, principal: &Principal, key: &str) -> Result<VpsRecord> {
        let this = self.clone();
        let principal = principal.clone();
        let key = key.to_string();
        self.run_detached(async move { this.delete_inner(&principal, &key).await })
            .await
    }

    /// Ask the in-container agent for a remote shell endpoint.
    #[instrument(skip_all, fields(vps = %key, principal = %principal.identity))]
    pub async fn open_session(&self, principal: &Principal, key: &str) -> Result<SessionOutcome> {
        let record = self.resolve(principal, key, Action::Ssh).await?;

        let handle = match (record.status, record.handle()) {
            (VpsStatus::Running, Some(handle)) => handle,
            _ => {
                return Err(VpsError::InvalidState(format!(
                    "VPS '{}' is not running",
                    record.name
                )))
            }
        };

        self.sessions.open(&handle).await
    }

    /// Align one record with what the engine reports. Returns the updated
    /// record, or `None` when nothing changed.
    #[instrument(skip_all, fields(vps = %name))]
    pub async fn reconcile(&self, name: &str) -> Result<Option<VpsRecord>> {
        let _guard = self.locks.acquire(name).await;

        let Some(record) = self.store.get_by_name(name).await? else {
            return Ok(None);
        };
        if !matches!(record.status, VpsStatus::Running | VpsStatus::Stopped) {
            return Ok(None);
        }
        let Some(handle) = record.handle() else {
            return Ok(None);
        };

        let observed = self.call("inspect", self.runtime.inspect(&handle)).await?;

        let update = match observed {
            None => {
                warn!(handle = %handle.short(), "container vanished, marking VPS as failed");
                RecordUpdate::lost()
            }
            Some(state) if VpsStatus::from(state) != record.status => {
                let status = VpsStatus::from(state);
                info!(
                    from = %record.status,
                    to = %status,
                    "container state changed outside the orchestrator"
                );
                RecordUpdate::status(status)
            }
            Some(_) => return Ok(None),
        };

        Ok(Some(self.store.update(name, update).await?))
    }

    /// Reconcile every record. Stops early when the engine is unreachable.
    pub async fn reconcile_all(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for record in self.store.list_all().await? {
            report.checked += 1;
            match self.reconcile(&record.name).await {
                Ok(Some(_)) => report.updated += 1,
                Ok(None) => {}
                Err(VpsError::RuntimeUnreachable(detail)) => {
                    warn!(
                        error = %detail,
                        "container engine unreachable, skipping remaining records"
                    );
                    report.failed += 1;
                    break;
                }
                Err(e) => {
                    error!(vps = %record.name, error = %e, "reconciliation failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn create_inner(
        &self,
        principal: &Principal,
        req: CreateVpsRequest,
    ) -> Result<VpsRecord> {
        self.check(principal, None, Action::Create, &req.name)?;
        validate_name(&req.name)?;
        validate_owner(&req.owner)?;

        let _guard = self.locks.acquire(&req.name).await;

        if self.store.get_by_name(&req.name).await?.is_some() {
            return Err(VpsError::Validation(format!(
                "a VPS named '{}' already exists",
                req.name
            )));
        }

        let image = self.ensure_image().await?;
        let handle = self.provision(&req.name, &req.support, &image).await?;

        match self
            .store
            .insert(
                &req.name,
                &req.owner,
                &req.support,
                Some(handle.as_str()),
                VpsStatus::Running,
            )
            .await
        {
            Ok(record) => {
                info!(
                    id = record.id,
                    handle = %handle.short(),
                    owner = %record.owner,
                    "VPS created"
                );
                Ok(record)
            }
            Err(e) => {
                self.discard(&handle).await;
                Err(e)
            }
        }
    }

    async fn power_detached(
        &self,
        principal: &Principal,
        key: &str,
        power: Power,
    ) -> Result<VpsRecord> {
        let this = self.clone();
        let principal = principal.clone();
        let key = key.to_string();
        self.run_detached(async move { this.power(&principal, &key, power).await })
            .await
    }

    async fn power(&self, principal: &Principal, key: &str, power: Power) -> Result<VpsRecord> {
        let action = power.action();
        let record = self.resolve(principal, key, action).await?;
        let _guard = self.locks.acquire(&record.name).await;
        let record = self.reload(&record.name, key).await?;

        let handle = record.handle().ok_or_else(|| {
            VpsError::InvalidState(format!(
                "VPS '{}' has no container, reinstall it first",
                record.name
            ))
        })?;

        let (outcome, status) = match power {
            Power::Start => (
                self.call("start", self.runtime.start(&handle)).await,
                VpsStatus::Running,
            ),
            Power::Stop => (
                self.call("stop", self.runtime.stop(&handle)).await,
                VpsStatus::Stopped,
            ),
            Power::Restart => (
                self.call("restart", self.runtime.restart(&handle)).await,
                VpsStatus::Running,
            ),
        };

        match outcome {
            Ok(()) => {
                let updated = self
                    .store
                    .update(&record.name, RecordUpdate::status(status))
                    .await?;
                info!(action = %action, status = %updated.status, "lifecycle action applied");
                Ok(updated)
            }
            Err(e) if e.is_not_found() => {
                warn!(handle = %handle.short(), "container is gone, marking VPS as failed");
                self.store
                    .update(&record.name, RecordUpdate::lost())
                    .await?;
                Err(VpsError::RuntimeFatal(format!(
                    "container of VPS '{}' no longer exists",
                    record.name
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reinstall_inner(&self, principal: &Principal, key: &str) -> Result<VpsRecord> {
        let record = self.resolve(principal, key, Action::Reinstall).await?;
        let _guard = self.locks.acquire(&record.name).await;
        let record = self.reload(&record.name, key).await?;

        // Build failures must not cost the VPS its current container.
        let image = self.ensure_image().await?;

        let old = record.handle();
        if let Some(old) = &old {
            match self.call("remove", self.runtime.remove(old, true)).await {
                Ok(()) => debug!(handle = %old.short(), "previous container removed"),
                Err(e) if e.is_not_found() => {
                    debug!(handle = %old.short(), "previous container already gone")
                }
                Err(e) => return Err(e.into()),
            }
        }

        let handle = match self.provision(&record.name, &record.support, &image).await {
            Ok(handle) => handle,
            Err(e) if old.is_none() => return Err(e),
            Err(e) => {
                error!(error = %e, "reinstall lost the previous container");
                self.store
                    .update(&record.name, RecordUpdate::lost())
                    .await?;
                return Err(VpsError::PartialFailure {
                    name: record.name,
                    detail: e.to_string(),
                });
            }
        };

        match self
            .store
            .update(
                &record.name,
                RecordUpdate::bound(VpsStatus::Running, handle.as_str()),
            )
            .await
        {
            Ok(updated) => {
                info!(handle = %handle.short(), "VPS reinstalled");
                Ok(updated)
            }
            Err(e) => {
                self.discard(&handle).await;
                if let Err(mark) = self.store.update(&record.name, RecordUpdate::lost()).await {
                    error!(error = %mark, "could not mark VPS as failed");
                }
                Err(e)
            }
        }
    }

    async fn delete_inner(&self, principal: &Principal, key: &str) -> Result<VpsRecord> {
        let record = self.resolve(principal, key, Action::Delete).await?;
        let _guard = self.locks.acquire(&record.name).await;
        let record = self.reload(&record.name, key).await?;

        if let Some(handle) = record.handle() {
            match self.call("remove", self.runtime.remove(&handle, true)).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(handle = %handle.short(), "container already removed")
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.store.delete(&record.name).await?;
        info!("VPS deleted");

        Ok(VpsRecord {
            status: VpsStatus::Deleted,
            runtime_handle: None,
            updated_at: Utc::now(),
            ..record
        })
    }

    /// Fetch `key` and authorize `action` on it.
    async fn resolve(&self, principal: &Principal, key: &str, action: Action) -> Result<VpsRecord> {
        let record = self.store.get(key).await?;
        self.check(principal, Some(&record), action, key)?;
        Ok(record)
    }

    /// Re-read a record once its lock is held.
    async fn reload(&self, name: &str, key: &str) -> Result<VpsRecord> {
        self.store
            .get_by_name(name)
            .await?
            .ok_or_else(|| VpsError::NotFound(key.to_string()))
    }

    fn check(
        &self,
        principal: &Principal,
        record: Option<&VpsRecord>,
        action: Action,
        key: &str,
    ) -> Result<()> {
        match authorize(principal, record, action) {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::NotOwner) => {
                warn!(
                    principal = %principal.identity,
                    vps = %key,
                    action = %action,
                    "access denied: not the owner"
                );
                Err(VpsError::NotFound(key.to_string()))
            }
            Decision::Deny(DenyReason::AdminOnly) => {
                warn!(
                    principal = %principal.identity,
                    vps = %key,
                    action = %action,
                    "access denied: admin only"
                );
                // Only create has no target record; any denial on a record
                // looks like a missing one.
                match record {
                    Some(_) => Err(VpsError::NotFound(key.to_string())),
                    None => Err(VpsError::Forbidden(format!(
                        "{action} requires the admin role"
                    ))),
                }
            }
        }
    }

    /// Build the base image on first use. Concurrent callers wait for the
    /// same build; a failed build is retried by the next caller.
    async fn ensure_image(&self) -> Result<ImageRef> {
        let image = self
            .image
            .get_or_try_init(|| async {
                info!(tag = %self.config.image.tag, "ensuring base image");
                self.call_with(
                    self.config.build_timeout,
                    "image build",
                    self.runtime.ensure_image(&self.config.image),
                )
                .await
            })
            .await?;

        Ok(image.clone())
    }

    /// Create and start a container named `name`. Nothing is left behind on
    /// failure, and a container that already holds the name is never touched.
    async fn provision(
        &self,
        name: &str,
        support: &str,
        image: &ImageRef,
    ) -> Result<RuntimeHandle> {
        let spec = ContainerSpec {
            image: image.clone(),
            name: name.to_string(),
            env: vec![(SUPPORT_ENV_VAR.to_string(), support.to_string())],
            limits: self.config.limits,
            restart_policy: self.config.restart_policy,
            tty: true,
        };

        // Whatever holds the name now is not ours, so a later cleanup by
        // name can only ever find the container this call created.
        if self.call("lookup", self.runtime.lookup(name)).await?.is_some() {
            return Err(RuntimeError::NameConflict(name.to_string()).into());
        }

        let handle = match self.call("create", self.runtime.create(&spec)).await {
            Ok(handle) => handle,
            Err(e) => {
                // The engine may still have created it after we gave up.
                if e.is_transient() {
                    self.discard_by_name(name).await;
                }
                return Err(e.into());
            }
        };

        if let Err(e) = self.call("start", self.runtime.start(&handle)).await {
            self.discard(&handle).await;
            return Err(e.into());
        }

        Ok(handle)
    }

    /// Force-remove a container this orchestrator no longer wants.
    async fn discard(&self, handle: &RuntimeHandle) {
        match self.call("remove", self.runtime.remove(handle, true)).await {
            Ok(()) => debug!(handle = %handle.short(), "discarded container"),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                error!(
                    handle = %handle.short(),
                    error = %e,
                    "failed to discard container, it may be orphaned"
                )
            }
        }
    }

    async fn discard_by_name(&self, name: &str) {
        match self.call("lookup", self.runtime.lookup(name)).await {
            Ok(Some(handle)) => self.discard(&handle).await,
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "could not check for a container left by a failed create")
            }
        }
    }

    async fn call<T, F>(&self, op: &str, fut: F) -> std::result::Result<T, RuntimeError>
    where
        F: Future<Output = vps_runtime::Result<T>>,
    {
        self.call_with(self.config.call_timeout, op, fut).await
    }

    async fn call_with<T, F>(
        &self,
        timeout: Duration,
        op: &str,
        fut: F,
    ) -> std::result::Result<T, RuntimeError>
    where
        F: Future<Output = vps_runtime::Result<T>>,
    {
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::Unreachable(format!(
                "{op} did not complete within {timeout:?}"
            ))),
        }
    }

    /// Run `work` on its own task and wait for it.
    async fn run_detached<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(work.in_current_span())
            .await
            .map_err(|e| VpsError::Internal(format!("lifecycle task failed: {e}")))?
    }
}

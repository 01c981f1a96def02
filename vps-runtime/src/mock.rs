//! In-memory container engine for tests.
//!
//! Behaves like a well-mannered Docker daemon (idempotent start/stop, name
//! conflicts, not-found on missing handles) and lets tests inject failures,
//! latency, scripted exec output and out-of-band changes.

use crate::{
    container::{
        ContainerSpec, ImageRef, ImageSpec, ResourceLimits, RestartPolicy, RuntimeHandle,
        RuntimeState,
    },
    error::{Result, RuntimeError},
    ContainerRuntime, ExecStream,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    EnsureImage,
    Create,
    Start,
    Stop,
    Restart,
    Remove,
    Exec,
    Inspect,
    Lookup,
}

/// A failure to return from the next call of an operation.
#[derive(Debug, Clone)]
pub enum MockFailure {
    NotFound,
    Unreachable,
    Fatal(String),
}

impl MockFailure {
    fn into_error(self, op: MockOp, target: &str) -> RuntimeError {
        match self {
            Self::NotFound => RuntimeError::NotFound(target.to_string()),
            Self::Unreachable => {
                RuntimeError::Unreachable(format!("mock engine unreachable during {op:?}"))
            }
            Self::Fatal(detail) => match op {
                MockOp::EnsureImage => RuntimeError::BuildFailed {
                    image: target.to_string(),
                    detail,
                },
                MockOp::Create => RuntimeError::CreateFailed {
                    name: target.to_string(),
                    detail,
                },
                MockOp::Exec => RuntimeError::ExecFailed {
                    target: target.to_string(),
                    detail,
                },
                _ => RuntimeError::CommandFailed(detail),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockContainer {
    pub handle: RuntimeHandle,
    pub name: String,
    pub image: String,
    pub env: Vec<(String, String)>,
    pub limits: ResourceLimits,
    pub restart_policy: RestartPolicy,
    pub state: RuntimeState,
}

#[derive(Default)]
struct MockState {
    containers: HashMap<RuntimeHandle, MockContainer>,
    images: HashSet<String>,
    builds: usize,
    next_id: u64,
    failures: HashMap<MockOp, VecDeque<MockFailure>>,
    exec_outputs: HashMap<String, VecDeque<Vec<String>>>,
    exec_calls: Vec<(String, Vec<String>)>,
    latency: Option<Duration>,
    lost_create_replies: usize,
}

impl MockState {
    fn take_failure(&mut self, op: MockOp) -> Option<MockFailure> {
        self.failures.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn container_mut(&mut self, handle: &RuntimeHandle) -> Result<&mut MockContainer> {
        self.containers
            .get_mut(handle)
            .ok_or_else(|| RuntimeError::NotFound(handle.to_string()))
    }
}

#[derive(Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait the configured latency, then fail if a failure is queued for `op`.
    async fn enter(&self, op: MockOp, target: &str) -> Result<()> {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.lock().take_failure(op) {
            Some(failure) => Err(failure.into_error(op, target)),
            None => Ok(()),
        }
    }

    /// Make the next call of `op` fail. Calls queue up in order.
    pub fn fail_next(&self, op: MockOp, failure: MockFailure) {
        self.lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(failure);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Queue the output of the next exec inside the container named `name`.
    pub fn script_exec<I, S>(&self, name: &str, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock()
            .exec_outputs
            .entry(name.to_string())
            .or_default()
            .push_back(chunks.into_iter().map(Into::into).collect());
    }

    /// Let the next create succeed in the engine but report `Unreachable`,
    /// as when the daemon answers after the caller gave up.
    pub fn lose_next_create_reply(&self) {
        self.lock().lost_create_replies += 1;
    }

    /// Remove a container behind the orchestrator's back.
    pub fn remove_externally(&self, name: &str) -> bool {
        let mut state = self.lock();
        let before = state.containers.len();
        state.containers.retain(|_, c| c.name != name);
        state.containers.len() != before
    }

    /// Change a container's state behind the orchestrator's back.
    pub fn set_state_externally(&self, name: &str, new_state: RuntimeState) -> bool {
        let mut state = self.lock();
        match state.containers.values_mut().find(|c| c.name == name) {
            Some(container) => {
                container.state = new_state;
                true
            }
            None => false,
        }
    }

    pub fn container(&self, handle: &RuntimeHandle) -> Option<MockContainer> {
        self.lock().containers.get(handle).cloned()
    }

    pub fn container_by_name(&self, name: &str) -> Option<MockContainer> {
        self.lock()
            .containers
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn container_count(&self) -> usize {
        self.lock().containers.len()
    }

    pub fn is_running(&self, handle: &RuntimeHandle) -> bool {
        self.container(handle)
            .is_some_and(|c| c.state == RuntimeState::Running)
    }

    /// Number of image builds performed.
    pub fn build_count(&self) -> usize {
        self.lock().builds
    }

    /// Commands passed to `exec`, with the target container name.
    pub fn exec_calls(&self) -> Vec<(String, Vec<String>)> {
        self.lock().exec_calls.clone()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn ensure_image(&self, image: &ImageSpec) -> Result<ImageRef> {
        self.enter(MockOp::EnsureImage, &image.tag).await?;
        let mut state = self.lock();
        if state.images.insert(image.tag.clone()) {
            state.builds += 1;
        }
        Ok(ImageRef::new(&image.tag))
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<RuntimeHandle> {
        self.enter(MockOp::Create, &spec.name).await?;
        let mut state = self.lock();

        if !state.images.contains(spec.image.as_str()) {
            return Err(RuntimeError::CreateFailed {
                name: spec.name.clone(),
                detail: format!("no such image: {}", spec.image),
            });
        }
        if state.containers.values().any(|c| c.name == spec.name) {
            return Err(RuntimeError::NameConflict(spec.name.clone()));
        }

        state.next_id += 1;
        let handle = RuntimeHandle::new(format!("{:064x}", state.next_id));
        state.containers.insert(
            handle.clone(),
            MockContainer {
                handle: handle.clone(),
                name: spec.name.clone(),
                image: spec.image.to_string(),
                env: spec.env.clone(),
                limits: spec.limits,
                restart_policy: spec.restart_policy,
                state: RuntimeState::Stopped,
            },
        );

        if state.lost_create_replies > 0 {
            state.lost_create_replies -= 1;
            return Err(RuntimeError::Unreachable(format!(
                "mock engine dropped the reply to create {}",
                spec.name
            )));
        }
        Ok(handle)
    }

    async fn start(&self, handle: &RuntimeHandle) -> Result<()> {
        self.enter(MockOp::Start, handle.as_str()).await?;
        self.lock().container_mut(handle)?.state = RuntimeState::Running;
        Ok(())
    }

    async fn stop(&self, handle: &RuntimeHandle) -> Result<()> {
        self.enter(MockOp::Stop, handle.as_str()).await?;
        self.lock().container_mut(handle)?.state = RuntimeState::Stopped;
        Ok(())
    }

    async fn restart(&self, handle: &RuntimeHandle) -> Result<()> {
        self.enter(MockOp::Restart, handle.as_str()).await?;
        self.lock().container_mut(handle)?.state = RuntimeState::Running;
        Ok(())
    }

    async fn remove(&self, handle: &RuntimeHandle, force: bool) -> Result<()> {
        self.enter(MockOp::Remove, handle.as_str()).await?;
        let mut state = self.lock();
        let container = state.container_mut(handle)?;
        if container.state == RuntimeState::Running && !force {
            return Err(RuntimeError::CommandFailed(format!(
                "cannot remove running container {handle} without force"
            )));
        }
        state.containers.remove(handle);
        Ok(())
    }

    async fn exec(&self, handle: &RuntimeHandle, command: &[String]) -> Result<ExecStream> {
        self.enter(MockOp::Exec, handle.as_str()).await?;
        let mut state = self.lock();

        let container = state.container_mut(handle)?;
        if container.state != RuntimeState::Running {
            return Err(RuntimeError::ExecFailed {
                target: handle.to_string(),
                detail: format!("container {} is not running", container.name),
            });
        }
        let name = container.name.clone();

        state.exec_calls.push((name.clone(), command.to_vec()));
        let chunks = state
            .exec_outputs
            .get_mut(&name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();

        Ok(stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c)))).boxed())
    }

    async fn inspect(&self, handle: &RuntimeHandle) -> Result<Option<RuntimeState>> {
        self.enter(MockOp::Inspect, handle.as_str()).await?;
        Ok(self.lock().containers.get(handle).map(|c| c.state))
    }

    async fn lookup(&self, name: &str) -> Result<Option<RuntimeHandle>> {
        self.enter(MockOp::Lookup, name).await?;
        Ok(self
            .lock()
            .containers
            .values()
            .find(|c| c.name == name)
            .map(|c| c.handle.clone()))
    }
}

//! Container runtime abstraction for VPS instances.
//!
//! This crate defines the capability interface the orchestrator drives
//! (image, create, start, stop, restart, remove, exec) together with the
//! Docker CLI adapter and, behind the `test-helpers` feature, an in-memory
//! engine for tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

pub mod command;
pub mod container;
pub mod error;
pub mod resources;

#[cfg(feature = "docker")]
pub mod docker;

#[cfg(feature = "test-helpers")]
pub mod mock;

pub use container::{
    BuildFile, ContainerSpec, ImageRef, ImageSpec, ResourceLimits, RestartPolicy, RuntimeHandle,
    RuntimeState,
};
pub use error::{Result, RuntimeError};

#[cfg(feature = "docker")]
pub use docker::DockerRuntime;

/// Raw output of a command executed inside a container. Ends with an error
/// item if the command itself failed.
pub type ExecStream = BoxStream<'static, Result<Bytes>>;

/// The lifecycle contract of a container engine.
///
/// Operations are idempotent where the engine allows it: starting a running
/// container or stopping a stopped one succeeds without effect. Failures are
/// classified, never swallowed.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Name of the engine (e.g. "docker", "mock").
    fn name(&self) -> &'static str;

    /// Build the image if it does not exist yet.
    async fn ensure_image(&self, image: &ImageSpec) -> Result<ImageRef>;

    /// Create (but do not start) a container.
    async fn create(&self, spec: &ContainerSpec) -> Result<RuntimeHandle>;

    async fn start(&self, handle: &RuntimeHandle) -> Result<()>;

    async fn stop(&self, handle: &RuntimeHandle) -> Result<()>;

    async fn restart(&self, handle: &RuntimeHandle) -> Result<()>;

    /// Remove a container. With `force`, a running container is killed first.
    async fn remove(&self, handle: &RuntimeHandle, force: bool) -> Result<()>;

    /// Execute a command inside a running container and stream its stdout.
    async fn exec(&self, handle: &RuntimeHandle, command: &[String]) -> Result<ExecStream>;

    /// Observe a container's state. `None` when the container does not exist.
    async fn inspect(&self, handle: &RuntimeHandle) -> Result<Option<RuntimeState>>;

    /// Find a container by its exact name.
    async fn lookup(&self, name: &str) -> Result<Option<RuntimeHandle>>;
}

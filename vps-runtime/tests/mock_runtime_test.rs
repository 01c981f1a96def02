//! Behavioural tests for the in-memory engine used by the orchestrator tests.

use futures_util::StreamExt;
use vps_runtime::mock::{MockFailure, MockOp, MockRuntime};
use vps_runtime::resources::{vps_base_image, DEFAULT_IMAGE_TAG};
use vps_runtime::{
    ContainerRuntime, ContainerSpec, ImageRef, ResourceLimits, RestartPolicy, RuntimeError,
    RuntimeState,
};

fn spec(name: &str) -> ContainerSpec {
    ContainerSpec {
        image: ImageRef::new(DEFAULT_IMAGE_TAG),
        name: name.to_string(),
        env: vec![("SUPPORT_NUMBER".to_string(), "42".to_string())],
        limits: ResourceLimits::default(),
        restart_policy: RestartPolicy::UnlessStopped,
        tty: true,
    }
}

async fn runtime_with_image() -> MockRuntime {
    let runtime = MockRuntime::new();
    runtime
        .ensure_image(&vps_base_image(DEFAULT_IMAGE_TAG))
        .await
        .expect("image build");
    runtime
}

#[tokio::test]
async fn test_ensure_image_builds_once() {
    let runtime = MockRuntime::new();
    let image = vps_base_image(DEFAULT_IMAGE_TAG);

    runtime.ensure_image(&image).await.unwrap();
    runtime.ensure_image(&image).await.unwrap();

    assert_eq!(runtime.build_count(), 1);
}

#[tokio::test]
async fn test_lifecycle_is_idempotent() {
    let runtime = runtime_with_image().await;
    let handle = runtime.create(&spec("alpha")).await.unwrap();

    assert_eq!(
        runtime.inspect(&handle).await.unwrap(),
        Some(RuntimeState::Stopped)
    );

    runtime.start(&handle).await.unwrap();
    runtime.start(&handle).await.unwrap();
    assert!(runtime.is_running(&handle));

    runtime.stop(&handle).await.unwrap();
    runtime.stop(&handle).await.unwrap();
    assert!(!runtime.is_running(&handle));

    runtime.remove(&handle, true).await.unwrap();
    assert!(runtime.remove(&handle, true).await.unwrap_err().is_not_found());
    assert_eq!(runtime.inspect(&handle).await.unwrap(), None);
}

#[tokio::test]
async fn test_name_conflict_and_lookup() {
    let runtime = runtime_with_image().await;
    let handle = runtime.create(&spec("alpha")).await.unwrap();

    let err = runtime.create(&spec("alpha")).await.unwrap_err();
    assert!(matches!(err, RuntimeError::NameConflict(_)));

    assert_eq!(runtime.lookup("alpha").await.unwrap(), Some(handle));
    assert_eq!(runtime.lookup("beta").await.unwrap(), None);
}

#[tokio::test]
async fn test_injected_failure_applies_once() {
    let runtime = runtime_with_image().await;
    runtime.fail_next(MockOp::Create, MockFailure::Unreachable);

    let err = runtime.create(&spec("alpha")).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(runtime.container_count(), 0);

    runtime.create(&spec("alpha")).await.unwrap();
    assert_eq!(runtime.container_count(), 1);
}

#[tokio::test]
async fn test_lost_create_reply_still_creates() {
    let runtime = runtime_with_image().await;
    runtime.lose_next_create_reply();

    let err = runtime.create(&spec("alpha")).await.unwrap_err();
    assert!(err.is_transient());
    assert!(runtime.lookup("alpha").await.unwrap().is_some());

    runtime.create(&spec("beta")).await.unwrap();
    assert_eq!(runtime.container_count(), 2);
}

#[tokio::test]
async fn test_exec_streams_scripted_output() {
    let runtime = runtime_with_image().await;
    let handle = runtime.create(&spec("alpha")).await.unwrap();

    let err = match runtime.exec(&handle, &["true".to_string()]).await {
        Err(err) => err,
        Ok(_) => panic!("exec on a stopped container should fail"),
    };
    assert!(matches!(err, RuntimeError::ExecFailed { .. }));

    runtime.start(&handle).await.unwrap();
    runtime.script_exec("alpha", ["ssh abc", "@lon1.tmate.io\n"]);

    let chunks: Vec<_> = runtime
        .exec(&handle, &["tmate".to_string()])
        .await
        .unwrap()
        .collect()
        .await;
    let output: String = chunks
        .into_iter()
        .map(|c| String::from_utf8(c.unwrap().to_vec()).unwrap())
        .collect();
    assert_eq!(output, "ssh abc@lon1.tmate.io\n");
    assert_eq!(runtime.exec_calls().len(), 1);
}

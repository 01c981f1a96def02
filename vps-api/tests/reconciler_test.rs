//! Tests for the reconciler background task

mod common;

use common::{fixture_vps, TestClient};
use std::time::Duration;
use vps_api::reconciler::reconcile_records;
use vps_api::start_reconciler_task;
use vps_orchestrator::{Principal, VpsStatus};
use vps_runtime::RuntimeState;

#[tokio::test]
async fn test_reconcile_records_reports_changes() {
    let client = TestClient::new().await;
    fixture_vps(&client.orchestrator, "alpha", "bob").await;
    fixture_vps(&client.orchestrator, "beta", "bob").await;

    client.runtime.remove_externally("alpha");

    let report = reconcile_records(&client.orchestrator).await.unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.updated, 1);

    let alpha = client
        .orchestrator
        .get(&Principal::admin("root"), "alpha")
        .await
        .unwrap();
    assert_eq!(alpha.status, VpsStatus::Error);
}

#[tokio::test]
async fn test_reconciler_task_syncs_in_background() {
    let client = TestClient::new().await;
    fixture_vps(&client.orchestrator, "alpha", "bob").await;
    client
        .runtime
        .set_state_externally("alpha", RuntimeState::Stopped);

    let task = tokio::spawn(start_reconciler_task(client.orchestrator.clone(), 1));

    let admin = Principal::admin("root");
    let mut status = VpsStatus::Running;
    for _ in 0..50 {
        status = client.orchestrator.get(&admin, "alpha").await.unwrap().status;
        if status == VpsStatus::Stopped {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    task.abort();

    assert_eq!(status, VpsStatus::Stopped);
}

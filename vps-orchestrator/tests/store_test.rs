//! Record store tests against an in-memory database.

use vps_orchestrator::test_utils::create_test_db;
use vps_orchestrator::{ErrorKind, Principal, RecordUpdate, VpsStatus, VpsStore};

#[tokio::test]
async fn test_insert_and_get() {
    let store = VpsStore::new(create_test_db().await);

    let record = store
        .insert("alpha", "bob", "+1-555", Some("abc123"), VpsStatus::Running)
        .await
        .expect("Failed to insert record");

    assert!(record.id > 0);
    assert_eq!(record.name, "alpha");
    assert_eq!(record.runtime_handle.as_deref(), Some("abc123"));

    let by_name = store.get("alpha").await.unwrap();
    let by_id = store.get(&record.id.to_string()).await.unwrap();
    assert_eq!(by_name, record);
    assert_eq!(by_id, record);
}

#[tokio::test]
async fn test_duplicate_name_is_validation_error() {
    let store = VpsStore::new(create_test_db().await);
    store
        .insert("alpha", "bob", "", Some("abc"), VpsStatus::Running)
        .await
        .unwrap();

    let err = store
        .insert("alpha", "carol", "", Some("def"), VpsStatus::Running)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_missing_record() {
    let store = VpsStore::new(create_test_db().await);

    assert_eq!(store.get("ghost").await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(store.get("17").await.unwrap_err().kind(), ErrorKind::NotFound);
    assert!(store.get_by_name("ghost").await.unwrap().is_none());
    assert_eq!(
        store
            .update("ghost", RecordUpdate::status(VpsStatus::Stopped))
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
    assert_eq!(store.delete("ghost").await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_partial_updates() {
    let store = VpsStore::new(create_test_db().await);
    store
        .insert("alpha", "bob", "", Some("abc"), VpsStatus::Running)
        .await
        .unwrap();

    let stopped = store
        .update("alpha", RecordUpdate::status(VpsStatus::Stopped))
        .await
        .unwrap();
    assert_eq!(stopped.status, VpsStatus::Stopped);
    assert_eq!(stopped.runtime_handle.as_deref(), Some("abc"));

    let rebound = store
        .update("alpha", RecordUpdate::bound(VpsStatus::Running, "def"))
        .await
        .unwrap();
    assert_eq!(rebound.status, VpsStatus::Running);
    assert_eq!(rebound.runtime_handle.as_deref(), Some("def"));

    let lost = store.update("alpha", RecordUpdate::lost()).await.unwrap();
    assert_eq!(lost.status, VpsStatus::Error);
    assert_eq!(lost.runtime_handle, None);
}

#[tokio::test]
async fn test_running_record_requires_handle() {
    let store = VpsStore::new(create_test_db().await);
    store
        .insert("alpha", "bob", "", None, VpsStatus::Error)
        .await
        .unwrap();

    let err = store
        .update("alpha", RecordUpdate::status(VpsStatus::Running))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    let record = store.get("alpha").await.unwrap();
    assert_eq!(record.status, VpsStatus::Error);
}

#[tokio::test]
async fn test_list_for_principal() {
    let store = VpsStore::new(create_test_db().await);
    for (name, owner) in [("alpha", "bob"), ("beta", "carol"), ("gamma", "bob")] {
        store
            .insert(name, owner, "", Some(name), VpsStatus::Running)
            .await
            .unwrap();
    }

    let admin = store.list_for(&Principal::admin("root")).await.unwrap();
    assert_eq!(admin.len(), 3);

    let bob: Vec<_> = store
        .list_for(&Principal::user("bob"))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(bob, ["alpha", "gamma"]);

    // Ownership is by identity, not by role.
    let root_as_user = store.list_for(&Principal::user("root")).await.unwrap();
    assert!(root_as_user.is_empty());
}

#[tokio::test]
async fn test_delete() {
    let store = VpsStore::new(create_test_db().await);
    store
        .insert("alpha", "bob", "", Some("abc"), VpsStatus::Running)
        .await
        .unwrap();

    store.delete("alpha").await.unwrap();
    assert!(store.get_by_name("alpha").await.unwrap().is_none());
    assert!(store.list_all().await.unwrap().is_empty());
}

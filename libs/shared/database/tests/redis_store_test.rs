//! Needs a reachable Redis: `REDIS_TEST_URL=redis://localhost:6379 cargo test -- --ignored`

use serde_json::json;
use uuid::Uuid;

use shared_database::{RecordStore, RedisRecordStore};

async fn test_store() -> RedisRecordStore {
    let url = std::env::var("REDIS_TEST_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let namespace = format!("test_{}", Uuid::new_v4().simple());
    RedisRecordStore::new(&url, &namespace)
        .await
        .expect("Redis must be reachable for ignored tests")
}

#[tokio::test]
#[ignore]
async fn redis_put_if_absent_only_writes_once() {
    let store = test_store().await;
    assert!(store.put_if_absent("slots/d1/2025-06-01/09:00", json!("A001")).await.unwrap());
    assert!(!store.put_if_absent("slots/d1/2025-06-01/09:00", json!("A002")).await.unwrap());
    assert_eq!(
        store.get("slots/d1/2025-06-01/09:00").await.unwrap(),
        Some(json!("A001"))
    );
}

#[tokio::test]
#[ignore]
async fn redis_compare_and_swap_and_list() {
    let store = test_store().await;
    store.put("requests/REQ-1", json!({ "status": "pending" })).await.unwrap();
    store.put("requests/REQ-2", json!({ "status": "accepted" })).await.unwrap();

    let swapped = store
        .compare_and_swap(
            "requests/REQ-1",
            Some(json!({ "status": "pending" })),
            Some(json!({ "status": "rejected" })),
        )
        .await
        .unwrap();
    assert!(swapped);

    let stale = store
        .compare_and_swap("requests/REQ-1", Some(json!({ "status": "pending" })), None)
        .await
        .unwrap();
    assert!(!stale);

    let rows = store.list("requests/").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, "requests/REQ-1");
    assert_eq!(rows[0].1["status"], "rejected");
}

#[tokio::test]
#[ignore]
async fn redis_sequence_is_monotonic() {
    let store = test_store().await;
    let first = store.next_sequence("appointments").await.unwrap();
    let second = store.next_sequence("appointments").await.unwrap();
    assert_eq!(second, first + 1);
}

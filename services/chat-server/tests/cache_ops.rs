//! Cache coordinator operations against real Redis.
//!
//! Requires Docker; run with `cargo test -- --ignored`.

use chat_server::cache::{Cache, CacheError, keys};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::Redis;

async fn test_cache() -> (testcontainers::ContainerAsync<Redis>, Cache) {
    let container = Redis::default().start().await.unwrap();
    let port = container.get_host_port_ipv4(6379).await.unwrap();
    let cache = Cache::connect(&format!("redis://127.0.0.1:{port}"))
        .await
        .unwrap();
    (container, cache)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn get_distinguishes_absent_from_present() {
    let (_container, cache) = test_cache().await;

    assert_eq!(cache.get("missing").await.unwrap(), None);

    cache.set_with_ttl("present", "").await.unwrap();
    assert_eq!(cache.get("present").await.unwrap(), Some(String::new()));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn append_only_touches_existing_lists() {
    let (_container, cache) = test_cache().await;
    let key = keys::direct_history("U001", "U002");
    let item = serde_json::json!({"content": "hi"});

    // Absent key: nothing to append to, nothing created.
    assert!(!cache.append_list_item(&key, &item).await.unwrap());
    assert_eq!(cache.get(&key).await.unwrap(), None);

    cache.set_with_ttl(&key, "[]").await.unwrap();
    assert!(cache.append_list_item(&key, &item).await.unwrap());
    let list: Vec<serde_json::Value> =
        serde_json::from_str(&cache.get(&key).await.unwrap().unwrap()).unwrap();
    assert_eq!(list, vec![item]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn single_prefix_lookup_rejects_ambiguity() {
    let (_container, cache) = test_cache().await;
    let prefix = keys::open_session_prefix("U001", "U002");

    assert_eq!(cache.single_key_with_prefix(&prefix).await.unwrap(), None);

    let only = keys::open_session("U001", "U002", "S001");
    cache.set_with_ttl(&only, "S001").await.unwrap();
    assert_eq!(
        cache.single_key_with_prefix(&prefix).await.unwrap(),
        Some(only)
    );

    cache
        .set_with_ttl(&keys::open_session("U001", "U002", "S002"), "S002")
        .await
        .unwrap();
    assert!(matches!(
        cache.single_key_with_prefix(&prefix).await,
        Err(CacheError::Ambiguous { matches: 2, .. })
    ));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn targeted_deletes_and_full_flush() {
    let (_container, cache) = test_cache().await;
    for key in [
        "session_list_U001",
        "session_list_U002",
        "group_session_list_U001",
        "session_U001_U002_S001",
    ] {
        cache.set_with_ttl(key, "[]").await.unwrap();
    }

    cache.delete_exact("session_list_U002").await.unwrap();
    assert_eq!(cache.get("session_list_U002").await.unwrap(), None);

    cache.delete_prefix("group_session_list_").await.unwrap();
    assert_eq!(cache.get("group_session_list_U001").await.unwrap(), None);

    cache.delete_suffix("_S001").await.unwrap();
    assert_eq!(cache.get("session_U001_U002_S001").await.unwrap(), None);

    assert!(cache.get("session_list_U001").await.unwrap().is_some());
    cache.delete_all().await.unwrap();
    assert_eq!(cache.get("session_list_U001").await.unwrap(), None);
}

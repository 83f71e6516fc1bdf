mod common;

use common::{doc, memory_config};
use serde_json::json;
use sessiondb::{Database, DbError, FindOptions, Query, SortOrder};

#[tokio::test]
async fn facade_connects_lazily_on_first_use() {
    let db = Database::new(memory_config());
    assert!(!db.is_connected().await);

    // No explicit init: the first operation connects.
    let found = db.find_one("players", &Query::by_id("x")).await.unwrap();
    assert!(found.is_none());
    assert!(db.is_connected().await);
}

#[tokio::test]
async fn init_is_idempotent_while_connected() {
    let db = Database::new(memory_config());
    db.init().await.unwrap();
    db.create("players", doc(json!({"_id": "x", "v": 1})))
        .await
        .unwrap();
    // A second init must not rebuild the engine and lose state.
    db.init().await.unwrap();
    let found = db.find_one("players", &Query::by_id("x")).await.unwrap();
    assert!(found.is_some());
}

#[tokio::test]
async fn disconnect_drops_the_engine() {
    let db = Database::new(memory_config());
    db.create("players", doc(json!({"_id": "x"})))
        .await
        .unwrap();
    db.disconnect().await.unwrap();
    assert!(!db.is_connected().await);

    // The next operation reconnects against a freshly built engine; the
    // transient in-memory data is gone.
    let found = db.find_one("players", &Query::by_id("x")).await.unwrap();
    assert!(found.is_none());
    assert!(db.is_connected().await);
}

#[tokio::test]
async fn unknown_engine_fails_and_stays_retryable() {
    let mut config = memory_config();
    config.storage.engine = "mongo".to_string();
    let db = Database::new(config);

    let err = db.init().await.unwrap_err();
    assert!(matches!(err, DbError::UnknownEngine(_)));
    assert!(!db.is_connected().await);

    // The facade is left clean: a retry fails the same way, not worse.
    let err = db.init().await.unwrap_err();
    assert!(matches!(err, DbError::UnknownEngine(_)));
    assert!(!db.is_connected().await);
}

#[tokio::test]
async fn find_applies_sort_and_limit() {
    let db = Database::new(memory_config());
    for (name, score) in [("alice", 10), ("bob", 30), ("carol", 20)] {
        db.create("players", doc(json!({"name": name, "score": score})))
            .await
            .unwrap();
    }

    let top = db
        .find(
            "players",
            &Query::new(),
            &FindOptions::default()
                .sort("score", SortOrder::Descending)
                .limit(2),
        )
        .await
        .unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0]["name"], json!("bob"));
    assert_eq!(top[1]["name"], json!("carol"));
}

#[tokio::test]
async fn cache_stats_follow_the_configuration() {
    let db = Database::new(memory_config());
    db.init().await.unwrap();
    assert!(db.cache_stats().await.is_some());

    let mut config = memory_config();
    config.cache.enabled = false;
    let bare = Database::new(config);
    bare.init().await.unwrap();
    assert!(bare.cache_stats().await.is_none());
}

#[tokio::test]
async fn cached_facade_reports_traffic() {
    let db = Database::new(memory_config());
    db.create("rooms", doc(json!({"_id": "lobby", "open": true})))
        .await
        .unwrap();
    db.find_one("rooms", &Query::by_id("lobby")).await.unwrap();
    db.find_one("rooms", &Query::by_id("lobby")).await.unwrap();

    let stats = db.cache_stats().await.expect("cached engine");
    let rooms = &stats.collections["rooms"];
    assert_eq!(rooms.misses, 1);
    assert_eq!(rooms.hits, 1);
    assert_eq!(rooms.total_writes, 1);
    assert!(rooms.total_write_bytes > 0);
    assert!(!rooms.time_stats.intervals.is_empty());
    assert_eq!(stats.overall.entries, 1);
}

#[tokio::test]
async fn facade_exposes_index_capability() {
    let db = Database::new(memory_config());
    db.init().await.unwrap();
    // The memory engine has no explicit indexes, even behind the cache.
    assert!(!db.supports_explicit_indexes().await);
    let err = db
        .create_index("players", &["score".to_string()], &Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotImplemented("create_index")));
}

use std::time::Duration;

use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use survey_contracts::Answers;
use survey_store::{NewResponse, ResponseStore, StoreError};
use tempfile::TempDir;

fn answers(value: Value) -> Answers {
    match value {
        Value::Object(map) => map,
        _ => panic!("fixture must be an object"),
    }
}

async fn open_store(dir: &TempDir) -> ResponseStore {
    ResponseStore::open_and_migrate(&dir.path().join("responses.db"), Duration::from_secs(2))
        .await
        .expect("store should open")
}

async fn insert(store: &ResponseStore, metadata: &str, answers: &Answers) -> i64 {
    store
        .insert(NewResponse {
            created_at: "2026-03-01T10:00:00.000Z",
            source: "web",
            metadata,
            answers,
            email: "",
            ip: "127.0.0.1",
        })
        .await
        .expect("insert should succeed")
}

#[tokio::test]
async fn insert_assigns_increasing_ids_and_round_trips_fields() {
    let dir = TempDir::new().expect("tempdir should be created");
    let store = open_store(&dir).await;

    let first_answers = answers(serde_json::json!({"Q2": "second", "Q1": "first\nline"}));
    let first = store
        .insert(NewResponse {
            created_at: "2026-03-01T10:00:00.000Z",
            source: "kiosk",
            metadata: "Ana, 1 March",
            answers: &first_answers,
            email: "ana@example.com",
            ip: "10.0.0.5",
        })
        .await
        .expect("insert should succeed");
    let second = insert(&store, "", &answers(serde_json::json!({"Q": "x"}))).await;

    assert!(second > first, "ids must increase: {} then {}", first, second);

    let stored = store
        .get_by_id(first)
        .await
        .expect("get should succeed")
        .expect("row should exist");
    assert_eq!(stored.id, first);
    assert_eq!(stored.created_at, "2026-03-01T10:00:00.000Z");
    assert_eq!(stored.source, "kiosk");
    assert_eq!(stored.metadata, "Ana, 1 March");
    assert_eq!(stored.email, "ana@example.com");
    assert_eq!(stored.ip, "10.0.0.5");
    assert_eq!(stored.answers, first_answers);
    assert_eq!(stored.answers.keys().collect::<Vec<_>>(), vec!["Q2", "Q1"]);
}

#[tokio::test]
async fn get_by_id_returns_none_for_unknown_id() {
    let dir = TempDir::new().expect("tempdir should be created");
    let store = open_store(&dir).await;
    insert(&store, "", &answers(serde_json::json!({"Q": "a"}))).await;

    let missing = store.get_by_id(999_999).await.expect("get should succeed");
    assert!(missing.is_none());
}

#[tokio::test]
async fn list_all_is_newest_first_and_filters_literally() {
    let dir = TempDir::new().expect("tempdir should be created");
    let store = open_store(&dir).await;

    let a = insert(&store, "foo in metadata", &answers(serde_json::json!({"Q": "a"}))).await;
    let b = insert(&store, "", &answers(serde_json::json!({"Q": "has foo inside"}))).await;
    let c = insert(&store, "Foo uppercase", &answers(serde_json::json!({"Q": "c"}))).await;
    let d = insert(&store, "100% sure", &answers(serde_json::json!({"Q": "d_e"}))).await;

    let all = store.list_all(None).await.expect("list should succeed");
    assert_eq!(
        all.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![d, c, b, a]
    );

    let empty_filter = store.list_all(Some("")).await.expect("list should succeed");
    assert_eq!(empty_filter.len(), 4);

    let foo = store.list_all(Some("foo")).await.expect("list should succeed");
    assert_eq!(foo.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b, a]);

    let percent = store.list_all(Some("0%")).await.expect("list should succeed");
    assert_eq!(percent.iter().map(|r| r.id).collect::<Vec<_>>(), vec![d]);

    let underscore = store.list_all(Some("d_e")).await.expect("list should succeed");
    assert_eq!(underscore.iter().map(|r| r.id).collect::<Vec<_>>(), vec![d]);

    let wildcard_only = store.list_all(Some("%")).await.expect("list should succeed");
    assert_eq!(
        wildcard_only.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![d],
        "% must match only a literal percent sign"
    );
}

#[tokio::test]
async fn count_tracks_inserts() {
    let dir = TempDir::new().expect("tempdir should be created");
    let store = open_store(&dir).await;
    assert_eq!(store.count().await.expect("count should succeed"), 0);

    insert(&store, "", &answers(serde_json::json!({"Q": "a"}))).await;
    insert(&store, "", &answers(serde_json::json!({"Q": "b"}))).await;
    assert_eq!(store.count().await.expect("count should succeed"), 2);
}

#[tokio::test]
async fn migrations_are_idempotent_and_enforce_append_only_table() {
    let dir = TempDir::new().expect("tempdir should be created");
    let path = dir.path().join("responses.db");
    let store = ResponseStore::open_and_migrate(&path, Duration::from_secs(2))
        .await
        .expect("store should open");
    store.migrate().await.expect("migrations should be idempotent");

    let id = insert(&store, "meta", &answers(serde_json::json!({"Q": "a"}))).await;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite://{}", path.display()))
        .await
        .expect("direct connection should succeed");

    let update = sqlx::query("UPDATE responses SET metadata = 'changed' WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await;
    let err = update.expect_err("update must be rejected");
    assert!(
        err.to_string().contains("append-only"),
        "unexpected error: {}",
        err
    );

    let delete = sqlx::query("DELETE FROM responses WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await;
    assert!(delete.is_err(), "delete must be rejected");

    let stored = store
        .get_by_id(id)
        .await
        .expect("get should succeed")
        .expect("row should still exist");
    assert_eq!(stored.metadata, "meta");
}

#[tokio::test]
async fn undecodable_answers_surface_as_corrupt() {
    let dir = TempDir::new().expect("tempdir should be created");
    let path = dir.path().join("responses.db");
    let store = ResponseStore::open_and_migrate(&path, Duration::from_secs(2))
        .await
        .expect("store should open");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite://{}", path.display()))
        .await
        .expect("direct connection should succeed");

    let id = sqlx::query(
        "INSERT INTO responses (created_at, source, metadata, answers, email, ip) VALUES ('t', 'web', '', 'not json', '', '')",
    )
    .execute(&pool)
    .await
    .expect("raw insert should succeed")
    .last_insert_rowid();

    let err = store.get_by_id(id).await.expect_err("decode must fail");
    assert!(matches!(err, StoreError::Corrupt { id: bad } if bad == id));
}

#[tokio::test]
async fn open_creates_missing_parent_directories() {
    let dir = TempDir::new().expect("tempdir should be created");
    let path = dir.path().join("nested").join("deeper").join("responses.db");

    let store = ResponseStore::open_and_migrate(&path, Duration::from_secs(2))
        .await
        .expect("store should open");
    store.ping().await.expect("ping should succeed");
    assert!(path.exists());
    store.close().await;
}

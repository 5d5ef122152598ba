use storage::keys;
use storage::repository::KeyValueStore;
use storage::sqlite::SqliteStore;
use storage::Storage;

#[tokio::test]
async fn sqlite_round_trips_and_overwrites_values() {
    let store = SqliteStore::connect("sqlite:file:memdb_kv_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");

    assert_eq!(store.get(keys::ACCESS_TOKEN).await.unwrap(), None);

    store.set(keys::ACCESS_TOKEN, "first").await.unwrap();
    store.set(keys::ACCESS_TOKEN, "second").await.unwrap();
    store.set(keys::LANGUAGE, "en").await.unwrap();

    assert_eq!(
        store.get(keys::ACCESS_TOKEN).await.unwrap().as_deref(),
        Some("second")
    );

    store.remove(keys::ACCESS_TOKEN).await.unwrap();
    assert_eq!(store.get(keys::ACCESS_TOKEN).await.unwrap(), None);
    assert_eq!(store.get(keys::LANGUAGE).await.unwrap().as_deref(), Some("en"));
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let url = "sqlite:file:memdb_kv_migrate?mode=memory&cache=shared";
    let store = SqliteStore::connect(url).await.expect("connect");
    store.migrate().await.expect("first migrate");
    store.set(keys::DARK_MODE, "dark").await.unwrap();
    store.migrate().await.expect("second migrate");

    assert_eq!(
        store.get(keys::DARK_MODE).await.unwrap().as_deref(),
        Some("dark")
    );
}

#[tokio::test]
async fn storage_facade_wraps_sqlite() {
    let storage = Storage::sqlite("sqlite:file:memdb_kv_facade?mode=memory&cache=shared")
        .await
        .expect("storage");
    storage
        .kv
        .set(&keys::progress_backup(7), r#"{"synced":false}"#)
        .await
        .unwrap();
    let raw = storage.kv.get(&keys::progress_backup(7)).await.unwrap();
    assert_eq!(raw.as_deref(), Some(r#"{"synced":false}"#));
}

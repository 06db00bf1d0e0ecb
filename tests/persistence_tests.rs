//! Integration Tests for Persisted Mode
//!
//! Drives the public `Cache` surface against real snapshot files.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use snapcache::{cache::current_timestamp_ms, Cache, CacheError, Config};
use tempfile::TempDir;

// == Helper Functions ==

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn open_at(path: &Path) -> anyhow::Result<Cache<Value>> {
    init_tracing();
    Ok(Cache::open(Config::persisted(path)).await?)
}

fn read_snapshot(path: &Path) -> Value {
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

/// A value that refuses to serialize when `opaque` is set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Payload {
    name: String,
    opaque: bool,
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.opaque {
            return Err(S::Error::custom("payload is memory-only"));
        }
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Payload", 2)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("opaque", &self.opaque)?;
        state.end()
    }
}

// == Round Trip ==

#[tokio::test]
async fn test_round_trip_across_instances() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");

    {
        let cache = open_at(&path).await?;
        assert!(cache.is_persisted());
        cache.set("user", json!({"id": 7, "tags": ["a", "b"]}), None).await?;
        cache.set("count", json!(3), Some(Duration::from_secs(60))).await?;
    }

    let reopened = open_at(&path).await?;
    assert_eq!(reopened.get("user"), Some(json!({"id": 7, "tags": ["a", "b"]})));
    assert_eq!(reopened.get("count"), Some(json!(3)));
    Ok(())
}

#[tokio::test]
async fn test_expired_entry_not_resurrected() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");

    {
        let cache = open_at(&path).await?;
        cache.set("short", json!("gone"), Some(Duration::from_millis(50))).await?;
        cache.set("long", json!("kept"), None).await?;
    }

    tokio::time::sleep(Duration::from_millis(120)).await;

    let reopened = open_at(&path).await?;
    assert_eq!(reopened.get("short"), None);
    assert!(!reopened.has("short"));
    assert_eq!(reopened.get("long"), Some(json!("kept")));
    assert_eq!(reopened.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_open_drops_already_expired_entries_from_file() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");
    let now = current_timestamp_ms();
    std::fs::write(
        &path,
        serde_json::to_string_pretty(&json!({
            "past": { "value": 1, "expiresAt": now - 1_000 },
            "future": { "value": 2, "expiresAt": now + 60_000 },
            "forever": { "value": 3, "expiresAt": null }
        }))?,
    )?;

    let cache = open_at(&path).await?;
    assert_eq!(cache.get("past"), None);
    assert_eq!(cache.get("future"), Some(json!(2)));
    assert_eq!(cache.get("forever"), Some(json!(3)));
    assert_eq!(cache.ttl_remaining("forever"), None);
    Ok(())
}

#[tokio::test]
async fn test_open_rearms_remaining_ttl() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");
    let expires_at = current_timestamp_ms() + 80;
    std::fs::write(
        &path,
        json!({ "soon": { "value": "v", "expiresAt": expires_at } }).to_string(),
    )?;

    let cache = open_at(&path).await?;
    assert_eq!(cache.get("soon"), Some(json!("v")));
    let remaining = cache.ttl_remaining("soon").unwrap();
    assert!(remaining <= Duration::from_millis(80));

    // The re-armed timer removes the entry without a read.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(cache.len(), 0);
    Ok(())
}

#[tokio::test]
async fn test_open_keeps_entry_with_maximal_expiry() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");
    std::fs::write(
        &path,
        r#"{"far": {"value": "kept", "expiresAt": 9223372036854775807}}"#,
    )?;

    let cache = open_at(&path).await?;
    assert_eq!(cache.get("far"), Some(json!("kept")));

    cache.flush().await?;
    assert_eq!(read_snapshot(&path)["far"]["expiresAt"], json!(i64::MAX));
    Ok(())
}

#[tokio::test]
async fn test_huge_ttl_is_persisted_and_served() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");
    let cache = open_at(&path).await?;

    cache.set("k", json!(1), Some(Duration::from_secs(u64::MAX / 2))).await?;
    assert_eq!(cache.get("k"), Some(json!(1)));
    assert_eq!(read_snapshot(&path)["k"]["expiresAt"], json!(i64::MAX));
    Ok(())
}

// == Snapshot Contents ==

#[tokio::test]
async fn test_every_mutation_is_on_disk_when_it_returns() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");
    let cache = open_at(&path).await?;

    cache.set("a", json!(1), None).await?;
    assert_eq!(read_snapshot(&path), json!({"a": {"value": 1, "expiresAt": null}}));

    cache.set("b", json!("two"), None).await?;
    assert_eq!(read_snapshot(&path)["b"]["value"], json!("two"));

    cache.delete("a").await?;
    let snapshot = read_snapshot(&path);
    assert!(snapshot.get("a").is_none());
    assert!(snapshot.get("b").is_some());

    cache.clear().await?;
    assert_eq!(read_snapshot(&path), json!({}));
    Ok(())
}

#[tokio::test]
async fn test_snapshot_records_absolute_expiry() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");
    let cache = open_at(&path).await?;

    let before = current_timestamp_ms();
    cache.set("k", json!(true), Some(Duration::from_secs(30))).await?;
    let after = current_timestamp_ms();

    let expires_at = read_snapshot(&path)["k"]["expiresAt"].as_i64().unwrap();
    assert!(expires_at >= before + 30_000);
    assert!(expires_at <= after + 30_000);
    Ok(())
}

#[tokio::test]
async fn test_snapshot_never_contains_expired_entries() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");
    let cache = open_at(&path).await?;

    cache.set("short", json!(1), Some(Duration::from_millis(30))).await?;
    tokio::time::sleep(Duration::from_millis(80)).await;
    cache.set("other", json!(2), None).await?;

    let snapshot = read_snapshot(&path);
    assert!(snapshot.get("short").is_none());
    assert!(snapshot.get("other").is_some());
    Ok(())
}

#[tokio::test]
async fn test_flush_rewrites_after_timer_expiry() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");
    let cache = open_at(&path).await?;

    cache.set("short", json!(1), Some(Duration::from_millis(30))).await?;
    tokio::time::sleep(Duration::from_millis(80)).await;

    // Timer expiry alone does not touch disk.
    assert!(read_snapshot(&path).get("short").is_some());

    cache.flush().await?;
    assert_eq!(read_snapshot(&path), json!({}));
    Ok(())
}

#[tokio::test]
async fn test_delete_absent_key_is_ok() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let cache = open_at(&dir.path().join("cache.json")).await?;

    cache.delete("never_set").await?;
    assert_eq!(cache.get("never_set"), None);
    Ok(())
}

#[tokio::test]
async fn test_parent_directories_are_created() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("state").join("cache").join("snapshot.json");
    let cache = open_at(&path).await?;

    assert!(!path.exists(), "Opening alone writes nothing");
    cache.set("k", json!(1), None).await?;
    assert!(path.exists());
    assert_eq!(cache.persist_path(), Some(path.as_path()));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_mutations_leave_a_complete_snapshot() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");
    let cache = Arc::new(open_at(&path).await?);

    let mut handles = Vec::new();
    for i in 0..16 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.set(format!("key{i}"), json!(i), None).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let snapshot = read_snapshot(&path);
    assert_eq!(snapshot.as_object().unwrap().len(), 16);
    Ok(())
}

// == Failures ==

#[tokio::test]
async fn test_corrupt_snapshot_fails_open() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");
    std::fs::write(&path, "{\"k\": ")?;

    let result = Cache::<Value>::open(Config::persisted(&path)).await;
    assert!(matches!(result, Err(CacheError::Decode { .. })));
    Ok(())
}

#[tokio::test]
async fn test_value_of_wrong_type_fails_open() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");
    std::fs::write(&path, r#"{"k": {"value": "text", "expiresAt": null}}"#)?;

    let result = Cache::<u64>::open(Config::persisted(&path)).await;
    assert!(matches!(result, Err(CacheError::Decode { .. })));
    Ok(())
}

#[tokio::test]
async fn test_unwritable_location_fails_mutation() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let parent = dir.path().join("state");
    let cache = open_at(&parent.join("cache.json")).await?;

    // A regular file where the parent directory should be.
    std::fs::write(&parent, "not a directory")?;

    let result = cache.set("k", json!(1), None).await;
    assert!(matches!(result, Err(CacheError::Io { .. })));

    // The in-memory mutation already happened.
    assert_eq!(cache.get("k"), Some(json!(1)));
    Ok(())
}

// == Unserializable Values ==

#[tokio::test]
async fn test_unserializable_value_stays_memory_only() -> anyhow::Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let path = dir.path().join("cache.json");

    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    let cache = Cache::<Payload>::open(Config::persisted(&path))
        .await?
        .with_unserializable_hook(move |skipped| {
            sink.lock().unwrap().push(skipped.key.clone());
        });

    let plain = Payload {
        name: "plain".to_string(),
        opaque: false,
    };
    let hidden = Payload {
        name: "hidden".to_string(),
        opaque: true,
    };
    cache.set("plain", plain.clone(), None).await?;
    cache.set("hidden", hidden.clone(), None).await?;

    assert_eq!(cache.get("hidden"), Some(hidden));
    assert_eq!(reported.lock().unwrap().as_slice(), ["hidden".to_string()]);

    let snapshot = read_snapshot(&path);
    assert!(snapshot.get("hidden").is_none());
    assert_eq!(snapshot["plain"]["value"]["name"], json!("plain"));

    drop(cache);
    let reopened = Cache::<Payload>::open(Config::persisted(&path)).await?;
    assert_eq!(reopened.get("plain"), Some(plain));
    assert_eq!(reopened.get("hidden"), None);
    Ok(())
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mnemo_core::lock::lock_key;
use mnemo_core::{
    deep_merge, InMemoryLockManager, LockManager, Metadata, MetadataMerger, MetadataRepository,
    MetadataTarget, StoreError,
};
use serde_json::json;

#[derive(Clone, Default)]
struct MapRepository {
    rows: Arc<Mutex<HashMap<String, Metadata>>>,
}

impl MapRepository {
    fn with_row(key: &str, metadata: Metadata) -> Self {
        let repository = Self::default();
        repository
            .rows
            .lock()
            .unwrap()
            .insert(key.to_string(), metadata);
        repository
    }

    fn get(&self, key: &str) -> Option<Metadata> {
        self.rows.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl MetadataRepository for MapRepository {
    async fn read_metadata(&self, target: &MetadataTarget) -> Result<Option<Metadata>, StoreError> {
        let row = self.get(&target.key_value);
        // widen the read/write gap so unsynchronised merges would lose updates
        tokio::task::yield_now().await;
        Ok(row)
    }

    async fn write_metadata(
        &self,
        target: &MetadataTarget,
        metadata: &Metadata,
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.rows
            .lock()
            .unwrap()
            .insert(target.key_value.clone(), metadata.clone());
        Ok(())
    }
}

fn meta(value: serde_json::Value) -> Metadata {
    serde_json::from_value(value).unwrap()
}

fn target(key: &str) -> MetadataTarget {
    MetadataTarget::new("session", "session_id", key)
}

#[test]
fn deep_merge_overrides_scalars_and_merges_objects() {
    let mut base = meta(json!({
        "a": 1,
        "nested": {"keep": true, "replace": "old", "deeper": {"x": 1}},
        "list": [1, 2, 3]
    }));
    deep_merge(
        &mut base,
        meta(json!({
            "a": 2,
            "nested": {"replace": "new", "deeper": {"y": 2}},
            "list": [9],
            "added": "yes"
        })),
    );

    assert_eq!(
        serde_json::to_value(&base).unwrap(),
        json!({
            "a": 2,
            "nested": {"keep": true, "replace": "new", "deeper": {"x": 1, "y": 2}},
            "list": [9],
            "added": "yes"
        })
    );
}

#[test]
fn deep_merge_replaces_object_with_scalar() {
    let mut base = meta(json!({"a": {"b": 1}}));
    deep_merge(&mut base, meta(json!({"a": "flat"})));
    assert_eq!(base["a"], json!("flat"));
}

#[tokio::test]
async fn merge_is_idempotent_for_identical_patches() {
    let repository = MapRepository::with_row("s1", meta(json!({"a": {"b": 1}, "c": [1]})));
    let merger = MetadataMerger::new(InMemoryLockManager::new(), repository.clone());
    let patch = meta(json!({"a": {"d": 2}, "c": [2, 3], "e": "x"}));

    let once = merger
        .merge(&target("s1"), patch.clone(), false)
        .await
        .unwrap();
    let twice = merger.merge(&target("s1"), patch, false).await.unwrap();

    assert_eq!(once, twice);
    assert_eq!(repository.get("s1"), Some(twice));
}

#[tokio::test]
async fn unprivileged_merge_strips_system_key() {
    let repository = MapRepository::with_row("s1", meta(json!({"system": {"owner": "core"}})));
    let merger = MetadataMerger::new(InMemoryLockManager::new(), repository.clone());

    let merged = merger
        .merge(
            &target("s1"),
            meta(json!({"system": {"owner": "caller"}, "topic": "rust"})),
            false,
        )
        .await
        .unwrap();

    assert_eq!(merged["system"], json!({"owner": "core"}));
    assert_eq!(merged["topic"], json!("rust"));
}

#[tokio::test]
async fn privileged_merge_may_write_system_key() {
    let repository = MapRepository::with_row("s1", Metadata::new());
    let merger = MetadataMerger::new(InMemoryLockManager::new(), repository);

    let merged = merger
        .merge(&target("s1"), meta(json!({"system": {"tier": 2}})), true)
        .await
        .unwrap();

    assert_eq!(merged["system"], json!({"tier": 2}));
}

#[tokio::test]
async fn merge_rejects_missing_identity_and_empty_patch() {
    let merger = MetadataMerger::new(InMemoryLockManager::new(), MapRepository::default());
    let patch = meta(json!({"a": 1}));

    for bad in [
        MetadataTarget::new("", "session_id", "s1"),
        MetadataTarget::new("session", "", "s1"),
        MetadataTarget::new("session", "session_id", " "),
    ] {
        let err = merger.merge(&bad, patch.clone(), false).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)), "{err}");
    }

    let err = merger
        .merge(&target("s1"), Metadata::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[tokio::test]
async fn merge_on_missing_entity_is_not_found_and_releases_lock() {
    let locks = InMemoryLockManager::new();
    let merger = MetadataMerger::new(locks.clone(), MapRepository::default());

    let err = merger
        .merge(&target("ghost"), meta(json!({"a": 1})), false)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(!locks.is_locked(lock_key(&target("ghost").lock_name())));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_disjoint_merges_lose_no_update() {
    let repository = MapRepository::with_row("shared", Metadata::new());
    let merger = Arc::new(MetadataMerger::new(
        InMemoryLockManager::new(),
        repository.clone(),
    ));

    let mut handles = Vec::new();
    for index in 0..32 {
        let merger = merger.clone();
        handles.push(tokio::spawn(async move {
            let mut patch = Metadata::new();
            patch.insert(format!("key_{index}"), json!(index));
            merger.merge(&target("shared"), patch, false).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = repository.get("shared").unwrap();
    assert_eq!(stored.len(), 32);
    for index in 0..32 {
        assert_eq!(stored[&format!("key_{index}")], json!(index));
    }
}

struct FailingUnlock {
    inner: InMemoryLockManager,
    unlocks: AtomicUsize,
}

#[async_trait]
impl LockManager for FailingUnlock {
    type Guard = <InMemoryLockManager as LockManager>::Guard;

    async fn lock(&self, key: u64) -> Result<Self::Guard, StoreError> {
        self.inner.lock(key).await
    }

    async fn unlock(&self, guard: Self::Guard) -> Result<(), StoreError> {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
        drop(guard);
        Err(StoreError::storage("unlock", "connection reset"))
    }
}

#[tokio::test]
async fn unlock_failure_does_not_fail_committed_merge() {
    let repository = MapRepository::with_row("s1", Metadata::new());
    let locks = FailingUnlock {
        inner: InMemoryLockManager::new(),
        unlocks: AtomicUsize::new(0),
    };
    let merger = MetadataMerger::new(locks, repository.clone());

    let merged = merger
        .merge(&target("s1"), meta(json!({"a": 1})), false)
        .await
        .expect("unlock failures are swallowed");

    assert_eq!(merged["a"], json!(1));
    assert_eq!(repository.get("s1").unwrap()["a"], json!(1));
}

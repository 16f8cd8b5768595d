use std::sync::Arc;
use std::time::Duration;

use mnemo_core::{lock_key, InMemoryLockManager, LockManager};

#[test]
fn lock_key_is_deterministic_and_key_sensitive() {
    assert_eq!(lock_key("session:session_id:a"), lock_key("session:session_id:a"));
    assert_ne!(lock_key("session:session_id:a"), lock_key("session:session_id:b"));
}

#[test]
fn lock_key_uses_leading_digest_bytes() {
    // sha256("") = e3b0c44298fc1c14...
    assert_eq!(lock_key(""), 0xe3b0_c442_98fc_1c14);
}

#[tokio::test]
async fn same_key_is_mutually_exclusive() {
    let locks = Arc::new(InMemoryLockManager::new());
    let guard = locks.lock(7).await.unwrap();
    assert!(locks.is_locked(7));

    let contender = {
        let locks = locks.clone();
        tokio::spawn(async move {
            let guard = locks.lock(7).await.unwrap();
            locks.unlock(guard).await.unwrap();
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!contender.is_finished());

    locks.unlock(guard).await.unwrap();
    contender.await.unwrap();
    assert!(!locks.is_locked(7));
}

#[tokio::test]
async fn different_keys_do_not_block_each_other() {
    let locks = InMemoryLockManager::new();
    let first = locks.lock(1).await.unwrap();
    let second = tokio::time::timeout(Duration::from_millis(200), locks.lock(2))
        .await
        .expect("independent keys must not wait")
        .unwrap();

    assert_eq!(first.key(), 1);
    assert_eq!(second.key(), 2);
    locks.unlock(first).await.unwrap();
    locks.unlock(second).await.unwrap();
}

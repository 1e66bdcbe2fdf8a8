//! Workspace Manager Integration Tests
//!
//! Tests for keyed staging directory preparation, the reset-on-reuse
//! policy, and the single-flight key guard.

use tempfile::TempDir;
use tunebot::workspace::{workspace_key, InFlightKeys, WorkspaceManager};

#[tokio::test]
async fn test_prepare_twice_yields_empty_directory_both_times() {
    let root = TempDir::new().unwrap();
    let manager = WorkspaceManager::new(root.path());
    let key = workspace_key(7, "https://example.org/watch?v=abc");

    let first = manager.prepare(&key).await.unwrap();
    assert!(first.is_dir());
    assert_eq!(std::fs::read_dir(&first).unwrap().count(), 0);

    // Simulate an interrupted run leaving files behind.
    std::fs::write(first.join("partial.mp3"), b"garbage").unwrap();
    std::fs::write(first.join("partial.webp"), b"garbage").unwrap();

    let second = manager.prepare(&key).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(std::fs::read_dir(&second).unwrap().count(), 0);
}

#[tokio::test]
async fn test_prepare_fails_on_nested_subdirectory() {
    let root = TempDir::new().unwrap();
    let manager = WorkspaceManager::new(root.path());
    let key = workspace_key(7, "https://example.org/watch?v=abc");

    let dir = manager.prepare(&key).await.unwrap();
    std::fs::create_dir(dir.join("unexpected")).unwrap();

    let err = manager.prepare(&key).await.unwrap_err();
    assert!(err.to_string().contains("unexpected"));
}

#[tokio::test]
async fn test_distinct_keys_get_distinct_directories() {
    let root = TempDir::new().unwrap();
    let manager = WorkspaceManager::new(root.path());

    let a = manager
        .prepare(&workspace_key(1, "https://example.org/a"))
        .await
        .unwrap();
    let b = manager
        .prepare(&workspace_key(2, "https://example.org/a"))
        .await
        .unwrap();

    assert_ne!(a, b);
    assert!(a.starts_with(root.path()));
    assert!(b.starts_with(root.path()));
}

#[test]
fn test_in_flight_key_released_on_drop() {
    let keys = InFlightKeys::new();
    let key = workspace_key(42, "https://example.org/watch?v=x");

    let guard = keys.acquire(&key).unwrap();
    assert!(keys.acquire(&key).is_none());

    drop(guard);
    assert!(keys.acquire(&key).is_some());
}

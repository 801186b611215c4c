// ABOUTME: Integration tests for file-backed version records.
// ABOUTME: Seeding, backups, preserved keys, and not-found handling.

use std::fs;

use stagecoach::types::{Environment, Version};
use stagecoach::version::{FileVersionStore, StoreError, VersionStore};

fn v(major: u64, minor: u64, patch: u64) -> Version {
    Version::new(major, minor, patch)
}

#[test]
fn seed_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileVersionStore::new(dir.path());

    store.seed(Environment::Dev, &v(0, 1, 0), false).unwrap();

    assert_eq!(store.load(Environment::Dev).unwrap(), v(0, 1, 0));
    assert_eq!(
        fs::read_to_string(dir.path().join(".env.dev")).unwrap(),
        "service_version=v0.1.0\n"
    );
    assert_eq!(store.load_backup(Environment::Dev).unwrap(), None);
}

#[test]
fn seed_refuses_overwrite_without_force() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileVersionStore::new(dir.path());
    store.seed(Environment::Prod, &v(1, 0, 0), false).unwrap();

    let err = store.seed(Environment::Prod, &v(2, 0, 0), false).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));

    store.seed(Environment::Prod, &v(2, 0, 0), true).unwrap();
    assert_eq!(store.load(Environment::Prod).unwrap(), v(2, 0, 0));
    assert_eq!(store.load_backup(Environment::Prod).unwrap(), Some(v(1, 0, 0)));
}

#[test]
fn save_backs_up_and_keeps_other_keys() {
    let dir = tempfile::tempdir().unwrap();
    let original = "# staging\nAPI_URL=https://stg.example.com\nservice_version=v1.0.3\n";
    fs::write(dir.path().join(".env.stg"), original).unwrap();
    let store = FileVersionStore::new(dir.path());

    store.save(Environment::Stg, &v(1, 0, 4)).unwrap();

    assert_eq!(
        fs::read_to_string(store.record_path(Environment::Stg)).unwrap(),
        "# staging\nAPI_URL=https://stg.example.com\nservice_version=v1.0.4\n"
    );
    assert_eq!(
        fs::read_to_string(store.backup_path(Environment::Stg)).unwrap(),
        original
    );
    assert_eq!(
        store.record(Environment::Stg).unwrap().get("API_URL"),
        Some("https://stg.example.com")
    );
}

#[test]
fn environments_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileVersionStore::new(dir.path());
    store.seed(Environment::Dev, &v(1, 2, 0), false).unwrap();
    store.seed(Environment::Uat, &v(1, 0, 0), false).unwrap();

    store.save(Environment::Dev, &v(1, 3, 0)).unwrap();

    assert_eq!(store.load(Environment::Uat).unwrap(), v(1, 0, 0));
    assert_eq!(store.load_backup(Environment::Uat).unwrap(), None);
}

#[test]
fn missing_record_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileVersionStore::new(dir.path());

    let err = store.load(Environment::Uat).unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("seed"));
}

#[test]
fn record_without_version_key_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(".env.dev"), "PORT=80\n").unwrap();
    let store = FileVersionStore::new(dir.path());

    assert!(store.load(Environment::Dev).unwrap_err().is_not_found());
}

#[test]
fn malformed_version_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(".env.dev"), "service_version=latest\n").unwrap();
    let store = FileVersionStore::new(dir.path());

    let err = store.load(Environment::Dev).unwrap_err();
    assert!(matches!(err, StoreError::Malformed { .. }));
    assert!(!err.is_not_found());
}

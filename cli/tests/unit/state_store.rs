//! `StateDir` file layout, atomic writes and setup marker semantics.

#![allow(clippy::unwrap_used, clippy::expect_used, unsafe_code)]

use chrono::Utc;
use plane_cli::application::ports::{
    AgentRecordStore, PlaneStore, SetupStateStore, WatchSnapshotStore,
};
use plane_cli::domain::{AgentRecord, AgentSpec, PlaneConfig, WatchSnapshot};
use plane_cli::infra::state::{STATE_DIR_ENV, StateDir};
use serial_test::serial;
use tempfile::TempDir;

fn state() -> (TempDir, StateDir) {
    let dir = TempDir::new().unwrap();
    let state = StateDir::new(dir.path().to_path_buf());
    (dir, state)
}

fn record(owner: &str) -> AgentRecord {
    let plane = PlaneConfig::named("agents");
    AgentRecord::new(&AgentSpec::with_defaults(owner, &plane), &plane, Utc::now())
}

#[tokio::test]
async fn fresh_directory_has_no_state() {
    let (_dir, state) = state();
    assert!(state.load_plane().await.unwrap().is_none());
    assert_eq!(state.current_step().await.unwrap(), 0);
    assert!(state.list_records().await.unwrap().is_empty());
    assert!(state.load_snapshot().await.unwrap().is_empty());
}

#[tokio::test]
async fn plane_round_trips_as_yaml() {
    let (dir, state) = state();
    let mut plane = PlaneConfig::named("acme");
    plane.project = Some("acme-agents".to_string());

    state.save_plane(&plane).await.unwrap();

    assert_eq!(state.load_plane().await.unwrap(), Some(plane));
    let raw = std::fs::read_to_string(dir.path().join("plane.yaml")).unwrap();
    assert!(raw.contains("project: acme-agents"));
    assert!(!dir.path().join("plane.yaml.tmp").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn state_files_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let (dir, state) = state();
    state.save_plane(&PlaneConfig::named("acme")).await.unwrap();
    let mode = std::fs::metadata(dir.path().join("plane.yaml"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn setup_marker_only_moves_forward_until_reset() {
    let (_dir, state) = state();
    state.advance(3).await.unwrap();
    state.advance(2).await.unwrap();
    assert_eq!(state.current_step().await.unwrap(), 3);

    state.advance(4).await.unwrap();
    assert_eq!(state.current_step().await.unwrap(), 4);

    state.reset().await.unwrap();
    assert_eq!(state.current_step().await.unwrap(), 0);
}

#[tokio::test]
async fn records_are_listed_sorted_and_deleted_once() {
    let (dir, state) = state();
    let bob = record("bob@example.com");
    let alice = record("alice@example.com");
    state.save_record(&bob).await.unwrap();
    state.save_record(&alice).await.unwrap();
    std::fs::write(dir.path().join("agents").join("notes.txt"), "ignored").unwrap();

    let listed = state.list_records().await.unwrap();
    assert_eq!(listed, vec![alice.clone(), bob]);
    assert_eq!(
        state.load_record(&alice.instance_name).await.unwrap(),
        Some(alice.clone())
    );

    assert!(state.delete_record(&alice.instance_name).await.unwrap());
    assert!(!state.delete_record(&alice.instance_name).await.unwrap());
    assert!(state.load_record(&alice.instance_name).await.unwrap().is_none());
}

#[tokio::test]
async fn record_names_cannot_escape_the_directory() {
    let (_dir, state) = state();
    let err = state.load_record("../plane").await.unwrap_err();
    assert!(err.to_string().contains("invalid instance name"));
}

#[tokio::test]
async fn corrupt_file_is_an_error_not_empty_state() {
    let (dir, state) = state();
    std::fs::write(dir.path().join("setup-state.json"), "{not json").unwrap();
    let err = state.current_step().await.unwrap_err();
    assert!(format!("{err:#}").contains("setup-state.json"));
}

#[tokio::test]
async fn snapshot_round_trips() {
    let (_dir, state) = state();
    let mut snapshot = WatchSnapshot::new();
    snapshot.insert("alice@example.com".to_string(), true);
    snapshot.insert("bob@example.com".to_string(), false);

    state.save_snapshot(&snapshot).await.unwrap();
    assert_eq!(state.load_snapshot().await.unwrap(), snapshot);
}

#[test]
#[serial]
fn env_var_overrides_state_root() {
    let dir = TempDir::new().unwrap();
    // SAFETY: serialized with every other test touching the environment.
    unsafe { std::env::set_var(STATE_DIR_ENV, dir.path()) };
    let state = StateDir::from_env().unwrap();
    unsafe { std::env::remove_var(STATE_DIR_ENV) };
    assert_eq!(state.root(), dir.path());
}

#[test]
#[serial]
fn empty_env_var_falls_back_to_home() {
    // SAFETY: serialized with every other test touching the environment.
    unsafe { std::env::set_var(STATE_DIR_ENV, "") };
    let state = StateDir::from_env();
    unsafe { std::env::remove_var(STATE_DIR_ENV) };
    if let Ok(state) = state {
        assert!(state.root().ends_with(".agents-plane"));
    }
}

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tasklane_core::clock::FixedClock;
use tasklane_core::identity::StaticIdentity;
use tasklane_core::remote::file::FileRemote;
use tasklane_core::{StoreSettings, TaskStore};
use tasklane_shared::{Sector, SubtaskDraft, TaskCreate, TaskStatus};
use tempfile::tempdir;

fn open_store(dir: &std::path::Path) -> TaskStore {
    let remote = FileRemote::open(dir).expect("open data dir");
    let now = Utc
        .with_ymd_and_hms(2024, 5, 10, 8, 30, 0)
        .single()
        .expect("valid date");
    TaskStore::with_clock(
        Arc::new(remote),
        Arc::new(StaticIdentity::new("u-1")),
        StoreSettings {
            sectors: vec![Sector::new("general", "Geral")],
            ..StoreSettings::default()
        },
        Arc::new(FixedClock::new(now)),
    )
}

#[tokio::test]
async fn tasks_survive_a_reopen() {
    let dir = tempdir().expect("tempdir");

    let first = open_store(dir.path());
    first.fetch_tasks().await.expect("fetch empty");
    let kept = first
        .add_task(TaskCreate {
            title: "pay rent".to_string(),
            subtasks: vec![SubtaskDraft::new("transfer"), SubtaskDraft::new("receipt")],
            ..TaskCreate::default()
        })
        .await
        .expect("add kept");
    let binned = first
        .add_task(TaskCreate {
            title: "old idea".to_string(),
            ..TaskCreate::default()
        })
        .await
        .expect("add binned");
    first.move_to_trash(binned.id).await.expect("trash");
    first.shutdown().await;

    let second = open_store(dir.path());
    second.fetch_tasks().await.expect("fetch again");

    let active = second.tasks();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, kept.id);
    assert_eq!(active[0].status, TaskStatus::Todo);
    let subtasks: Vec<&str> = active[0]
        .subtasks
        .iter()
        .map(|s| s.title.as_str())
        .collect();
    assert_eq!(subtasks, vec!["transfer", "receipt"]);

    let trash = second.trash_tasks();
    assert_eq!(trash.len(), 1);
    assert_eq!(trash[0].id, binned.id);
    assert!(trash[0].trash_state_consistent());
}

#[tokio::test]
async fn empty_data_dir_starts_empty() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(&dir.path().join("nested"));

    store.fetch_tasks().await.expect("fetch");
    store.fetch_columns().await.expect("columns");

    assert!(store.tasks().is_empty());
    assert!(store.columns().is_empty());
}

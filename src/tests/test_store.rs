use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::error::DubSyncError;
use crate::task::{MemoryTaskStore, SourceDescriptor, TaskId, TaskOptions, TaskStatus, TaskStore};

fn store_with_task(id: &str) -> (Arc<dyn TaskStore>, TaskId) {
    let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
    let id = TaskId::from(id);
    store
        .create(
            id.clone(),
            SourceDescriptor::LocalFile { path: PathBuf::from("input.mp4") },
            TaskOptions::default(),
        )
        .unwrap();
    (store, id)
}

#[test]
fn test_snapshots_are_never_torn() {
    let (store, id) = store_with_task("task_torn");
    store
        .modify(&id, |r| {
            r.status = TaskStatus::Running;
            r.message = "0".into();
        })
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let id = id.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut observed = 0;
                while !done.load(Ordering::SeqCst) {
                    let record = store.get(&id).unwrap();
                    // Все поля одного обновления согласованы между собой
                    assert_eq!(record.message, record.history.len().to_string());
                    assert_eq!(record.progress as usize, record.history.len().min(99));
                    observed += 1;
                }
                observed
            })
        })
        .collect();

    for step in 1..=500usize {
        store
            .modify(&id, |r| {
                r.history.push(format!("step {}", step));
                r.progress = step.min(99) as u8;
                r.message = step.to_string();
            })
            .unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    assert_eq!(store.get(&id).unwrap().history.len(), 500);
}

#[test]
fn test_progress_cannot_decrease() {
    let (store, id) = store_with_task("task_progress");
    store
        .modify(&id, |r| {
            r.status = TaskStatus::Running;
            r.progress = 45;
        })
        .unwrap();

    let err = store.modify(&id, |r| r.progress = 10).unwrap_err();
    assert!(matches!(err, DubSyncError::InvalidTransition { .. }));
    // Отклоненное обновление не применяется
    assert_eq!(store.get(&id).unwrap().progress, 45);
}

#[test]
fn test_terminal_status_is_final() {
    let (store, id) = store_with_task("task_terminal");
    store
        .modify(&id, |r| {
            r.status = TaskStatus::Running;
        })
        .unwrap();
    store
        .modify(&id, |r| {
            r.status = TaskStatus::Failed;
            r.error = Some("recognition produced nothing".into());
        })
        .unwrap();

    assert!(store.modify(&id, |r| r.status = TaskStatus::Running).is_err());
    assert!(store.modify(&id, |r| r.message = "still going".into()).is_err());
    let record = store.get(&id).unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.output_path, None);
}

#[test]
fn test_unknown_and_duplicate_ids() {
    let (store, id) = store_with_task("task_dup");
    assert!(matches!(
        store.get(&TaskId::from("task_missing")),
        Err(DubSyncError::TaskNotFound(_))
    ));
    assert!(store
        .create(id, SourceDescriptor::Remote { url: "https://example.com".into() }, TaskOptions::default())
        .is_err());
    assert_eq!(store.list().len(), 1);
}

#[tokio::test]
async fn test_updates_are_published() {
    let (store, id) = store_with_task("task_publish");
    let mut updates = store.subscribe();

    store.modify(&id, |r| r.status = TaskStatus::Running).unwrap();
    store.modify(&id, |r| r.progress = 10).unwrap();

    let first = updates.recv().await.unwrap();
    let second = updates.recv().await.unwrap();
    assert_eq!(first.status, TaskStatus::Running);
    assert_eq!(second.progress, 10);
    assert!(second.updated_at >= first.updated_at);
}

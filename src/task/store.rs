//! Хранилище записей задач
//!
//! Запись задачи изменяет только ее рабочий процесс, читать ее может кто угодно.
//! Каждое обновление применяется к копии записи, проверяется на соблюдение
//! инвариантов и фиксируется целиком, поэтому читатель никогда не видит
//! частично примененное обновление.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::error::{DubSyncError, Result};
use crate::task::record::{SourceDescriptor, TaskId, TaskOptions, TaskRecord};

/// Емкость канала уведомлений об обновлениях
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Потокобезопасное хранилище записей задач
pub trait TaskStore: Send + Sync {
    /// Создать запись в состоянии Queued
    fn create(&self, id: TaskId, source: SourceDescriptor, options: TaskOptions) -> Result<TaskRecord>;

    /// Получить согласованный снимок записи
    fn get(&self, id: &TaskId) -> Result<TaskRecord>;

    /// Применить изменение к записи. Возвращает зафиксированный снимок.
    fn update(&self, id: &TaskId, mutator: &mut dyn FnMut(&mut TaskRecord)) -> Result<TaskRecord>;

    /// Снимки всех записей
    fn list(&self) -> Vec<TaskRecord>;

    /// Подписаться на зафиксированные обновления
    fn subscribe(&self) -> broadcast::Receiver<TaskRecord>;
}

impl dyn TaskStore {
    /// Вариант [`TaskStore::update`] для замыканий, потребляющих захваченные значения
    pub fn modify<F>(&self, id: &TaskId, f: F) -> Result<TaskRecord>
    where
        F: FnOnce(&mut TaskRecord),
    {
        let mut f = Some(f);
        self.update(id, &mut |record| {
            if let Some(f) = f.take() {
                f(record);
            }
        })
    }
}

/// Хранилище в памяти процесса
pub struct MemoryTaskStore {
    records: RwLock<HashMap<TaskId, TaskRecord>>,
    updates: broadcast::Sender<TaskRecord>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            records: RwLock::new(HashMap::new()),
            updates,
        }
    }

    fn publish(&self, snapshot: &TaskRecord) {
        // Отсутствие подписчиков не является ошибкой
        let _ = self.updates.send(snapshot.clone());
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore for MemoryTaskStore {
    fn create(&self, id: TaskId, source: SourceDescriptor, options: TaskOptions) -> Result<TaskRecord> {
        let record = TaskRecord::new(id.clone(), source, options);
        {
            let mut records = self.records.write();
            if records.contains_key(&id) {
                return Err(DubSyncError::InvalidTransition {
                    id,
                    reason: "task id is already in use".to_string(),
                });
            }
            records.insert(id.clone(), record.clone());
        }
        log::debug!("Task {} created", id);
        self.publish(&record);
        Ok(record)
    }

    fn get(&self, id: &TaskId) -> Result<TaskRecord> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| DubSyncError::TaskNotFound(id.clone()))
    }

    fn update(&self, id: &TaskId, mutator: &mut dyn FnMut(&mut TaskRecord)) -> Result<TaskRecord> {
        let snapshot = {
            let mut records = self.records.write();
            let current = records
                .get_mut(id)
                .ok_or_else(|| DubSyncError::TaskNotFound(id.clone()))?;

            let mut next = current.clone();
            mutator(&mut next);

            if next == *current {
                return Ok(next);
            }

            current.check_update(&next).map_err(|reason| {
                log::warn!("Rejected update of task {}: {}", id, reason);
                DubSyncError::InvalidTransition {
                    id: id.clone(),
                    reason,
                }
            })?;

            next.updated_at = Utc::now();
            *current = next;
            current.clone()
        };

        self.publish(&snapshot);
        Ok(snapshot)
    }

    fn list(&self) -> Vec<TaskRecord> {
        let mut all: Vec<TaskRecord> = self.records.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    fn subscribe(&self) -> broadcast::Receiver<TaskRecord> {
        self.updates.subscribe()
    }
}

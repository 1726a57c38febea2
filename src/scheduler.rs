//! # Планировщик задач
//!
//! Каждая задача выполняется отдельной задачей tokio. Число одновременно
//! выполняемых задач ограничено семафором; задача остается в состоянии
//! Queued, пока не получит разрешение. Чтение статуса обращается только к
//! хранилищу и не ждет работающих конвейеров.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::collab::Collaborators;
use crate::config::DubSyncConfig;
use crate::error::{DubSyncError, Result};
use crate::pipeline::{Pipeline, TaskContext};
use crate::progress::ProgressReporter;
use crate::task::{SourceDescriptor, TaskId, TaskOptions, TaskRecord, TaskStatus, TaskStore};

/// Сервис дубляжа: запуск задач и чтение их состояния
pub struct DubbingService {
    pipeline: Pipeline,
    store: Arc<dyn TaskStore>,
    permits: Arc<Semaphore>,
    /// Токены отмены незавершенных задач
    active: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
    runtime: Handle,
}

impl DubbingService {
    /// Создает сервис. Должен вызываться внутри среды выполнения tokio.
    pub fn new(config: DubSyncConfig, collaborators: Collaborators, store: Arc<dyn TaskStore>) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| DubSyncError::Configuration(format!("Tokio runtime is required: {}", e)))?;

        info!(
            "Dubbing service: {} -> {}, up to {} tasks, {} requests per task",
            config.source_language, config.target_language, config.max_concurrent_tasks, config.max_concurrent_requests
        );

        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        Ok(Self {
            pipeline: Pipeline::new(Arc::new(config), collaborators),
            store,
            permits,
            active: Arc::new(Mutex::new(HashMap::new())),
            runtime,
        })
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        self.store.clone()
    }

    /// Ставит задачу в очередь и сразу возвращает ее идентификатор
    pub fn start_task(&self, source: SourceDescriptor, options: TaskOptions) -> Result<TaskId> {
        let id = TaskId::generate();
        self.store.create(id.clone(), source.clone(), options.clone())?;
        info!("[{}] Queued {} (captioning: {}, audio: {:?})", id, source, options.captioning, options.audio_mode);

        let cancel = CancellationToken::new();
        self.active.lock().insert(id.clone(), cancel.clone());

        let ctx = TaskContext {
            source,
            options,
            reporter: ProgressReporter::new(self.store.clone(), id.clone()),
            cancel,
        };
        let pipeline = self.pipeline.clone();
        let permits = self.permits.clone();
        let active = self.active.clone();

        self.runtime.spawn(async move {
            let id = ctx.id().clone();
            let permit = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => Err(DubSyncError::Cancelled(id.clone())),
                permit = permits.acquire_owned() => permit.map_err(|e| {
                    DubSyncError::Resource(format!("Task scheduler is closed: {}", e))
                }),
            };

            match permit {
                Ok(_permit) => {
                    if let Err(e) = pipeline.run(&ctx).await {
                        warn!("[{}] Task ended with error: {}", id, e);
                    }
                }
                Err(e) => {
                    if let Err(report_error) = ctx.reporter.fail(&e) {
                        error!("[{}] Failed to record task failure: {}", id, report_error);
                    }
                }
            }

            active.lock().remove(&id);
        });

        Ok(id)
    }

    /// Снимок записи задачи
    pub fn get_status(&self, id: &TaskId) -> Result<TaskRecord> {
        self.store.get(id)
    }

    /// Путь к готовому видео. Доступен только для завершенной задачи.
    pub fn get_output(&self, id: &TaskId) -> Result<PathBuf> {
        let record = self.store.get(id)?;
        match (record.status, record.output_path) {
            (TaskStatus::Completed, Some(path)) => Ok(path),
            _ => Err(DubSyncError::TaskNotCompleted(id.clone())),
        }
    }

    pub fn list_tasks(&self) -> Vec<TaskRecord> {
        self.store.list()
    }

    /// Незавершенные задачи, включая ожидающие в очереди
    pub fn running_tasks(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.active.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Запрашивает отмену задачи. Возвращает `false`, если задача уже завершена.
    pub fn cancel(&self, id: &TaskId) -> Result<bool> {
        let record = self.store.get(id)?;
        if record.status.is_terminal() {
            return Ok(false);
        }
        match self.active.lock().get(id) {
            Some(token) => {
                info!("[{}] Cancelling task", id);
                token.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Ждет завершения задачи и возвращает итоговую запись
    pub async fn wait(&self, id: &TaskId) -> Result<TaskRecord> {
        let mut updates = self.store.subscribe();
        loop {
            let record = self.store.get(id)?;
            if record.status.is_terminal() {
                return Ok(record);
            }
            match updates.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(DubSyncError::Resource("Task store stopped publishing updates".to_string()));
                }
            }
        }
    }
}

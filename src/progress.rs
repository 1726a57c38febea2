//! Модуль для отслеживания прогресса выполнения задачи
//!
//! Каждый этап конвейера имеет фиксированную контрольную точку в процентах.
//! Точки не распределены равномерно: распознавание и синтез занимают
//! наибольшую долю, так как дольше всего ждут внешние сервисы. Значения
//! служат только для отображения и не являются гарантией времени.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{DubSyncError, Result};
use crate::task::{SegmentWarning, TaskId, TaskRecord, TaskStatus, TaskStore};

/// Этапы конвейера дубляжа
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Получение видео (загрузка или готовый файл)
    Acquire,
    /// Извлечение звуковой дорожки
    ExtractAudio,
    /// Распознавание речи
    Recognize,
    /// Перевод
    Translate,
    /// Литературная редактура перевода
    Rewrite,
    /// Синтез речи и выравнивание сегментов
    Synthesize,
    /// Сборка итогового видео
    Mux,
}

impl PipelineStage {
    /// Все этапы в порядке выполнения
    pub const ALL: [PipelineStage; 7] = [
        Self::Acquire,
        Self::ExtractAudio,
        Self::Recognize,
        Self::Translate,
        Self::Rewrite,
        Self::Synthesize,
        Self::Mux,
    ];

    /// Получить название этапа в виде строки
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquire => "Acquiring video",
            Self::ExtractAudio => "Extracting audio",
            Self::Recognize => "Recognizing speech",
            Self::Translate => "Translating",
            Self::Rewrite => "Rewriting translation",
            Self::Synthesize => "Synthesizing speech",
            Self::Mux => "Muxing output",
        }
    }

    /// Прогресс задачи по завершении этапа
    pub fn checkpoint(&self) -> u8 {
        match self {
            Self::Acquire => 10,
            Self::ExtractAudio => 15,
            Self::Recognize => 45,
            Self::Translate => 60,
            Self::Rewrite => 65,
            Self::Synthesize => 90,
            Self::Mux => 100,
        }
    }

    /// Прогресс задачи в начале этапа
    pub fn start_point(&self) -> u8 {
        match self {
            Self::Acquire => 0,
            Self::ExtractAudio => Self::Acquire.checkpoint(),
            Self::Recognize => Self::ExtractAudio.checkpoint(),
            Self::Translate => Self::Recognize.checkpoint(),
            Self::Rewrite => Self::Translate.checkpoint(),
            Self::Synthesize => Self::Rewrite.checkpoint(),
            Self::Mux => Self::Synthesize.checkpoint(),
        }
    }
}

/// Репортер прогресса одной задачи. Пишет только в запись своей задачи.
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn TaskStore>,
    id: TaskId,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn TaskStore>, id: TaskId) -> Self {
        Self { store, id }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.id
    }

    /// Текущий снимок записи задачи
    pub fn snapshot(&self) -> Result<TaskRecord> {
        self.store.get(&self.id)
    }

    /// Перевести задачу в состояние Running
    pub fn start(&self) -> Result<TaskRecord> {
        self.store.modify(&self.id, |record| {
            record.status = TaskStatus::Running;
            record.message = "Started".to_string();
            record.history.push("Task started".to_string());
        })
    }

    /// Отметить начало этапа
    pub fn begin(&self, stage: PipelineStage) -> Result<TaskRecord> {
        log::info!("[{}] {}...", self.id, stage.as_str());
        self.store.modify(&self.id, |record| {
            record.progress = record.progress.max(stage.start_point());
            record.message = format!("{}...", stage.as_str());
            record.history.push(format!("{} started", stage.as_str()));
        })
    }

    /// Обновить прогресс внутри этапа (`done` из `total` единиц работы)
    pub fn advance(&self, stage: PipelineStage, done: usize, total: usize, details: String) -> Result<TaskRecord> {
        let start = stage.start_point() as usize;
        let span = stage.checkpoint() as usize - start;
        // Контрольная точка этапа выставляется только в finish
        let within = if total == 0 { 0 } else { span * done.min(total) / total };
        let value = (start + within).min(stage.checkpoint() as usize - 1) as u8;

        self.store.modify(&self.id, |record| {
            record.progress = record.progress.max(value);
            record.message = details;
        })
    }

    /// Отметить успешное завершение этапа
    pub fn finish(&self, stage: PipelineStage) -> Result<TaskRecord> {
        log::info!("[{}] {} finished", self.id, stage.as_str());
        // Контрольная точка последнего этапа выставляется вместе с результатом
        let checkpoint = match stage {
            PipelineStage::Mux => 99,
            other => other.checkpoint(),
        };
        self.store.modify(&self.id, |record| {
            record.progress = record.progress.max(checkpoint);
            record.message = format!("{} finished", stage.as_str());
            record.history.push(format!("{} finished", stage.as_str()));
        })
    }

    pub fn record_transcript(&self, transcript: String) -> Result<TaskRecord> {
        self.store.modify(&self.id, |record| record.transcript = Some(transcript))
    }

    pub fn record_translation(&self, translated: String) -> Result<TaskRecord> {
        self.store.modify(&self.id, |record| record.translated_text = Some(translated))
    }

    pub fn record_optimized(&self, optimized: String) -> Result<TaskRecord> {
        self.store.modify(&self.id, |record| record.optimized_text = Some(optimized))
    }

    /// Добавить предупреждения о деградировавших сегментах
    pub fn record_warnings(&self, warnings: Vec<SegmentWarning>) -> Result<TaskRecord> {
        if warnings.is_empty() {
            return self.snapshot();
        }
        for warning in &warnings {
            log::warn!("[{}] segment {} degraded: {}", self.id, warning.index, warning.message);
        }
        self.store.modify(&self.id, |record| record.warnings.extend(warnings))
    }

    /// Отметить завершение задачи вместе с путем к результату
    pub fn complete(&self, output_path: PathBuf) -> Result<TaskRecord> {
        log::info!("[{}] Task completed: {}", self.id, output_path.display());
        self.store.modify(&self.id, |record| {
            record.status = TaskStatus::Completed;
            record.progress = 100;
            record.output_path = Some(output_path);
            record.message = "Completed".to_string();
            record.history.push("Task completed".to_string());
        })
    }

    /// Отметить провал задачи
    pub fn fail(&self, error: &DubSyncError) -> Result<TaskRecord> {
        log::error!("[{}] Task failed: {}", self.id, error);
        let message = error.to_string();
        let kind = error.failure_kind();
        // Задача может провалиться до того, как рабочий процесс ее запустил.
        // Из Queued в Failed можно попасть только через Running.
        if self.store.get(&self.id)?.status == TaskStatus::Queued {
            self.store.modify(&self.id, |record| {
                record.status = TaskStatus::Running;
                record.history.push("Task started".to_string());
            })?;
        }
        self.store.modify(&self.id, |record| {
            record.status = TaskStatus::Failed;
            record.error = Some(message.clone());
            record.failure = Some(kind);
            record.message = format!("Failed: {}", message);
            record.history.push("Task failed".to_string());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{MemoryTaskStore, SourceDescriptor, TaskOptions};

    fn reporter() -> ProgressReporter {
        let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
        let id = TaskId::from("task_progress");
        store
            .create(
                id.clone(),
                SourceDescriptor::Remote { url: "https://example.com/v".into() },
                TaskOptions::default(),
            )
            .unwrap();
        ProgressReporter::new(store, id)
    }

    #[test]
    fn test_checkpoints_are_monotonic() {
        let mut previous = 0;
        for stage in PipelineStage::ALL {
            assert!(stage.start_point() >= previous);
            assert!(stage.checkpoint() > stage.start_point());
            previous = stage.checkpoint();
        }
        assert_eq!(PipelineStage::Mux.checkpoint(), 100);
    }

    #[test]
    fn test_stage_updates() {
        let reporter = reporter();
        reporter.start().unwrap();
        reporter.begin(PipelineStage::Acquire).unwrap();
        let record = reporter.finish(PipelineStage::Acquire).unwrap();
        assert_eq!(record.progress, 10);
        assert_eq!(record.history, vec![
            "Task started".to_string(),
            "Acquiring video started".to_string(),
            "Acquiring video finished".to_string(),
        ]);

        // Промежуточный прогресс не достигает контрольной точки этапа
        let record = reporter
            .advance(PipelineStage::Synthesize, 10, 10, "Synthesized 10/10".into())
            .unwrap();
        assert_eq!(record.progress, 89);
        assert_eq!(record.message, "Synthesized 10/10");
    }

    #[test]
    fn test_skipped_stage_keeps_progress_monotonic() {
        let reporter = reporter();
        reporter.start().unwrap();
        reporter.finish(PipelineStage::Translate).unwrap();
        // Начало этапа с меньшей стартовой точкой не откатывает прогресс
        let record = reporter.begin(PipelineStage::ExtractAudio).unwrap();
        assert_eq!(record.progress, 60);
    }

    #[test]
    fn test_complete_and_fail_are_terminal() {
        let reporter = reporter();
        reporter.start().unwrap();
        let record = reporter.complete(PathBuf::from("outputs/output.mp4")).unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.progress, 100);

        let err = reporter.fail(&DubSyncError::NoUsableAudio(1));
        assert!(matches!(err, Err(DubSyncError::InvalidTransition { .. })));
    }

    #[test]
    fn test_completion_records_mux_once() {
        let reporter = reporter();
        reporter.start().unwrap();
        reporter.begin(PipelineStage::Mux).unwrap();
        reporter.finish(PipelineStage::Mux).unwrap();
        let record = reporter.complete(PathBuf::from("outputs/output.mp4")).unwrap();
        assert_eq!(record.history, vec![
            "Task started".to_string(),
            "Muxing output started".to_string(),
            "Muxing output finished".to_string(),
            "Task completed".to_string(),
        ]);
    }

    #[test]
    fn test_queued_task_can_fail() {
        let reporter = reporter();
        let record = reporter.fail(&DubSyncError::Cancelled(reporter.task_id().clone())).unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.failure, Some(crate::error::FailureKind::Cancelled));
        assert_eq!(record.history, vec!["Task started".to_string(), "Task failed".to_string()]);
    }
}

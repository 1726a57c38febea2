//! Запись задачи дубляжа и связанные с ней типы

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, SegmentError};

/// Непрозрачный идентификатор задачи
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Сгенерировать новый уникальный идентификатор
    pub fn generate() -> Self {
        Self(format!("task_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Состояние задачи: Queued -> Running -> (Completed | Failed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Завершено ли выполнение задачи
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Допустим ли переход в указанное состояние
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        ) || *self == next
    }
}

/// Какая звуковая дорожка попадает в итоговое видео
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    /// Синтезированная, выровненная по сегментам дорожка
    #[default]
    Replace,
    /// Оригинальная дорожка видео
    KeepOriginal,
}

/// Параметры задачи
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Распознавать с временными метками и добавлять субтитры
    pub captioning: bool,
    pub audio_mode: AudioMode,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            captioning: true,
            audio_mode: AudioMode::Replace,
        }
    }
}

/// Источник видео
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SourceDescriptor {
    /// Видео нужно скачать
    Remote { url: String },
    /// Видео уже лежит на диске
    LocalFile { path: PathBuf },
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote { url } => write!(f, "{}", url),
            Self::LocalFile { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Вид деградации сегмента
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentIssue {
    /// Перевод не удался, озвучен исходный текст
    TranslationFallback,
    /// Синтез не удался, сегмент заполнен тишиной
    SynthesisFailed,
    /// Аудио не удалось декодировать, сегмент заполнен тишиной
    DecodeFailed,
}

/// Предупреждение о деградации одного сегмента
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentWarning {
    pub index: usize,
    pub issue: SegmentIssue,
    pub message: String,
}

impl SegmentWarning {
    pub fn from_error(index: usize, error: &SegmentError) -> Self {
        let issue = match error {
            SegmentError::Translation(_) => SegmentIssue::TranslationFallback,
            SegmentError::Synthesis(_) => SegmentIssue::SynthesisFailed,
            SegmentError::Decode(_) => SegmentIssue::DecodeFailed,
        };
        Self {
            index,
            issue,
            message: error.to_string(),
        }
    }
}

/// Запись задачи. Изменяется только рабочим процессом своей задачи.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub source: SourceDescriptor,
    pub options: TaskOptions,
    pub status: TaskStatus,
    /// 0-100, не убывает
    pub progress: u8,
    /// Текущее действие, перезаписывается при каждом обновлении
    pub message: String,
    /// Журнал этапов, только дополняется
    pub history: Vec<String>,
    /// Деградировавшие сегменты, только дополняется
    pub warnings: Vec<SegmentWarning>,
    pub transcript: Option<String>,
    pub translated_text: Option<String>,
    pub optimized_text: Option<String>,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(id: TaskId, source: SourceDescriptor, options: TaskOptions) -> Self {
        let now = Utc::now();
        Self {
            id,
            source,
            options,
            status: TaskStatus::Queued,
            progress: 0,
            message: "Queued".to_string(),
            history: Vec::new(),
            warnings: Vec::new(),
            transcript: None,
            translated_text: None,
            optimized_text: None,
            output_path: None,
            error: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Проверить, что `next` является допустимым продолжением `self`
    pub(crate) fn check_update(&self, next: &TaskRecord) -> std::result::Result<(), String> {
        if next.id != self.id || next.created_at != self.created_at {
            return Err("identity fields are immutable".to_string());
        }
        if next.source != self.source || next.options != self.options {
            return Err("source and options are immutable".to_string());
        }
        if self.status.is_terminal() && next != self {
            return Err(format!("task is already {:?}", self.status));
        }
        if !self.status.can_transition_to(next.status) {
            return Err(format!("status cannot go from {:?} to {:?}", self.status, next.status));
        }
        if next.progress < self.progress {
            return Err(format!("progress cannot decrease ({} -> {})", self.progress, next.progress));
        }
        if next.progress > 100 {
            return Err(format!("progress out of range: {}", next.progress));
        }
        if !next.history.starts_with(&self.history) {
            return Err("history is append-only".to_string());
        }
        if !next.warnings.starts_with(&self.warnings) {
            return Err("warnings are append-only".to_string());
        }

        set_once("transcript", &self.transcript, &next.transcript)?;
        set_once("translated_text", &self.translated_text, &next.translated_text)?;
        set_once("optimized_text", &self.optimized_text, &next.optimized_text)?;
        set_once("output_path", &self.output_path, &next.output_path)?;
        set_once("error", &self.error, &next.error)?;
        set_once("failure", &self.failure, &next.failure)?;

        if next.output_path.is_some() && next.status != TaskStatus::Completed {
            return Err("output_path is only exposed on completion".to_string());
        }
        if next.status == TaskStatus::Completed && (next.output_path.is_none() || next.progress != 100) {
            return Err("completed task requires output_path and progress 100".to_string());
        }
        if next.status == TaskStatus::Failed && next.error.is_none() {
            return Err("failed task requires an error".to_string());
        }
        Ok(())
    }
}

fn set_once<T: PartialEq>(
    field: &str,
    old: &Option<T>,
    new: &Option<T>,
) -> std::result::Result<(), String> {
    match old {
        Some(_) if old != new => Err(format!("{} is already set", field)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord::new(
            TaskId::from("task_test"),
            SourceDescriptor::Remote { url: "https://example.com/v".into() },
            TaskOptions::default(),
        )
    }

    #[test]
    fn test_status_transitions() {
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_set_once_fields() {
        let mut old = record();
        old.status = TaskStatus::Running;
        old.transcript = Some("hello".into());

        let mut next = old.clone();
        next.transcript = Some("bye".into());
        assert!(old.check_update(&next).is_err());

        let mut next = old.clone();
        next.translated_text = Some("你好".into());
        assert!(old.check_update(&next).is_ok());
    }

    #[test]
    fn test_output_only_on_completion() {
        let mut old = record();
        old.status = TaskStatus::Running;

        let mut next = old.clone();
        next.output_path = Some(PathBuf::from("outputs/output.mp4"));
        assert!(old.check_update(&next).is_err());

        next.status = TaskStatus::Completed;
        next.progress = 100;
        assert!(old.check_update(&next).is_ok());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = TaskId::generate();
        let b = TaskId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("task_"));
    }
}

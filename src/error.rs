//! Модуль обработки ошибок библиотеки dub-sync
//!
//! Ошибки разделены по уровням: ошибки внешних сервисов ([`CollaboratorError`]),
//! деградация отдельного сегмента ([`SegmentError`]), ошибки растяжения аудио
//! ([`StretchError`]) и ошибки уровня задачи ([`DubSyncError`]).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskId;

/// Внешний сервис, к которому обращается конвейер
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collaborator {
    Downloader,
    Transcoder,
    Recognizer,
    Translator,
    Rewriter,
    Synthesizer,
}

impl Collaborator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloader => "downloader",
            Self::Transcoder => "transcoder",
            Self::Recognizer => "recognizer",
            Self::Translator => "translator",
            Self::Rewriter => "rewriter",
            Self::Synthesizer => "synthesizer",
        }
    }
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ошибка внешнего сервиса (сеть, авторизация, квота, отказ сервиса)
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Запрос не был доставлен или ответ не удалось прочитать
    #[error("{0} request failed: {1}")]
    Request(Collaborator, String),

    /// Сервис ответил ошибкой
    #[error("{collaborator} service error (status {status}): {body}")]
    Service {
        collaborator: Collaborator,
        status: u16,
        body: String,
    },

    /// Вызов не уложился в отведенное время
    #[error("{0} call timed out after {1:?}")]
    Timeout(Collaborator, Duration),

    /// Сервис вернул пустой результат
    #[error("{0} returned an empty result: {1}")]
    Empty(Collaborator, String),

    /// Внешняя программа завершилась с ошибкой
    #[error("{0} process failed: {1}")]
    Process(Collaborator, String),

    /// Ошибка ввода-вывода при работе с файлами сервиса
    #[error("{0} I/O error: {1}")]
    Io(Collaborator, #[source] std::io::Error),
}

impl CollaboratorError {
    /// Сервис, вернувший ошибку
    pub fn collaborator(&self) -> Collaborator {
        match self {
            Self::Request(c, _)
            | Self::Timeout(c, _)
            | Self::Empty(c, _)
            | Self::Process(c, _)
            | Self::Io(c, _) => *c,
            Self::Service { collaborator, .. } => *collaborator,
        }
    }
}

/// Деградация одного сегмента. Никогда не приводит к провалу задачи.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SegmentError {
    #[error("translation failed: {0}")]
    Translation(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("audio decode failed: {0}")]
    Decode(String),
}

/// Ошибка изменения темпа. Обрабатывается внутри синхронизатора.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StretchError {
    #[error("empty input buffer")]
    Empty,

    #[error("input too short for stretching: {samples} samples, need at least {required}")]
    TooShort { samples: usize, required: usize },

    #[error("unusable stretch ratio: {0}")]
    InvalidRatio(f64),
}

/// Категория провала задачи, сохраняемая в записи задачи
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Отказ внешнего сервиса
    Collaborator,
    /// Отсутствующий или поврежденный файл, нехватка места
    Resource,
    /// Ошибка выравнивания, не обработанная локально
    Alignment,
    /// Нет пригодных данных для продолжения
    TotalFailure,
    /// Задача отменена
    Cancelled,
}

/// Ошибки библиотеки dub-sync
#[derive(Debug, Error)]
pub enum DubSyncError {
    /// Ошибка внешнего сервиса
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// Ошибка ресурсов (файлы, диск)
    #[error("Resource error: {0}")]
    Resource(String),

    /// Ни один сегмент не удалось озвучить
    #[error("no usable audio: synthesis failed for all {0} segments")]
    NoUsableAudio(usize),

    /// Этапу нечего обрабатывать
    #[error("No input for {stage}: {reason}")]
    NoInput { stage: &'static str, reason: String },

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Задача не найдена
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// Результат запрошен до завершения задачи
    #[error("Task {0} is not completed")]
    TaskNotCompleted(TaskId),

    /// Обновление нарушает инварианты записи задачи
    #[error("Invalid update of task {id}: {reason}")]
    InvalidTransition { id: TaskId, reason: String },

    /// Задача отменена
    #[error("Task {0} was cancelled")]
    Cancelled(TaskId),

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    Audio(String),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DubSyncError {
    /// Категория ошибки для записи задачи
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Collaborator(_) => FailureKind::Collaborator,
            Self::NoUsableAudio(_) | Self::NoInput { .. } => FailureKind::TotalFailure,
            Self::Cancelled(_) => FailureKind::Cancelled,
            Self::Audio(_) => FailureKind::Alignment,
            Self::Resource(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Configuration(_)
            | Self::TaskNotFound(_)
            | Self::TaskNotCompleted(_)
            | Self::InvalidTransition { .. } => FailureKind::Resource,
        }
    }
}

/// Тип Result для библиотеки dub-sync
pub type Result<T> = std::result::Result<T, DubSyncError>;

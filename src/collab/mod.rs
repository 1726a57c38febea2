//! # Внешние сервисы
//!
//! Конвейер обращается к загрузчику, транскодеру, распознавателю речи,
//! переводчику, редактору текста и синтезатору только через узкие трейты
//! этого модуля. Способ вызова (HTTP, внешняя программа, заглушка в тестах)
//! определяется реализацией.

pub mod ffmpeg;
pub mod openai;
pub mod ytdlp;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::DubSyncConfig;
use crate::error::{CollaboratorError, Result};

pub use ffmpeg::FfmpegTranscoder;
pub use openai::OpenAiClient;
pub use ytdlp::YtDlpDownloader;

/// Результат вызова внешнего сервиса
pub type CollabResult<T> = std::result::Result<T, CollaboratorError>;

/// Сегмент распознанной речи
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Позиция в последовательности, с нуля и без пропусков
    pub index: usize,
    /// Начало окна, секунды
    pub start: f64,
    /// Конец окна, секунды
    pub end: f64,
    pub source_text: String,
    /// Заполняется конвейером на этапе перевода
    pub translated_text: Option<String>,
}

impl TranscriptSegment {
    /// Длительность окна; окна с `end <= start` имеют нулевую длительность
    pub fn target_duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn has_window(&self) -> bool {
        self.end > self.start
    }

    /// Текст для озвучивания и субтитров
    pub fn display_text(&self) -> &str {
        self.translated_text.as_deref().unwrap_or(&self.source_text)
    }
}

/// Режим распознавания
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionMode {
    /// Только текст
    Plain,
    /// Текст и упорядоченные сегменты с временными метками
    Timestamped,
}

/// Результат распознавания
#[derive(Debug, Clone, PartialEq)]
pub enum Transcription {
    Plain { text: String },
    Segmented { text: String, segments: Vec<TranscriptSegment> },
}

impl Transcription {
    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Segmented { text, .. } => text,
        }
    }

    pub fn segments(&self) -> Option<&[TranscriptSegment]> {
        match self {
            Self::Plain { .. } => None,
            Self::Segmented { segments, .. } => Some(segments),
        }
    }
}

/// Параметры сборки итогового видео
#[derive(Debug, Clone)]
pub struct MuxRequest<'a> {
    pub video: &'a Path,
    pub audio: &'a Path,
    pub captions: Option<&'a Path>,
    /// Код языка для метаданных дорожки субтитров
    pub caption_language: &'a str,
    pub output: &'a Path,
}

/// Загрузчик удаленного видео
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Скачать видео. `destination` - путь без расширения, расширение выбирает загрузчик.
    async fn fetch(&self, url: &str, destination: &Path) -> CollabResult<PathBuf>;
}

/// Транскодер
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Извлечь звуковую дорожку видео в `output`
    async fn extract_audio(&self, video: &Path, output: &Path) -> CollabResult<PathBuf>;

    /// Собрать видео из исходной картинки, звука и необязательных субтитров
    async fn mux(&self, request: MuxRequest<'_>) -> CollabResult<PathBuf>;

    /// Длительность медиафайла, секунды
    async fn probe_duration(&self, media: &Path) -> CollabResult<f64>;
}

/// Распознаватель речи
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn transcribe(&self, audio: &Path, mode: RecognitionMode) -> CollabResult<Transcription>;
}

/// Переводчик
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source_language: &str, target_language: &str) -> CollabResult<String>;
}

/// Литературная редактура перевода перед синтезом
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, text: &str, language: &str) -> CollabResult<String>;
}

/// Синтезатор речи. Возвращает закодированное аудио (MP3, WAV и т.п.).
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, sample_rate: u32) -> CollabResult<Bytes>;
}

/// Набор внешних сервисов конвейера
#[derive(Clone)]
pub struct Collaborators {
    pub downloader: Arc<dyn Downloader>,
    pub transcoder: Arc<dyn Transcoder>,
    pub recognizer: Arc<dyn Recognizer>,
    pub translator: Arc<dyn Translator>,
    pub rewriter: Arc<dyn Rewriter>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Collaborators {
    /// yt-dlp, ffmpeg и OpenAI для распознавания, перевода, редактуры и синтеза
    pub fn from_config(config: &DubSyncConfig) -> Result<Self> {
        let openai = Arc::new(OpenAiClient::new(config)?);
        Ok(Self {
            downloader: Arc::new(YtDlpDownloader::default()),
            transcoder: Arc::new(FfmpegTranscoder::default()),
            recognizer: openai.clone(),
            translator: openai.clone(),
            rewriter: openai.clone(),
            synthesizer: openai,
        })
    }
}

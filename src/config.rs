//! Модуль конфигурации библиотеки dub-sync
//!
//! Этот модуль содержит структуры и перечисления для настройки конвейера
//! дубляжа и синхронизатора сегментов.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DubSyncError, Result};
use crate::subtitle::CaptionFormat;

/// Модель TTS для использования с OpenAI API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TtsModel {
    /// Стандартная модель
    #[default]
    Standard,
    /// Модель высокого качества
    HighDefinition,
}

impl TtsModel {
    /// Получить строковое представление модели
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "tts-1",
            Self::HighDefinition => "tts-1-hd",
        }
    }
}

/// Голос для использования с OpenAI API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TtsVoice {
    Alloy,
    Echo,
    Fable,
    Onyx,
    #[default]
    Nova,
    Shimmer,
}

impl TtsVoice {
    /// Получить строковое представление голоса
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Onyx => "onyx",
            Self::Nova => "nova",
            Self::Shimmer => "shimmer",
        }
    }
}

/// Параметры подгонки длительности сегментов
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    /// Допустимое расхождение длительностей без изменения темпа, секунды
    pub stretch_tolerance: f64,
    /// Фрагменты короче этого значения не растягиваются, секунды
    pub min_stretch_duration: f64,
    /// Минимальный коэффициент растяжения (target / actual)
    pub min_stretch_ratio: f64,
    /// Максимальный коэффициент растяжения (target / actual)
    pub max_stretch_ratio: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            stretch_tolerance: 0.05,
            min_stretch_duration: 0.1,
            min_stretch_ratio: 0.3,
            max_stretch_ratio: 3.0,
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DubSyncConfig {
    /// API ключ для OpenAI
    pub openai_api_key: String,
    /// Базовый адрес OpenAI-совместимого API
    pub openai_base_url: String,
    /// Модель распознавания речи
    pub transcription_model: String,
    /// Модель для перевода и редактуры текста
    pub chat_model: String,
    /// Модель TTS
    pub tts_model: TtsModel,
    /// Голос TTS
    pub tts_voice: TtsVoice,
    /// Язык оригинала
    pub source_language: String,
    /// Язык дубляжа
    pub target_language: String,
    /// Частота дискретизации итоговой дорожки
    pub sample_rate: u32,
    /// Максимальное количество одновременных запросов к API в рамках задачи
    pub max_concurrent_requests: usize,
    /// Максимальное количество одновременно выполняемых задач
    pub max_concurrent_tasks: usize,
    /// Тайм-аут одного обращения к внешнему сервису, секунды
    pub call_timeout_secs: Option<u64>,
    /// Директория для временных файлов задач
    pub work_dir: PathBuf,
    /// Директория для готовых видео
    pub output_dir: PathBuf,
    /// Удалять временные файлы после завершения
    pub cleanup_temp_files: bool,
    /// Формат файла субтитров, передаваемого в сборку
    pub caption_format: CaptionFormat,
    /// Параметры синхронизации сегментов
    pub sync: SyncSettings,
}

impl Default for DubSyncConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            transcription_model: "whisper-1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            tts_model: TtsModel::default(),
            tts_voice: TtsVoice::default(),
            source_language: "en".to_string(),
            target_language: "zh".to_string(),
            sample_rate: 48_000,
            max_concurrent_requests: 5,
            max_concurrent_tasks: 2,
            call_timeout_secs: None,
            work_dir: PathBuf::from("temp"),
            output_dir: PathBuf::from("outputs"),
            cleanup_temp_files: true,
            caption_format: CaptionFormat::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl DubSyncConfig {
    /// Собрать конфигурацию из переменных окружения поверх значений по умолчанию
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.openai_api_key = key;
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.openai_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(lang) = std::env::var("DUB_SYNC_SOURCE_LANG") {
            config.source_language = lang;
        }
        if let Ok(lang) = std::env::var("DUB_SYNC_TARGET_LANG") {
            config.target_language = lang;
        }
        if let Ok(dir) = std::env::var("DUB_SYNC_WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("DUB_SYNC_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(format) = std::env::var("DUB_SYNC_CAPTION_FORMAT") {
            config.caption_format = match format.trim().to_ascii_lowercase().as_str() {
                "srt" => CaptionFormat::Srt,
                "vtt" => CaptionFormat::Vtt,
                other => {
                    return Err(DubSyncError::Configuration(format!(
                        "DUB_SYNC_CAPTION_FORMAT must be 'srt' or 'vtt', got '{}'",
                        other
                    )))
                }
            };
        }
        if let Ok(timeout) = std::env::var("DUB_SYNC_CALL_TIMEOUT") {
            let secs = timeout.trim().parse::<u64>().map_err(|_| {
                DubSyncError::Configuration(format!(
                    "DUB_SYNC_CALL_TIMEOUT must be a number of seconds, got '{}'",
                    timeout
                ))
            })?;
            config.call_timeout_secs = Some(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Загрузить конфигурацию из JSON-файла
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DubSyncError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Проверить согласованность параметров
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(DubSyncError::Configuration("sample_rate must be positive".to_string()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(DubSyncError::Configuration(
                "max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(DubSyncError::Configuration(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        let sync = &self.sync;
        if !(sync.min_stretch_ratio > 0.0 && sync.min_stretch_ratio <= sync.max_stretch_ratio) {
            return Err(DubSyncError::Configuration(format!(
                "invalid stretch ratio range [{}, {}]",
                sync.min_stretch_ratio, sync.max_stretch_ratio
            )));
        }
        if sync.stretch_tolerance < 0.0 || sync.min_stretch_duration < 0.0 {
            return Err(DubSyncError::Configuration(
                "stretch thresholds must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Тайм-аут обращения к внешнему сервису
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DubSyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.tts_voice.as_str(), "nova");
        assert!(config.call_timeout().is_none());
    }

    #[test]
    fn test_invalid_ratio_range_rejected() {
        let mut config = DubSyncConfig::default();
        config.sync.min_stretch_ratio = 2.0;
        config.sync.max_stretch_ratio = 1.0;
        assert!(matches!(config.validate(), Err(DubSyncError::Configuration(_))));
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "target_language": "ru", "caption_format": "vtt", "sync": { "max_stretch_ratio": 2.0 } }"#)
            .unwrap();

        let config = DubSyncConfig::from_file(&path).unwrap();
        assert_eq!(config.target_language, "ru");
        assert_eq!(config.sync.max_stretch_ratio, 2.0);
        assert_eq!(config.sync.stretch_tolerance, 0.05);
        assert_eq!(config.max_concurrent_requests, 5);
        assert_eq!(config.caption_format, CaptionFormat::Vtt);
    }
}

//! # OpenAI
//!
//! Распознавание (Whisper), перевод и редактура (chat completions) и синтез
//! речи (`/audio/speech`) через OpenAI-совместимый API.

mod speech;
mod transcribe;
mod translate;

use reqwest::{Client, Response};
use serde_json::Value;

use crate::config::{DubSyncConfig, TtsModel, TtsVoice};
use crate::error::{Collaborator, CollaboratorError, DubSyncError, Result};

use super::CollabResult;

/// Клиент OpenAI API. Реализует [`Recognizer`](super::Recognizer),
/// [`Translator`](super::Translator), [`Rewriter`](super::Rewriter)
/// и [`Synthesizer`](super::Synthesizer).
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    transcription_model: String,
    chat_model: String,
    tts_model: TtsModel,
    tts_voice: TtsVoice,
    source_language: String,
}

impl OpenAiClient {
    pub fn new(config: &DubSyncConfig) -> Result<Self> {
        if config.openai_api_key.trim().is_empty() {
            log::error!("OpenAI API key is empty");
            return Err(DubSyncError::Configuration(
                "OpenAI API key is required (set OPENAI_API_KEY)".to_string(),
            ));
        }

        let http = Client::builder()
            .build()
            .map_err(|e| DubSyncError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        log::info!("OpenAI configuration:");
        log::info!("  Transcription model: {}", config.transcription_model);
        log::info!("  Chat model: {}", config.chat_model);
        log::info!("  TTS model: {}, voice: {}", config.tts_model.as_str(), config.tts_voice.as_str());

        Ok(Self {
            http,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            transcription_model: config.transcription_model.clone(),
            chat_model: config.chat_model.clone(),
            tts_model: config.tts_model.clone(),
            tts_voice: config.tts_voice.clone(),
            source_language: config.source_language.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

/// Ошибка отправки запроса или чтения ответа
fn request_error(collaborator: Collaborator, e: reqwest::Error) -> CollaboratorError {
    log::error!("{} request failed: {}", collaborator, e);
    CollaboratorError::Request(collaborator, e.to_string())
}

/// Пропускает успешный ответ, иначе возвращает ошибку сервиса с текстом из тела
async fn check_response(collaborator: Collaborator, response: Response) -> CollabResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(text) => text,
        Err(e) => format!("Failed to read error response: {}", e),
    };
    let message = error_message(&body);
    log::error!("OpenAI API error for {} (status {}): {}", collaborator, status, message);

    Err(CollaboratorError::Service {
        collaborator,
        status: status.as_u16(),
        body: message,
    })
}

/// Извлекает `error.message` из тела ответа OpenAI, если оно там есть
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

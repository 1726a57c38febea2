use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::{debug, info};
use serde::Serialize;

use super::{check_response, request_error, OpenAiClient};
use crate::collab::{CollabResult, Synthesizer};
use crate::error::{Collaborator, CollaboratorError};
use crate::utils::text::{prepare_text_for_tts, split_for_synthesis};

const SYNTHESIZER: Collaborator = Collaborator::Synthesizer;

/// Ограничение `/audio/speech` на длину входного текста
const MAX_INPUT_CHARS: usize = 4096;

/// Параметры запроса к API OpenAI TTS
#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

impl OpenAiClient {
    async fn speech_chunk(&self, input: &str) -> CollabResult<Bytes> {
        let request = SpeechRequest {
            model: self.tts_model.as_str(),
            input,
            voice: self.tts_voice.as_str(),
            response_format: "mp3",
        };

        let response = self
            .http
            .post(self.endpoint("audio/speech"))
            .header("Authorization", self.bearer())
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(SYNTHESIZER, e))?;
        let response = check_response(SYNTHESIZER, response).await?;
        response.bytes().await.map_err(|e| request_error(SYNTHESIZER, e))
    }
}

#[async_trait]
impl Synthesizer for OpenAiClient {
    /// Синтезирует MP3. Частота дискретизации ответа фиксирована сервисом,
    /// приведение к `sample_rate` выполняется при декодировании.
    async fn synthesize(&self, text: &str, sample_rate: u32) -> CollabResult<Bytes> {
        let prepared = prepare_text_for_tts(text);
        if prepared.is_empty() {
            return Err(CollaboratorError::Empty(SYNTHESIZER, "nothing to synthesize".to_string()));
        }

        let chunks = split_for_synthesis(&prepared, MAX_INPUT_CHARS);
        debug!(
            "Synthesizing {} chars in {} request(s), target rate {} Hz",
            prepared.chars().count(),
            chunks.len(),
            sample_rate
        );

        // MP3-кадры самодостаточны, ответы можно склеивать подряд
        let mut audio = BytesMut::new();
        for chunk in &chunks {
            let part = self.speech_chunk(chunk).await?;
            audio.extend_from_slice(&part);
        }

        if audio.is_empty() {
            return Err(CollaboratorError::Empty(SYNTHESIZER, "speech response has no audio".to_string()));
        }
        if chunks.len() > 1 {
            info!("Joined {} speech responses, {} bytes", chunks.len(), audio.len());
        }
        Ok(audio.freeze())
    }
}

use std::path::Path;

use async_trait::async_trait;
use log::info;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::{check_response, request_error, OpenAiClient};
use crate::collab::{CollabResult, RecognitionMode, Recognizer, TranscriptSegment, Transcription};
use crate::error::{Collaborator, CollaboratorError};

const RECOGNIZER: Collaborator = Collaborator::Recognizer;

/// Ответ Whisper в формате `verbose_json`
#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

/// Ответ Whisper в формате `json`
#[derive(Debug, Deserialize)]
struct PlainTranscription {
    text: String,
}

fn segmented(response: VerboseTranscription) -> Transcription {
    let segments = response
        .segments
        .into_iter()
        .filter(|segment| !segment.text.trim().is_empty())
        .enumerate()
        .map(|(index, segment)| TranscriptSegment {
            index,
            start: segment.start.max(0.0),
            end: segment.end.max(0.0),
            source_text: segment.text.trim().to_string(),
            translated_text: None,
        })
        .collect();
    Transcription::Segmented {
        text: response.text.trim().to_string(),
        segments,
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("wav") => "audio/wav",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("webm") => "audio/webm",
        _ => "audio/mpeg",
    }
}

#[async_trait]
impl Recognizer for OpenAiClient {
    async fn transcribe(&self, audio: &Path, mode: RecognitionMode) -> CollabResult<Transcription> {
        let data = tokio::fs::read(audio)
            .await
            .map_err(|e| CollaboratorError::Io(RECOGNIZER, e))?;
        info!(
            "Sending {} ({} bytes) for transcription, mode {:?}",
            audio.display(),
            data.len(),
            mode
        );

        let file_name = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();
        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str(mime_for(audio))
            .map_err(|e| request_error(RECOGNIZER, e))?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.transcription_model.clone())
            .text("language", self.source_language.clone());
        form = match mode {
            RecognitionMode::Timestamped => form
                .text("response_format", "verbose_json")
                .text("timestamp_granularities[]", "segment"),
            RecognitionMode::Plain => form.text("response_format", "json"),
        };

        let response = self
            .http
            .post(self.endpoint("audio/transcriptions"))
            .header("Authorization", self.bearer())
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_error(RECOGNIZER, e))?;
        let response = check_response(RECOGNIZER, response).await?;

        let transcription = match mode {
            RecognitionMode::Timestamped => {
                let body: VerboseTranscription =
                    response.json().await.map_err(|e| request_error(RECOGNIZER, e))?;
                segmented(body)
            }
            RecognitionMode::Plain => {
                let body: PlainTranscription =
                    response.json().await.map_err(|e| request_error(RECOGNIZER, e))?;
                Transcription::Plain {
                    text: body.text.trim().to_string(),
                }
            }
        };

        info!(
            "Transcription complete: {} chars, {} segments",
            transcription.text().len(),
            transcription.segments().map_or(0, |s| s.len())
        );
        Ok(transcription)
    }
}

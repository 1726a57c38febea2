//! Заглушки внешних сервисов для сценарных тестов

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::collab::{
    CollabResult, Collaborators, Downloader, MuxRequest, RecognitionMode, Recognizer, Rewriter, Synthesizer,
    Transcoder, TranscriptSegment, Transcription, Translator,
};
use crate::config::DubSyncConfig;
use crate::error::{Collaborator, CollaboratorError};
use crate::media::{self, AudioBuffer};

/// Частота, на которой «синтезатор» отдает речь
pub const VOICE_RATE: u32 = 24_000;
/// Частота итоговой дорожки в тестах
pub const TRACK_RATE: u32 = 48_000;

pub fn segment(index: usize, start: f64, end: f64, text: &str) -> TranscriptSegment {
    TranscriptSegment {
        index,
        start,
        end,
        source_text: text.to_string(),
        translated_text: None,
    }
}

/// Сегменты сценариев A и B: окна 2.0 + 1.0 + 2.5 секунды
pub fn three_segments() -> Vec<TranscriptSegment> {
    vec![
        segment(0, 0.0, 2.0, "first line"),
        segment(1, 2.0, 3.0, "second line"),
        segment(2, 3.0, 5.5, "third line"),
    ]
}

/// Тон 220 Гц заданной длительности
pub fn tone(seconds: f64, rate: u32) -> AudioBuffer {
    let len = media::samples_for(seconds, rate);
    let step = 2.0 * std::f32::consts::PI * 220.0 / rate as f32;
    AudioBuffer::new((0..len).map(|i| (i as f32 * step).sin() * 0.5).collect(), rate)
}

pub fn test_config(root: &Path) -> DubSyncConfig {
    DubSyncConfig {
        openai_api_key: "sk-test".to_string(),
        sample_rate: TRACK_RATE,
        work_dir: root.join("temp"),
        output_dir: root.join("outputs"),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct MockDownloader {
    pub fail: bool,
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn fetch(&self, url: &str, destination: &Path) -> CollabResult<PathBuf> {
        if self.fail {
            return Err(CollaboratorError::Process(
                Collaborator::Downloader,
                format!("unsupported URL: {}", url),
            ));
        }
        let path = destination.with_extension("mp4");
        tokio::fs::write(&path, b"fake video")
            .await
            .map_err(|e| CollaboratorError::Io(Collaborator::Downloader, e))?;
        Ok(path)
    }
}

/// Что транскодер получил на сборку. Файлы читаются сразу, так как после
/// задачи временные файлы удаляются.
#[derive(Debug, Clone)]
pub struct MuxCall {
    pub video: PathBuf,
    pub audio: PathBuf,
    /// Декодированная дорожка, если это WAV
    pub track: Option<AudioBuffer>,
    pub captions: Option<String>,
    pub output: PathBuf,
}

pub struct MockTranscoder {
    pub duration: f64,
    pub fail_mux: bool,
    pub mux_calls: Mutex<Vec<MuxCall>>,
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self {
            duration: 5.5,
            fail_mux: false,
            mux_calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockTranscoder {
    pub fn last_mux(&self) -> Option<MuxCall> {
        self.mux_calls.lock().last().cloned()
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn extract_audio(&self, video: &Path, output: &Path) -> CollabResult<PathBuf> {
        if !video.exists() {
            return Err(CollaboratorError::Process(
                Collaborator::Transcoder,
                format!("{} does not exist", video.display()),
            ));
        }
        std::fs::write(output, b"fake mp3").map_err(|e| CollaboratorError::Io(Collaborator::Transcoder, e))?;
        Ok(output.to_path_buf())
    }

    async fn mux(&self, request: MuxRequest<'_>) -> CollabResult<PathBuf> {
        if self.fail_mux {
            return Err(CollaboratorError::Process(Collaborator::Transcoder, "disk full".to_string()));
        }
        let track = if request.audio.extension().map_or(false, |ext| ext == "wav") {
            Some(media::decode_audio_file(request.audio).map_err(|e| {
                CollaboratorError::Process(Collaborator::Transcoder, e.to_string())
            })?)
        } else {
            None
        };
        let captions = request.captions.map(|path| std::fs::read_to_string(path).unwrap_or_default());

        std::fs::write(request.output, b"fake output").map_err(|e| CollaboratorError::Io(Collaborator::Transcoder, e))?;
        self.mux_calls.lock().push(MuxCall {
            video: request.video.to_path_buf(),
            audio: request.audio.to_path_buf(),
            track,
            captions,
            output: request.output.to_path_buf(),
        });
        Ok(request.output.to_path_buf())
    }

    async fn probe_duration(&self, _media: &Path) -> CollabResult<f64> {
        Ok(self.duration)
    }
}

pub struct MockRecognizer {
    pub segments: Vec<TranscriptSegment>,
    pub delay: Option<Duration>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockRecognizer {
    pub fn new(segments: Vec<TranscriptSegment>) -> Self {
        Self {
            segments,
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn transcribe(&self, _audio: &Path, mode: RecognitionMode) -> CollabResult<Transcription> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let text = self
            .segments
            .iter()
            .map(|s| s.source_text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(match mode {
            RecognitionMode::Plain => Transcription::Plain { text },
            RecognitionMode::Timestamped => Transcription::Segmented {
                text,
                segments: self.segments.clone(),
            },
        })
    }
}

/// Переводит, добавляя префикс; тексты из `fail_on` не переводятся
#[derive(Default)]
pub struct MockTranslator {
    pub fail_on: Vec<String>,
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str, _source: &str, target: &str) -> CollabResult<String> {
        if self.fail_on.iter().any(|needle| text.contains(needle.as_str())) {
            return Err(CollaboratorError::Service {
                collaborator: Collaborator::Translator,
                status: 429,
                body: "quota exceeded".to_string(),
            });
        }
        Ok(format!("[{}] {}", target, text))
    }
}

pub struct MockRewriter;

#[async_trait]
impl Rewriter for MockRewriter {
    async fn rewrite(&self, text: &str, _language: &str) -> CollabResult<String> {
        Ok(format!("{} (polished)", text))
    }
}

/// Синтезирует тон: длительность определяется первым совпавшим правилом,
/// `None` означает отказ синтеза
pub struct MockSynthesizer {
    pub rules: Vec<(String, Option<f64>)>,
    pub default_duration: f64,
    pub calls: AtomicUsize,
}

impl MockSynthesizer {
    pub fn new(rules: &[(&str, Option<f64>)]) -> Self {
        Self {
            rules: rules.iter().map(|(needle, d)| (needle.to_string(), *d)).collect(),
            default_duration: 1.0,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, _sample_rate: u32) -> CollabResult<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let duration = self
            .rules
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map_or(Some(self.default_duration), |(_, d)| *d);

        let Some(duration) = duration else {
            return Err(CollaboratorError::Empty(Collaborator::Synthesizer, format!("no audio for '{}'", text)));
        };
        let wav = media::encode_wav_bytes(&tone(duration, VOICE_RATE))
            .map_err(|e| CollaboratorError::Process(Collaborator::Synthesizer, e.to_string()))?;
        Ok(Bytes::from(wav))
    }
}

/// Набор заглушек с доступом к каждой из них
pub struct MockSet {
    pub downloader: Arc<MockDownloader>,
    pub transcoder: Arc<MockTranscoder>,
    pub recognizer: Arc<MockRecognizer>,
    pub translator: Arc<MockTranslator>,
    pub synthesizer: Arc<MockSynthesizer>,
}

impl MockSet {
    pub fn new(recognizer: MockRecognizer, synthesizer: MockSynthesizer) -> Self {
        Self {
            downloader: Arc::new(MockDownloader::default()),
            transcoder: Arc::new(MockTranscoder::default()),
            recognizer: Arc::new(recognizer),
            translator: Arc::new(MockTranslator::default()),
            synthesizer: Arc::new(synthesizer),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            downloader: self.downloader.clone(),
            transcoder: self.transcoder.clone(),
            recognizer: self.recognizer.clone(),
            translator: self.translator.clone(),
            rewriter: Arc::new(MockRewriter),
            synthesizer: self.synthesizer.clone(),
        }
    }
}

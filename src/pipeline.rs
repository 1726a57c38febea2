//! # Pipeline Orchestrator
//!
//! Последовательность этапов одной задачи дубляжа:
//!
//! 1. получение видео (загрузка или готовый файл);
//! 2. извлечение звуковой дорожки;
//! 3. распознавание речи: с временными метками, если нужны субтитры,
//!    иначе одним текстом;
//! 4. перевод: посегментно (ошибка сегмента заменяется исходным текстом)
//!    или целиком с последующей редактурой;
//! 5. синтез: посегментно с выравниванием по окнам и субтитрами,
//!    или одним фрагментом;
//! 6. сборка итогового видео без перекодирования картинки.
//!
//! Этапы выполняются строго по порядку. Ошибка этапа завершает задачу,
//! ошибка отдельного сегмента превращается в предупреждение.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::collab::{
    CollabResult, Collaborators, MuxRequest, RecognitionMode, TranscriptSegment, Transcription,
};
use crate::config::DubSyncConfig;
use crate::error::{Collaborator, CollaboratorError, DubSyncError, Result, SegmentError};
use crate::media::{self, AudioBuffer};
use crate::progress::{PipelineStage, ProgressReporter};
use crate::subtitle::CaptionTrack;
use crate::sync::{SegmentAudio, SegmentSynchronizer};
use crate::task::{AudioMode, SegmentWarning, SourceDescriptor, TaskId, TaskOptions};
use crate::utils::workspace::TaskWorkspace;

/// Все, что рабочий процесс знает о своей задаче
#[derive(Clone)]
pub struct TaskContext {
    pub source: SourceDescriptor,
    pub options: TaskOptions,
    pub reporter: ProgressReporter,
    pub cancel: CancellationToken,
}

impl TaskContext {
    pub fn id(&self) -> &TaskId {
        self.reporter.task_id()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(DubSyncError::Cancelled(self.id().clone()));
        }
        Ok(())
    }
}

/// Результат этапов перевода и синтеза
struct DubbedMedia {
    /// Синтезированная дорожка; `None` в режиме сохранения оригинального звука
    audio: Option<PathBuf>,
    captions: Option<PathBuf>,
}

/// Конвейер дубляжа
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<DubSyncConfig>,
    collaborators: Collaborators,
}

impl Pipeline {
    pub fn new(config: Arc<DubSyncConfig>, collaborators: Collaborators) -> Self {
        Self { config, collaborators }
    }

    pub fn config(&self) -> &DubSyncConfig {
        &self.config
    }

    /// Выполняет задачу целиком и фиксирует итог в ее записи.
    ///
    /// Возвращает путь к готовому видео. При любой ошибке запись задачи
    /// переводится в Failed с текстом ошибки, а временные файлы удаляются
    /// (если это разрешено конфигурацией).
    pub async fn run(&self, ctx: &TaskContext) -> Result<PathBuf> {
        let workspace = TaskWorkspace::new(ctx.id().clone(), &self.config.work_dir, &self.config.output_dir);

        let outcome = match ctx.reporter.start() {
            Ok(_) => self.execute(ctx, &workspace).await,
            Err(e) => Err(e),
        };
        let outcome = outcome.and_then(|path| ctx.reporter.complete(path.clone()).map(|_| path));

        if let Err(e) = &outcome {
            if let Err(report_error) = ctx.reporter.fail(e) {
                error!("[{}] Failed to record task failure: {}", ctx.id(), report_error);
            }
        }

        if self.config.cleanup_temp_files {
            let mut preserve: Vec<&Path> = Vec::new();
            if let SourceDescriptor::LocalFile { path } = &ctx.source {
                preserve.push(path);
            }
            if let Ok(path) = &outcome {
                preserve.push(path);
            }
            let removed = workspace.cleanup(&preserve).await;
            debug!("[{}] Cleanup removed {} temporary files", ctx.id(), removed);
        }

        outcome
    }

    async fn execute(&self, ctx: &TaskContext, workspace: &TaskWorkspace) -> Result<PathBuf> {
        workspace.prepare().await?;

        let video = self.acquire(ctx, workspace).await?;
        let source_audio = self.extract_audio(ctx, workspace, &video).await?;

        let mode = if ctx.options.captioning {
            RecognitionMode::Timestamped
        } else {
            RecognitionMode::Plain
        };
        let transcription = self.recognize(ctx, &source_audio, mode).await?;

        let dubbed = match transcription {
            Transcription::Segmented { text, segments } => {
                self.dub_segments(ctx, workspace, text, segments).await?
            }
            Transcription::Plain { text } => {
                if ctx.options.captioning {
                    warn!("[{}] Recognizer returned no segments, captions are skipped", ctx.id());
                }
                self.dub_whole(ctx, workspace, text).await?
            }
        };

        let audio = dubbed.audio.unwrap_or(source_audio);
        self.mux(ctx, workspace, &video, &audio, dubbed.captions.as_deref()).await
    }

    /// Этап 1: получение видео
    async fn acquire(&self, ctx: &TaskContext, workspace: &TaskWorkspace) -> Result<PathBuf> {
        let stage = PipelineStage::Acquire;
        ctx.ensure_active()?;
        ctx.reporter.begin(stage)?;

        let video = match &ctx.source {
            SourceDescriptor::Remote { url } => {
                let downloader = &self.collaborators.downloader;
                let stem = workspace.raw_video_stem();
                self.call(ctx, Collaborator::Downloader, downloader.fetch(url, &stem))
                    .await?
            }
            SourceDescriptor::LocalFile { path } => {
                let meta = tokio::fs::metadata(path).await.map_err(|e| {
                    DubSyncError::Resource(format!("Input file {} is not accessible: {}", path.display(), e))
                })?;
                if !meta.is_file() || meta.len() == 0 {
                    return Err(DubSyncError::Resource(format!(
                        "Input file {} is empty or not a regular file",
                        path.display()
                    )));
                }
                path.clone()
            }
        };

        info!("[{}] Video ready: {}", ctx.id(), video.display());
        ctx.reporter.finish(stage)?;
        Ok(video)
    }

    /// Этап 2: извлечение звуковой дорожки
    async fn extract_audio(&self, ctx: &TaskContext, workspace: &TaskWorkspace, video: &Path) -> Result<PathBuf> {
        let stage = PipelineStage::ExtractAudio;
        ctx.ensure_active()?;
        ctx.reporter.begin(stage)?;

        let transcoder = &self.collaborators.transcoder;
        let target = workspace.source_audio_path();
        let audio = self
            .call(ctx, Collaborator::Transcoder, transcoder.extract_audio(video, &target))
            .await?;

        let duration = self
            .call(ctx, Collaborator::Transcoder, transcoder.probe_duration(&audio))
            .await?;
        if duration.is_nan() || duration <= 0.0 {
            return Err(DubSyncError::NoInput {
                stage: "audio extraction",
                reason: format!("extracted track {} has no duration", audio.display()),
            });
        }

        info!("[{}] Extracted {:.2}s of audio to {}", ctx.id(), duration, audio.display());
        ctx.reporter.finish(stage)?;
        Ok(audio)
    }

    /// Этап 3: распознавание речи
    async fn recognize(&self, ctx: &TaskContext, audio: &Path, mode: RecognitionMode) -> Result<Transcription> {
        let stage = PipelineStage::Recognize;
        ctx.ensure_active()?;
        ctx.reporter.begin(stage)?;

        let recognizer = &self.collaborators.recognizer;
        let transcription = self
            .call(ctx, Collaborator::Recognizer, recognizer.transcribe(audio, mode))
            .await?;

        let usable = match &transcription {
            Transcription::Plain { text } => !text.trim().is_empty(),
            Transcription::Segmented { segments, .. } => !segments.is_empty(),
        };
        if !usable {
            return Err(DubSyncError::NoInput {
                stage: "recognition",
                reason: "no speech was recognized".to_string(),
            });
        }

        ctx.reporter.record_transcript(transcription.text().to_string())?;
        ctx.reporter.finish(stage)?;
        Ok(transcription)
    }

    /// Этапы 4-5 для сегментов с временными метками
    async fn dub_segments(
        &self,
        ctx: &TaskContext,
        workspace: &TaskWorkspace,
        text: String,
        mut segments: Vec<TranscriptSegment>,
    ) -> Result<DubbedMedia> {
        segments.sort_by_key(|segment| segment.index);
        debug!(
            "[{}] {} segments, transcript of {} chars",
            ctx.id(),
            segments.len(),
            text.chars().count()
        );

        let stage = PipelineStage::Translate;
        ctx.ensure_active()?;
        ctx.reporter.begin(stage)?;
        let warnings = self.translate_segments(ctx, &mut segments).await?;
        ctx.reporter.record_warnings(warnings)?;
        let translated = segments
            .iter()
            .filter(|segment| segment.has_window())
            .map(|segment| segment.display_text().trim())
            .collect::<Vec<_>>()
            .join("\n");
        ctx.reporter.record_translation(translated)?;
        ctx.reporter.finish(stage)?;

        let captions = if ctx.options.captioning {
            let track = CaptionTrack::from_segments(&segments);
            if track.is_empty() {
                warn!("[{}] No segment has a time window, captions are skipped", ctx.id());
                None
            } else {
                let format = self.config.caption_format;
                Some(track.write_to(workspace.subtitle_path(format), format).await?)
            }
        } else {
            None
        };

        let audio = match ctx.options.audio_mode {
            AudioMode::KeepOriginal => {
                info!("[{}] Keeping original audio, synthesis skipped", ctx.id());
                None
            }
            AudioMode::Replace => Some(self.synthesize_segments(ctx, workspace, &segments).await?),
        };

        Ok(DubbedMedia { audio, captions })
    }

    /// Перевод сегментов с ограничением числа одновременных запросов.
    /// Сегмент, который не удалось перевести, озвучивается исходным текстом.
    async fn translate_segments(
        &self,
        ctx: &TaskContext,
        segments: &mut [TranscriptSegment],
    ) -> Result<Vec<SegmentWarning>> {
        let stage = PipelineStage::Translate;
        let config = &self.config;
        let limit = config.call_timeout();
        let translator = &self.collaborators.translator;
        let semaphore = &Semaphore::new(config.max_concurrent_requests);
        let completed = &AtomicUsize::new(0);

        let pending: Vec<(usize, String)> = segments
            .iter()
            .filter(|segment| segment.has_window() && !segment.source_text.trim().is_empty())
            .map(|segment| (segment.index, segment.source_text.clone()))
            .collect();
        let total = pending.len();

        let translations = pending.iter().map(|(index, source)| async move {
            let result: std::result::Result<String, SegmentError> = async {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| SegmentError::Translation(e.to_string()))?;
                with_timeout(
                    limit,
                    Collaborator::Translator,
                    translator.translate(source, &config.source_language, &config.target_language),
                )
                .await
                .map_err(|e| SegmentError::Translation(e.to_string()))
            }
            .await;

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            report(ctx.reporter.advance(stage, done, total, format!("Translated {}/{} segments", done, total)));
            (*index, result)
        });
        let results = self.cancellable(ctx, join_all(translations)).await?;

        let mut warnings = Vec::new();
        for (index, result) in results {
            let Some(segment) = segments.iter_mut().find(|segment| segment.index == index) else {
                continue;
            };
            match result {
                Ok(translation) if !translation.trim().is_empty() => {
                    segment.translated_text = Some(translation);
                }
                Ok(_) => {
                    let error = SegmentError::Translation("empty translation".to_string());
                    warnings.push(SegmentWarning::from_error(index, &error));
                }
                Err(error) => {
                    warn!("[{}] Segment {} keeps source text: {}", ctx.id(), index, error);
                    warnings.push(SegmentWarning::from_error(index, &error));
                }
            }
        }

        info!(
            "[{}] Translated {} of {} segments",
            ctx.id(),
            total - warnings.len(),
            total
        );
        Ok(warnings)
    }

    /// Синтез сегментов и сборка выровненной дорожки
    async fn synthesize_segments(
        &self,
        ctx: &TaskContext,
        workspace: &TaskWorkspace,
        segments: &[TranscriptSegment],
    ) -> Result<PathBuf> {
        let stage = PipelineStage::Synthesize;
        ctx.ensure_active()?;
        ctx.reporter.begin(stage)?;

        let config = &self.config;
        let rate = config.sample_rate;
        let limit = config.call_timeout();
        let synthesizer = &self.collaborators.synthesizer;
        let semaphore = &Semaphore::new(config.max_concurrent_requests);
        let completed = &AtomicUsize::new(0);
        let total = segments.iter().filter(|segment| segment.has_window()).count();

        let voices = segments.iter().map(|segment| async move {
            if !segment.has_window() {
                return SegmentAudio::voiced(segment.index, 0.0, AudioBuffer::silence(0, rate));
            }

            let audio: std::result::Result<AudioBuffer, SegmentError> = async {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| SegmentError::Synthesis(e.to_string()))?;
                let encoded = with_timeout(
                    limit,
                    Collaborator::Synthesizer,
                    synthesizer.synthesize(segment.display_text(), rate),
                )
                .await
                .map_err(|e| SegmentError::Synthesis(e.to_string()))?;
                media::decode_bytes(&encoded, None).map_err(|e| SegmentError::Decode(e.to_string()))
            }
            .await;

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            report(ctx.reporter.advance(stage, done, total, format!("Synthesized {}/{} segments", done, total)));
            SegmentAudio {
                index: segment.index,
                target_duration: segment.target_duration(),
                audio,
            }
        });
        let voiced = self.cancellable(ctx, join_all(voices)).await?;

        let warnings: Vec<SegmentWarning> = voiced
            .iter()
            .filter_map(|segment| segment.audio.as_ref().err().map(|e| SegmentWarning::from_error(segment.index, e)))
            .collect();
        ctx.reporter.record_warnings(warnings)?;

        let synchronizer = SegmentSynchronizer::new(rate, config.sync.clone());
        let output = workspace.synthesized_audio_path();
        let track = tokio::task::spawn_blocking(move || synchronizer.synchronize(voiced)?.write_wav(output))
            .await
            .map_err(|e| DubSyncError::Audio(format!("Synchronization task failed: {}", e)))??;

        ctx.ensure_active()?;
        ctx.reporter.finish(stage)?;
        Ok(track)
    }

    /// Этапы 4-5 для цельного текста
    async fn dub_whole(&self, ctx: &TaskContext, workspace: &TaskWorkspace, text: String) -> Result<DubbedMedia> {
        let config = &self.config;

        let stage = PipelineStage::Translate;
        ctx.ensure_active()?;
        ctx.reporter.begin(stage)?;
        let translator = &self.collaborators.translator;
        let translated = self
            .call(
                ctx,
                Collaborator::Translator,
                translator.translate(&text, &config.source_language, &config.target_language),
            )
            .await?;
        ctx.reporter.record_translation(translated.clone())?;
        ctx.reporter.finish(stage)?;

        let stage = PipelineStage::Rewrite;
        ctx.ensure_active()?;
        ctx.reporter.begin(stage)?;
        let rewriter = &self.collaborators.rewriter;
        let optimized = self
            .call(ctx, Collaborator::Rewriter, rewriter.rewrite(&translated, &config.target_language))
            .await?;
        ctx.reporter.record_optimized(optimized.clone())?;
        ctx.reporter.finish(stage)?;

        let audio = match ctx.options.audio_mode {
            AudioMode::KeepOriginal => {
                info!("[{}] Keeping original audio, synthesis skipped", ctx.id());
                None
            }
            AudioMode::Replace => Some(self.synthesize_whole(ctx, workspace, &optimized).await?),
        };

        Ok(DubbedMedia { audio, captions: None })
    }

    /// Синтез цельного текста одним фрагментом без выравнивания
    async fn synthesize_whole(&self, ctx: &TaskContext, workspace: &TaskWorkspace, text: &str) -> Result<PathBuf> {
        let stage = PipelineStage::Synthesize;
        ctx.ensure_active()?;
        ctx.reporter.begin(stage)?;

        let rate = self.config.sample_rate;
        let synthesizer = &self.collaborators.synthesizer;
        let encoded = self
            .call(ctx, Collaborator::Synthesizer, synthesizer.synthesize(text, rate))
            .await?;

        let output = workspace.synthesized_audio_path();
        let path = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            let buffer = media::decode_bytes(&encoded, None)?.into_rate(rate)?;
            if buffer.is_empty() {
                return Err(DubSyncError::NoUsableAudio(1));
            }
            media::encode_wav(&buffer, &output)?;
            info!("Synthesized {:.2}s of speech", buffer.duration());
            Ok(output)
        })
        .await
        .map_err(|e| DubSyncError::Audio(format!("Decoding task failed: {}", e)))??;

        ctx.reporter.finish(stage)?;
        Ok(path)
    }

    /// Этап 6: сборка итогового видео
    async fn mux(
        &self,
        ctx: &TaskContext,
        workspace: &TaskWorkspace,
        video: &Path,
        audio: &Path,
        captions: Option<&Path>,
    ) -> Result<PathBuf> {
        let stage = PipelineStage::Mux;
        ctx.ensure_active()?;
        ctx.reporter.begin(stage)?;

        let output = workspace.output_path();
        let request = MuxRequest {
            video,
            audio,
            captions,
            caption_language: &self.config.target_language,
            output: &output,
        };
        let transcoder = &self.collaborators.transcoder;
        let path = self.call(ctx, Collaborator::Transcoder, transcoder.mux(request)).await?;

        ctx.reporter.finish(stage)?;
        Ok(path)
    }

    /// Вызов внешнего сервиса с тайм-аутом и отменой
    async fn call<T, F>(&self, ctx: &TaskContext, collaborator: Collaborator, call: F) -> Result<T>
    where
        F: Future<Output = CollabResult<T>>,
    {
        let limit = self.config.call_timeout();
        Ok(self.cancellable(ctx, with_timeout(limit, collaborator, call)).await??)
    }

    async fn cancellable<T, F>(&self, ctx: &TaskContext, work: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                info!("[{}] Cancellation requested", ctx.id());
                Err(DubSyncError::Cancelled(ctx.id().clone()))
            }
            value = work => Ok(value),
        }
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, collaborator: Collaborator, call: F) -> CollabResult<T>
where
    F: Future<Output = CollabResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            warn!("{} call timed out after {:?}", collaborator, limit);
            CollaboratorError::Timeout(collaborator, limit)
        })?,
        None => call.await,
    }
}

/// Промежуточный прогресс не влияет на исход задачи
fn report(update: Result<crate::task::TaskRecord>) {
    if let Err(e) = update {
        warn!("Failed to update progress: {}", e);
    }
}

//! # Segment Synchronizer
//!
//! Подгоняет синтезированную речь каждого сегмента точно под его временное
//! окно и склеивает сегменты в одну дорожку.
//!
//! Для каждого сегмента с успешным синтезом:
//! 1. Измеряется фактическая длительность буфера.
//! 2. Вычисляется коэффициент `target / actual`. Фрагменты короче
//!    `min_stretch_duration` и пустые окна не растягиваются.
//! 3. Если расхождение длительностей больше `stretch_tolerance`, темп
//!    меняется с сохранением высоты тона. Ошибка растяжения не прерывает
//!    сегмент: используется исходный буфер.
//! 4. Результат обрезается или дополняется тишиной до точной длины окна.
//!
//! Сегмент с неудачным синтезом превращается в тишину той же длины, поэтому
//! время всех последующих сегментов не сдвигается.

use std::ops::Range;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::SyncSettings;
use crate::error::{DubSyncError, Result, SegmentError};
use crate::media::{self, AudioBuffer};
use crate::sync::stretch;

/// Синтезированная речь одного сегмента вместе с его целевой длительностью
#[derive(Debug, Clone)]
pub struct SegmentAudio {
    pub index: usize,
    /// Длительность окна сегмента, секунды. Значения <= 0 означают пустое окно.
    pub target_duration: f64,
    pub audio: std::result::Result<AudioBuffer, SegmentError>,
}

impl SegmentAudio {
    pub fn voiced(index: usize, target_duration: f64, audio: AudioBuffer) -> Self {
        Self {
            index,
            target_duration,
            audio: Ok(audio),
        }
    }

    pub fn failed(index: usize, target_duration: f64, error: SegmentError) -> Self {
        Self {
            index,
            target_duration,
            audio: Err(error),
        }
    }
}

/// Что сегмент внес в дорожку
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitOutcome {
    /// Речь, подогнанная под окно
    Voiced,
    /// Тишина вместо неудавшегося сегмента
    Silence,
    /// Окно нулевой длины, сегмент ничего не вносит
    Empty,
}

/// Отчет о подгонке одного сегмента
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFit {
    pub index: usize,
    pub target_duration: f64,
    /// Длительность синтезированного буфера до подгонки
    pub actual_duration: Option<f64>,
    /// Примененный коэффициент растяжения (после ограничения)
    pub stretch_ratio: Option<f64>,
    /// Коэффициент был ограничен диапазоном из настроек
    pub ratio_clamped: bool,
    /// Растяжение не удалось, использован исходный буфер
    pub stretch_fallback: bool,
    /// Позиция сегмента в дорожке, семплы
    pub offset: usize,
    /// Длина сегмента в дорожке, семплы
    pub length: usize,
    pub outcome: FitOutcome,
}

impl SegmentFit {
    fn new(index: usize, target_duration: f64, length: usize, outcome: FitOutcome) -> Self {
        Self {
            index,
            target_duration,
            actual_duration: None,
            stretch_ratio: None,
            ratio_clamped: false,
            stretch_fallback: false,
            offset: 0,
            length,
            outcome,
        }
    }

    /// Диапазон семплов сегмента в дорожке
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.length
    }
}

/// Итоговая выровненная дорожка. Передается (перемещается) транскодеру.
#[derive(Debug)]
pub struct SynchronizedTrack {
    audio: AudioBuffer,
    fits: Vec<SegmentFit>,
}

impl SynchronizedTrack {
    pub fn audio(&self) -> &AudioBuffer {
        &self.audio
    }

    pub fn fits(&self) -> &[SegmentFit] {
        &self.fits
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    /// Длительность дорожки, секунды
    pub fn duration(&self) -> f64 {
        self.audio.duration()
    }

    /// Семплы сегмента с заданным индексом
    pub fn segment_samples(&self, index: usize) -> Option<&[f32]> {
        self.fits
            .iter()
            .find(|fit| fit.index == index)
            .map(|fit| &self.audio.samples[fit.range()])
    }

    /// Количество сегментов, заполненных тишиной
    pub fn silent_segments(&self) -> usize {
        self.fits.iter().filter(|fit| fit.outcome == FitOutcome::Silence).count()
    }

    pub fn into_buffer(self) -> AudioBuffer {
        self.audio
    }

    /// Записать дорожку в WAV-файл
    pub fn write_wav(self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        media::encode_wav(&self.audio, path)?;
        Ok(path.to_path_buf())
    }
}

/// Синхронизатор сегментов
#[derive(Debug, Clone)]
pub struct SegmentSynchronizer {
    sample_rate: u32,
    settings: SyncSettings,
}

impl SegmentSynchronizer {
    /// Создает синхронизатор для дорожки с частотой `sample_rate`
    pub fn new(sample_rate: u32, settings: SyncSettings) -> Self {
        Self { sample_rate, settings }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Подгоняет один сегмент под окно длиной `round(target * sample_rate)` семплов
    pub fn fit_segment(
        &self,
        index: usize,
        target_duration: f64,
        audio: std::result::Result<&AudioBuffer, &SegmentError>,
    ) -> (Vec<f32>, SegmentFit) {
        let length = media::samples_for(target_duration, self.sample_rate);
        self.fit_to_length(index, target_duration, length, audio)
    }

    fn fit_to_length(
        &self,
        index: usize,
        target_duration: f64,
        length: usize,
        audio: std::result::Result<&AudioBuffer, &SegmentError>,
    ) -> (Vec<f32>, SegmentFit) {
        if target_duration <= 0.0 || length == 0 {
            // Синтезированный звук пустого окна отбрасывается целиком
            return (Vec::new(), SegmentFit::new(index, target_duration, 0, FitOutcome::Empty));
        }

        let buffer = match audio {
            Ok(buffer) if !buffer.is_empty() => buffer,
            Ok(_) => {
                warn!("Segment {}: synthesized audio is empty, filling {:.3}s with silence", index, target_duration);
                return self.silence(index, target_duration, length);
            }
            Err(e) => {
                debug!("Segment {}: {}, filling {:.3}s with silence", index, e, target_duration);
                return self.silence(index, target_duration, length);
            }
        };

        let actual_duration = buffer.duration();
        let mut fit = SegmentFit::new(index, target_duration, length, FitOutcome::Voiced);
        fit.actual_duration = Some(actual_duration);

        let samples = if buffer.sample_rate == self.sample_rate {
            buffer.samples.clone()
        } else {
            match media::resample(&buffer.samples, buffer.sample_rate, self.sample_rate) {
                Ok(samples) => samples,
                Err(e) => {
                    warn!("Segment {}: cannot resample audio ({}), filling with silence", index, e);
                    return self.silence(index, target_duration, length);
                }
            }
        };

        let mut samples = if actual_duration > self.settings.min_stretch_duration
            && (actual_duration - target_duration).abs() > self.settings.stretch_tolerance
        {
            let requested = target_duration / actual_duration;
            let ratio = requested.clamp(self.settings.min_stretch_ratio, self.settings.max_stretch_ratio);
            if ratio != requested {
                info!(
                    "Segment {}: stretch ratio {:.3} clamped to {:.3}",
                    index, requested, ratio
                );
                fit.ratio_clamped = true;
            }
            fit.stretch_ratio = Some(ratio);

            match stretch::time_stretch(&samples, self.sample_rate, ratio) {
                Ok(stretched) => stretched,
                Err(e) => {
                    warn!("Segment {}: time-stretch failed ({}), using unstretched audio", index, e);
                    fit.stretch_fallback = true;
                    samples
                }
            }
        } else {
            samples
        };

        // Точная длина окна: обрезка или дополнение тишиной
        samples.resize(length, 0.0);

        debug!(
            "Segment {}: {:.3}s -> {:.3}s (ratio {:?}, {} samples)",
            index, actual_duration, target_duration, fit.stretch_ratio, length
        );
        (samples, fit)
    }

    fn silence(&self, index: usize, target_duration: f64, length: usize) -> (Vec<f32>, SegmentFit) {
        (
            vec![0.0; length],
            SegmentFit::new(index, target_duration, length, FitOutcome::Silence),
        )
    }

    /// Подгоняет все сегменты и склеивает их по порядку индексов.
    ///
    /// Длины сегментов считаются от накопленных границ окон, поэтому длина
    /// всей дорожки равна сумме целевых длительностей с точностью до
    /// половины семпла, а каждый сегмент отличается от своего окна
    /// меньше чем на один семпл.
    ///
    /// # Ошибки
    ///
    /// [`DubSyncError::NoUsableAudio`] если ни один сегмент не дал речи.
    pub fn synchronize(&self, mut segments: Vec<SegmentAudio>) -> Result<SynchronizedTrack> {
        segments.sort_by_key(|segment| segment.index);

        let mut boundary = 0.0f64;
        let mut previous_edge = 0usize;
        let lengths: Vec<usize> = segments
            .iter()
            .map(|segment| {
                boundary += segment.target_duration.max(0.0);
                let edge = media::samples_for(boundary, self.sample_rate);
                let length = edge - previous_edge;
                previous_edge = edge;
                length
            })
            .collect();

        let fitted: Vec<(Vec<f32>, SegmentFit)> = segments
            .par_iter()
            .zip(lengths.par_iter())
            .map(|(segment, &length)| {
                self.fit_to_length(segment.index, segment.target_duration, length, segment.audio.as_ref())
            })
            .collect();

        let voiced = fitted
            .iter()
            .filter(|(_, fit)| fit.outcome == FitOutcome::Voiced)
            .count();
        if voiced == 0 {
            return Err(DubSyncError::NoUsableAudio(segments.len()));
        }

        let mut samples = Vec::with_capacity(previous_edge);
        let mut fits = Vec::with_capacity(fitted.len());
        for (segment_samples, mut fit) in fitted {
            fit.offset = samples.len();
            samples.extend_from_slice(&segment_samples);
            fits.push(fit);
        }

        let track = SynchronizedTrack {
            audio: AudioBuffer::new(samples, self.sample_rate),
            fits,
        };
        info!(
            "Synchronized {} segments ({} voiced, {} silent) into {:.3}s track",
            segments.len(),
            voiced,
            track.silent_segments(),
            track.duration()
        );
        Ok(track)
    }
}

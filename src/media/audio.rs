//! # Аудио буферы
//!
//! Декодирование ответов синтезатора и аудиофайлов в моно PCM,
//! кодирование в WAV и ресемплинг к частоте итоговой дорожки.
//!
//! Внутреннее представление: моно, `f32` в диапазоне [-1.0, 1.0].

use std::io::Cursor;
use std::path::Path;

use dasp::Sample;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, warn};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{DubSyncError, Result};

/// Размер блока ресемплера
const RESAMPLE_CHUNK: usize = 1024;

/// Моно PCM буфер
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Тишина заданной длины в семплах
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Длительность в секундах
    pub fn duration(&self) -> f64 {
        duration_in_seconds(self.samples.len(), self.sample_rate)
    }

    /// Привести буфер к частоте `target_rate`
    pub fn into_rate(self, target_rate: u32) -> Result<Self> {
        if self.sample_rate == target_rate {
            return Ok(self);
        }
        let samples = resample(&self.samples, self.sample_rate, target_rate)?;
        Ok(Self::new(samples, target_rate))
    }
}

/// Длительность в секундах по количеству семплов
pub fn duration_in_seconds(sample_count: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f64 / sample_rate as f64
}

/// Количество семплов для длительности `seconds`, с округлением до ближайшего
pub fn samples_for(seconds: f64, sample_rate: u32) -> usize {
    if seconds <= 0.0 || !seconds.is_finite() {
        return 0;
    }
    (seconds * sample_rate as f64).round() as usize
}

/// Декодирует аудио из памяти (MP3, AAC, WAV) в моно PCM
pub fn decode_bytes(data: &[u8], extension_hint: Option<&str>) -> Result<AudioBuffer> {
    if data.is_empty() {
        return Err(DubSyncError::Audio("empty audio payload".to_string()));
    }
    if data.starts_with(b"RIFF") {
        return decode_wav(WavReader::new(Cursor::new(data)).map_err(wav_error)?);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| DubSyncError::Audio(format!("Unrecognized audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DubSyncError::Audio("No audio track found".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DubSyncError::Audio(format!("Failed to create decoder: {}", e)))?;

    let mut pcm = Vec::new();
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let channels = spec.channels.count().max(1);

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                fold_to_mono(buf.samples(), channels, &mut pcm);
            }
            Err(e) => {
                // Поврежденный пакет пропускаем
                warn!("Skipping undecodable packet: {}", e);
            }
        }
    }

    if sample_rate == 0 {
        return Err(DubSyncError::Audio("Unknown sample rate".to_string()));
    }
    debug!("Decoded {} samples at {} Hz", pcm.len(), sample_rate);
    Ok(AudioBuffer::new(pcm, sample_rate))
}

/// Декодирует аудиофайл в моно PCM
pub fn decode_audio_file(path: impl AsRef<Path>) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .map_err(|e| DubSyncError::Resource(format!("Failed to read {}: {}", path.display(), e)))?;
    let extension = path.extension().and_then(|ext| ext.to_str());
    decode_bytes(&data, extension)
}

fn decode_wav<R: std::io::Read>(mut reader: WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();
    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v.to_sample::<f32>()))
            .collect::<std::result::Result<_, _>>()
            .map_err(wav_error)?,
        (SampleFormat::Int, bits @ (24 | 32)) => {
            let scale = (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(wav_error)?
        }
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(wav_error)?,
        (format, bits) => {
            return Err(DubSyncError::Audio(format!(
                "Unsupported WAV format: {:?}, {} bits",
                format, bits
            )))
        }
    };

    let mut pcm = Vec::with_capacity(interleaved.len() / spec.channels.max(1) as usize);
    fold_to_mono(&interleaved, spec.channels.max(1) as usize, &mut pcm);
    Ok(AudioBuffer::new(pcm, spec.sample_rate))
}

fn fold_to_mono(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

fn wav_error(e: hound::Error) -> DubSyncError {
    DubSyncError::Audio(format!("WAV error: {}", e))
}

fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Кодирует PCM в 16-битный моно WAV-файл
pub fn encode_wav(buffer: &AudioBuffer, output_path: impl AsRef<Path>) -> Result<()> {
    let output_path = output_path.as_ref();
    let mut writer = WavWriter::create(output_path, wav_spec(buffer.sample_rate)).map_err(wav_error)?;
    for &sample in &buffer.samples {
        writer
            .write_sample(sample.clamp(-1.0, 1.0).to_sample::<i16>())
            .map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)?;

    debug!(
        "Saved WAV {} ({} samples, {} Hz)",
        output_path.display(),
        buffer.len(),
        buffer.sample_rate
    );
    Ok(())
}

/// Кодирует PCM в 16-битный моно WAV в памяти
pub fn encode_wav_bytes(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, wav_spec(buffer.sample_rate)).map_err(wav_error)?;
        for &sample in &buffer.samples {
            writer
                .write_sample(sample.clamp(-1.0, 1.0).to_sample::<i16>())
                .map_err(wav_error)?;
        }
        writer.finalize().map_err(wav_error)?;
    }
    Ok(cursor.into_inner())
}

/// Изменяет частоту дискретизации. Длина результата: round(len * to / from).
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(DubSyncError::Audio(format!(
            "Invalid sample rates: {} -> {}",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (input.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| DubSyncError::Audio(format!("Failed to create resampler: {}", e)))?;

    // Первые `delay` семплов на выходе - задержка sinc-фильтра
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(delay + expected + RESAMPLE_CHUNK * 2);
    let mut idx = 0;
    // Последний блок дополняется нулями, затем подаются нулевые блоки,
    // пока ресемплер не выдаст весь сигнал вместе с задержкой
    while output.len() < delay + expected {
        let mut chunk = vec![0.0f32; RESAMPLE_CHUNK];
        if idx < input.len() {
            let end = (idx + RESAMPLE_CHUNK).min(input.len());
            chunk[..end - idx].copy_from_slice(&input[idx..end]);
            idx = end;
        }
        let input_frames = vec![chunk];
        let frames = resampler
            .process(&input_frames, None)
            .map_err(|e| DubSyncError::Audio(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&frames[0]);
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}

/// Среднеквадратичное значение сигнала
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, seconds: f64, rate: u32) -> AudioBuffer {
        let len = samples_for(seconds, rate);
        let samples = (0..len)
            .map(|i| (i as f32 / rate as f32 * freq * 2.0 * std::f32::consts::PI).sin() * 0.5)
            .collect();
        AudioBuffer::new(samples, rate)
    }

    #[test]
    fn test_duration_calculation() {
        assert_eq!(duration_in_seconds(48_000, 48_000), 1.0);
        assert_eq!(duration_in_seconds(24_000, 48_000), 0.5);
        assert_eq!(duration_in_seconds(10, 0), 0.0);
        assert_eq!(samples_for(1.5, 48_000), 72_000);
        assert_eq!(samples_for(-1.0, 48_000), 0);
    }

    #[test]
    fn test_compute_rms() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        assert!((compute_rms(&samples) - 0.7071).abs() < 0.0001);
        assert_eq!(compute_rms(&[]), 0.0);
    }

    #[test]
    fn test_wav_file_encode_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = sine(440.0, 0.1, 44_100);

        encode_wav(&tone, &path).unwrap();
        let decoded = decode_audio_file(&path).unwrap();

        assert_eq!(decoded.sample_rate, 44_100);
        assert_eq!(decoded.len(), tone.len());
        for (a, b) in tone.samples.iter().zip(decoded.samples.iter()) {
            assert!((a - b).abs() < 0.001, "Расхождение семплов: {} и {}", a, b);
        }
    }

    #[test]
    fn test_stereo_wav_is_folded_to_mono() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..100 {
                writer.write_sample(16384i16).unwrap();
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let decoded = decode_bytes(cursor.get_ref(), Some("wav")).unwrap();
        assert_eq!(decoded.len(), 100);
        assert!((decoded.samples[0] - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_bytes(&[], None).is_err());
        assert!(decode_bytes(b"definitely not audio", None).is_err());
    }

    #[test]
    fn test_resample_length() {
        let tone = sine(440.0, 0.5, 24_000);
        let resampled = resample(&tone.samples, 24_000, 48_000).unwrap();
        assert_eq!(resampled.len(), tone.len() * 2);

        let down = resample(&tone.samples, 24_000, 16_000).unwrap();
        assert_eq!(down.len(), 8_000);

        let buffer = tone.into_rate(48_000).unwrap();
        assert_eq!(buffer.sample_rate, 48_000);
        assert!((buffer.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_resample_keeps_signal_in_place() {
        // Ступенька на 50 мс должна остаться на 50 мс после передискретизации
        let mut input = vec![0.0f32; 12_000];
        for sample in &mut input[1_200..] {
            *sample = 0.5;
        }
        let output = resample(&input, 24_000, 48_000).unwrap();
        let onset = output.iter().position(|&s| s > 0.25).unwrap();
        assert!(
            (onset as i64 - 2_400).abs() <= 4,
            "Сигнал сдвинут: начало на {} вместо 2400",
            onset
        );
    }
}

//! # Time-stretching
//!
//! Изменение длительности аудио с сохранением высоты тона методом WSOLA
//! (waveform-similarity overlap-add).
//!
//! Сигнал режется на кадры по ~20 мс с окном Ханна. Кадры выкладываются
//! в выходной буфер с постоянным шагом, а во входном сигнале берутся с шагом,
//! поделенным на коэффициент растяжения. Позиция каждого следующего кадра
//! уточняется в небольшой окрестности так, чтобы его начало было максимально
//! похоже на естественное продолжение предыдущего кадра. За счет этого
//! периоды основного тона не разрываются и высота тона сохраняется.

use std::f64::consts::PI;

use crate::error::StretchError;

/// Длительность кадра анализа, секунды
const FRAME_SECONDS: f64 = 0.02;
/// Минимальная длина кадра в семплах
const MIN_FRAME: usize = 64;
/// Шаг прореживания при вычислении корреляции
const CORRELATION_STRIDE: usize = 2;

/// Результат растяжения
pub type StretchResult = std::result::Result<Vec<f32>, StretchError>;

/// Длина кадра анализа для заданной частоты (четная)
pub fn frame_length(sample_rate: u32) -> usize {
    let len = ((sample_rate as f64 * FRAME_SECONDS) as usize).max(MIN_FRAME);
    len + len % 2
}

/// Растягивает `samples` в `ratio` раз без изменения высоты тона.
///
/// `ratio = целевая длительность / исходная длительность`, длина результата
/// равна `round(samples.len() * ratio)`.
///
/// # Ошибки
///
/// * [`StretchError::InvalidRatio`] - коэффициент не конечен или не положителен
/// * [`StretchError::Empty`] - пустой вход
/// * [`StretchError::TooShort`] - вход короче одного кадра анализа
pub fn time_stretch(samples: &[f32], sample_rate: u32, ratio: f64) -> StretchResult {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(StretchError::InvalidRatio(ratio));
    }
    if samples.is_empty() {
        return Err(StretchError::Empty);
    }

    let frame = frame_length(sample_rate);
    if samples.len() < frame {
        return Err(StretchError::TooShort {
            samples: samples.len(),
            required: frame,
        });
    }

    let out_len = (samples.len() as f64 * ratio).round() as usize;
    if out_len == 0 {
        return Err(StretchError::InvalidRatio(ratio));
    }

    let hop_out = frame / 2;
    let hop_in = hop_out as f64 / ratio;
    let overlap = frame - hop_out;
    let tolerance = (frame / 8).max(1);
    let last_start = samples.len() - frame;
    let window = hann(frame);

    let mut output = vec![0.0f32; out_len + frame];
    let mut weights = vec![0.0f32; out_len + frame];

    let mut previous: Option<usize> = None;
    let mut out_pos = 0;
    let mut k = 0usize;
    while out_pos < out_len {
        let nominal = ((k as f64 * hop_in).round() as usize).min(last_start);

        let start = match previous {
            None => 0,
            Some(prev) => {
                let natural = prev + hop_out;
                if natural + overlap > samples.len() {
                    nominal
                } else {
                    best_match(samples, &samples[natural..natural + overlap], nominal, tolerance, last_start)
                }
            }
        };

        for (i, &w) in window.iter().enumerate() {
            output[out_pos + i] += samples[start + i] * w;
            weights[out_pos + i] += w;
        }

        previous = Some(start);
        out_pos += hop_out;
        k += 1;
    }

    output.truncate(out_len);
    for (sample, &weight) in output.iter_mut().zip(weights.iter()) {
        if weight > 1e-3 {
            *sample /= weight;
        }
    }

    Ok(output)
}

/// Периодическое окно Ханна
fn hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| (0.5 - 0.5 * (2.0 * PI * n as f64 / len as f64).cos()) as f32)
        .collect()
}

/// Позиция в `[center - tolerance, center + tolerance]`, где сигнал
/// наиболее похож на `template` (нормированная взаимная корреляция)
fn best_match(samples: &[f32], template: &[f32], center: usize, tolerance: usize, last_start: usize) -> usize {
    let from = center.saturating_sub(tolerance);
    let to = (center + tolerance).min(last_start);

    let mut best = center.min(last_start);
    let mut best_score = f32::NEG_INFINITY;
    for candidate in from..=to {
        let region = &samples[candidate..candidate + template.len()];
        let mut dot = 0.0f32;
        let mut energy = 0.0f32;
        for i in (0..template.len()).step_by(CORRELATION_STRIDE) {
            dot += template[i] * region[i];
            energy += region[i] * region[i];
        }
        let score = if energy > 0.0 { dot / energy.sqrt() } else { 0.0 };
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 / RATE as f32 * freq * 2.0 * std::f32::consts::PI).sin() * 0.5)
            .collect()
    }

    fn zero_crossings(samples: &[f32]) -> usize {
        samples.windows(2).filter(|w| (w[0] < 0.0) != (w[1] < 0.0)).count()
    }

    #[test]
    fn test_output_length_matches_ratio() {
        let input = sine(220.0, RATE as usize);
        for ratio in [0.5, 0.8, 1.0, 1.25, 2.0] {
            let output = time_stretch(&input, RATE, ratio).unwrap();
            let expected = (input.len() as f64 * ratio).round() as usize;
            assert_eq!(output.len(), expected, "Неверная длина для коэффициента {}", ratio);
        }
    }

    #[test]
    fn test_pitch_is_preserved() {
        let input = sine(440.0, RATE as usize);
        let input_rate = zero_crossings(&input) as f64 / input.len() as f64;

        for ratio in [0.6, 1.5] {
            let output = time_stretch(&input, RATE, ratio).unwrap();
            // Края сигнала сглажены окном, поэтому считаем по середине
            let middle = &output[output.len() / 10..output.len() * 9 / 10];
            let output_rate = zero_crossings(middle) as f64 / middle.len() as f64;
            let deviation = (output_rate - input_rate).abs() / input_rate;
            assert!(
                deviation < 0.1,
                "Высота тона изменилась при коэффициенте {}: отклонение {:.3}",
                ratio,
                deviation
            );
        }
    }

    #[test]
    fn test_output_stays_in_range() {
        let input = sine(300.0, RATE as usize / 2);
        let output = time_stretch(&input, RATE, 1.7).unwrap();
        assert!(output.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }

    #[test]
    fn test_invalid_input() {
        let input = sine(440.0, RATE as usize);
        assert_eq!(time_stretch(&input, RATE, 0.0), Err(StretchError::InvalidRatio(0.0)));
        assert!(matches!(
            time_stretch(&input, RATE, f64::NAN),
            Err(StretchError::InvalidRatio(_))
        ));
        assert_eq!(time_stretch(&[], RATE, 1.5), Err(StretchError::Empty));
        assert!(matches!(
            time_stretch(&input[..10], RATE, 1.5),
            Err(StretchError::TooShort { samples: 10, .. })
        ));
    }
}

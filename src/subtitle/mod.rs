//! # Subtitle Emitter
//!
//! Формирование дорожки субтитров из переведенных сегментов.
//!
//! Интервал каждой реплики равен исходному окну сегмента `[start, end)`,
//! а не длительности подогнанного аудио: субтитры следуют за картинкой.
//! Сегменты с пустым окном в дорожку не попадают.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::collab::TranscriptSegment;
use crate::error::Result;

/// Формат файла субтитров
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionFormat {
    #[default]
    Srt,
    Vtt,
}

impl CaptionFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::Vtt => "vtt",
        }
    }
}

/// Одна реплика
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCue {
    /// Индекс исходного сегмента
    pub segment_index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Дорожка субтитров
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptionTrack {
    cues: Vec<CaptionCue>,
}

impl CaptionTrack {
    /// Построить дорожку из сегментов. Текст реплики: перевод, а при его
    /// отсутствии исходный текст.
    pub fn from_segments(segments: &[TranscriptSegment]) -> Self {
        let cues = segments
            .iter()
            .filter(|segment| segment.end > segment.start)
            .map(|segment| CaptionCue {
                segment_index: segment.index,
                start: segment.start,
                end: segment.end,
                text: segment.display_text().trim().to_string(),
            })
            .collect();
        Self { cues }
    }

    pub fn cues(&self) -> &[CaptionCue] {
        &self.cues
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    /// SubRip: нумерация с 1, время `HH:MM:SS,mmm`
    pub fn render_srt(&self) -> String {
        let mut out = String::new();
        for (number, cue) in self.cues.iter().enumerate() {
            let _ = write!(
                out,
                "{}\n{} --> {}\n{}\n\n",
                number + 1,
                format_timestamp(cue.start, ','),
                format_timestamp(cue.end, ','),
                cue.text
            );
        }
        out
    }

    /// WebVTT: время `HH:MM:SS.mmm`
    pub fn render_vtt(&self) -> String {
        let mut out = String::from("WEBVTT\n\n");
        for (number, cue) in self.cues.iter().enumerate() {
            let _ = write!(
                out,
                "{}\n{} --> {}\n{}\n\n",
                number + 1,
                format_timestamp(cue.start, '.'),
                format_timestamp(cue.end, '.'),
                cue.text
            );
        }
        out
    }

    pub fn render(&self, format: CaptionFormat) -> String {
        match format {
            CaptionFormat::Srt => self.render_srt(),
            CaptionFormat::Vtt => self.render_vtt(),
        }
    }

    /// Записать дорожку в файл
    pub async fn write_to(&self, path: impl AsRef<Path>, format: CaptionFormat) -> Result<PathBuf> {
        let path = path.as_ref();
        tokio::fs::write(path, self.render(format)).await?;
        log::debug!("Saved {} captions to {}", self.cues.len(), path.display());
        Ok(path.to_path_buf())
    }
}

/// Время в формате `HH:MM:SS<sep>mmm`
pub fn format_timestamp(seconds: f64, separator: char) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02}{}{:03}", hours, minutes, secs, separator, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(index: usize, start: f64, end: f64, text: &str, translated: Option<&str>) -> TranscriptSegment {
        TranscriptSegment {
            index,
            start,
            end,
            source_text: text.to_string(),
            translated_text: translated.map(str::to_string),
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0, ','), "00:00:00,000");
        assert_eq!(format_timestamp(3723.456, ','), "01:02:03,456");
        assert_eq!(format_timestamp(5.5, '.'), "00:00:05.500");
        assert_eq!(format_timestamp(-1.0, ','), "00:00:00,000");
    }

    #[test]
    fn test_empty_windows_are_skipped() {
        let segments = vec![
            segment(0, 0.0, 2.0, "Hello", Some("你好")),
            segment(1, 4.0, 4.0, "Skipped", Some("跳过")),
            segment(2, 4.0, 5.5, "Bye", None),
        ];
        let track = CaptionTrack::from_segments(&segments);
        assert_eq!(track.len(), 2);
        assert_eq!(track.cues()[1].segment_index, 2);
        // Без перевода показывается исходный текст
        assert_eq!(track.cues()[1].text, "Bye");

        let srt = track.render_srt();
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:02,000\n你好\n\n2\n00:00:04,000 --> 00:00:05,500\nBye\n\n"
        );
        assert!(!srt.contains("跳过"));
    }

    #[tokio::test]
    async fn test_vtt_and_file_output() {
        let track = CaptionTrack::from_segments(&[segment(0, 1.25, 2.5, "Hi", Some("Привет"))]);
        let vtt = track.render_vtt();
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:01.250 --> 00:00:02.500"));

        let dir = tempfile::tempdir().unwrap();
        let path = track.write_to(dir.path().join("subs.srt"), CaptionFormat::Srt).await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), track.render_srt());

        let path = track.write_to(dir.path().join("subs.vtt"), CaptionFormat::Vtt).await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), vtt);
    }
}

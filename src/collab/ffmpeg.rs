//! Транскодер на базе ffmpeg/ffprobe

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::info;

use crate::collab::{CollabResult, MuxRequest, Transcoder};
use crate::error::{Collaborator, CollaboratorError};
use crate::utils::process::run_tool;

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn run_ffmpeg(&self, args: Vec<OsString>) -> CollabResult<()> {
        run_tool(&self.ffmpeg, args)
            .await
            .map(|_| ())
            .map_err(|e| CollaboratorError::Process(Collaborator::Transcoder, format!("{:#}", e)))
    }
}

/// Аргументы ffmpeg для сборки видео. Картинка копируется без перекодирования,
/// звук кодируется в AAC, субтитры добавляются отдельной дорожкой mov_text.
fn mux_args(request: &MuxRequest<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), request.video.into(), "-i".into(), request.audio.into()];
    if let Some(captions) = request.captions {
        args.push("-i".into());
        args.push(captions.into());
    }

    args.extend(["-map", "0:v:0", "-map", "1:a:0"].map(OsString::from));
    if request.captions.is_some() {
        args.extend(["-map", "2:s:0"].map(OsString::from));
    }

    args.extend(["-c:v", "copy", "-c:a", "aac"].map(OsString::from));
    if request.captions.is_some() {
        args.extend(["-c:s", "mov_text"].map(OsString::from));
        args.push("-metadata:s:s:0".into());
        args.push(format!("language={}", request.caption_language).into());
    }

    args.push(request.output.into());
    args
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn extract_audio(&self, video: &Path, output: &Path) -> CollabResult<PathBuf> {
        info!("Extracting audio {} -> {}", video.display(), output.display());
        let args = vec![
            OsString::from("-y"),
            "-i".into(),
            video.into(),
            "-vn".into(),
            "-acodec".into(),
            "libmp3lame".into(),
            "-q:a".into(),
            "2".into(),
            output.into(),
        ];
        self.run_ffmpeg(args).await?;
        ensure_written(output)
    }

    async fn mux(&self, request: MuxRequest<'_>) -> CollabResult<PathBuf> {
        info!(
            "Muxing {} + {} (captions: {}) -> {}",
            request.video.display(),
            request.audio.display(),
            request.captions.map_or("none".to_string(), |p| p.display().to_string()),
            request.output.display()
        );
        self.run_ffmpeg(mux_args(&request)).await?;
        ensure_written(request.output)
    }

    async fn probe_duration(&self, media: &Path) -> CollabResult<f64> {
        let stdout = run_tool(
            &self.ffprobe,
            [
                OsString::from("-v"),
                "error".into(),
                "-show_entries".into(),
                "format=duration".into(),
                "-of".into(),
                "default=noprint_wrappers=1:nokey=1".into(),
                media.into(),
            ],
        )
        .await
        .map_err(|e| CollaboratorError::Process(Collaborator::Transcoder, format!("{:#}", e)))?;

        stdout.trim().parse::<f64>().map_err(|_| {
            CollaboratorError::Process(
                Collaborator::Transcoder,
                format!("Failed to parse duration of {}: '{}'", media.display(), stdout.trim()),
            )
        })
    }
}

fn ensure_written(path: &Path) -> CollabResult<PathBuf> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(path.to_path_buf()),
        Ok(_) => Err(CollaboratorError::Empty(
            Collaborator::Transcoder,
            format!("{} is empty", path.display()),
        )),
        Err(e) => Err(CollaboratorError::Io(Collaborator::Transcoder, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_mux_keeps_picture_and_adds_soft_captions() {
        let request = MuxRequest {
            video: Path::new("raw.mp4"),
            audio: Path::new("new_audio.wav"),
            captions: Some(Path::new("subtitle.srt")),
            caption_language: "zh",
            output: Path::new("output.mp4"),
        };
        let args = strings(mux_args(&request));
        let joined = args.join(" ");
        assert!(joined.contains("-c:v copy"), "Картинка не должна перекодироваться: {}", joined);
        assert!(joined.contains("-map 2:s:0 -c:v copy -c:a aac -c:s mov_text"));
        assert!(joined.contains("language=zh"));
        assert_eq!(args.last().map(String::as_str), Some("output.mp4"));
    }

    #[test]
    fn test_mux_without_captions() {
        let request = MuxRequest {
            video: Path::new("raw.mp4"),
            audio: Path::new("audio.mp3"),
            captions: None,
            caption_language: "zh",
            output: Path::new("output.mp4"),
        };
        let args = strings(mux_args(&request));
        assert!(!args.iter().any(|a| a == "mov_text" || a == "2:s:0"));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 2);
    }

    #[test]
    fn test_ensure_written() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.mp4");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(ensure_written(&empty), Err(CollaboratorError::Empty(..))));
        assert!(matches!(
            ensure_written(&dir.path().join("missing.mp4")),
            Err(CollaboratorError::Io(..))
        ));
    }
}

//! Загрузка видео через yt-dlp

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::collab::{CollabResult, Downloader};
use crate::error::{Collaborator, CollaboratorError};
use crate::utils::process::run_tool;

/// Загрузчик на базе yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    program: String,
    format: String,
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            format: "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
        }
    }
}

impl YtDlpDownloader {
    /// Использовать другой исполняемый файл yt-dlp
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn fetch(&self, url: &str, destination: &Path) -> CollabResult<PathBuf> {
        let template = format!("{}.%(ext)s", destination.display());
        info!("Downloading {} -> {}", url, template);

        run_tool(
            &self.program,
            [
                "-f",
                self.format.as_str(),
                "--merge-output-format",
                "mp4",
                "--no-playlist",
                "--no-progress",
                "-o",
                template.as_str(),
                url,
            ],
        )
        .await
        .map_err(|e| CollaboratorError::Process(Collaborator::Downloader, format!("{:#}", e)))?;

        find_downloaded_file(destination).await
    }
}

/// Находит самый новый файл `<stem>.<ext>` рядом с `stem`
async fn find_downloaded_file(stem: &Path) -> CollabResult<PathBuf> {
    let dir = stem.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let prefix = format!(
        "{}.",
        stem.file_name().and_then(|n| n.to_str()).unwrap_or_default()
    );

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| CollaboratorError::Io(Collaborator::Downloader, e))?;

    let mut newest: Option<(PathBuf, std::time::SystemTime)> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(&prefix) || name.ends_with(".part") || name.ends_with(".ytdl") {
            continue;
        }
        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(time) => time,
            Err(e) => {
                warn!("Failed to get metadata for {}: {}", path.display(), e);
                std::time::UNIX_EPOCH
            }
        };
        debug!("Found downloaded candidate {}", path.display());
        if newest.as_ref().map_or(true, |(_, time)| modified > *time) {
            newest = Some((path, modified));
        }
    }

    newest.map(|(path, _)| path).ok_or_else(|| {
        CollaboratorError::Empty(
            Collaborator::Downloader,
            format!("no file matching {}* in {}", prefix, dir.display()),
        )
    })
}

//! Рабочие файлы задачи
//!
//! Все промежуточные файлы задачи лежат в рабочей директории и содержат
//! идентификатор задачи в имени, поэтому задачи не пересекаются по файлам.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{DubSyncError, Result};
use crate::subtitle::CaptionFormat;
use crate::task::TaskId;

/// Префиксы промежуточных файлов задачи
const TEMP_PREFIXES: [&str; 4] = ["raw_", "audio_", "new_audio_", "subtitle_"];

/// Пути к файлам одной задачи
#[derive(Debug, Clone)]
pub struct TaskWorkspace {
    id: TaskId,
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl TaskWorkspace {
    pub fn new(id: TaskId, work_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            id,
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Создать рабочую и выходную директории
    pub async fn prepare(&self) -> Result<()> {
        for dir in [&self.work_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                DubSyncError::Resource(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Путь без расширения для скачиваемого видео; расширение выбирает загрузчик
    pub fn raw_video_stem(&self) -> PathBuf {
        self.work_dir.join(format!("raw_{}", self.id))
    }

    pub fn source_audio_path(&self) -> PathBuf {
        self.work_dir.join(format!("audio_{}.mp3", self.id))
    }

    pub fn synthesized_audio_path(&self) -> PathBuf {
        self.work_dir.join(format!("new_audio_{}.wav", self.id))
    }

    pub fn subtitle_path(&self, format: CaptionFormat) -> PathBuf {
        self.work_dir.join(format!("subtitle_{}.{}", self.id, format.extension()))
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(format!("output_{}.mp4", self.id))
    }

    /// Удаляет промежуточные файлы задачи. Файлы из `preserve` не трогаются.
    /// Ошибки удаления только логируются.
    pub async fn cleanup(&self, preserve: &[&Path]) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.work_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("[{}] Cannot list {} for cleanup: {}", self.id, self.work_dir.display(), e);
                return 0;
            }
        };

        let mut kept = Vec::with_capacity(preserve.len());
        for keep in preserve {
            kept.push(canonical(keep).await);
        }

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("[{}] Cannot read {}: {}", self.id, self.work_dir.display(), e);
                    break;
                }
            };
            let path = entry.path();
            if !self.owns(&path) || kept.contains(&canonical(&path).await) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("[{}] Removed temporary file {}", self.id, path.display());
                    removed += 1;
                }
                Err(e) => warn!("[{}] Failed to remove {}: {}", self.id, path.display(), e),
            }
        }
        removed
    }

    /// Принадлежит ли файл этой задаче
    fn owns(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let id = self.id.as_str();
        TEMP_PREFIXES.iter().any(|prefix| {
            name.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix(id))
                .map_or(false, |rest| rest.is_empty() || rest.starts_with('.'))
        })
    }
}

async fn canonical(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path).await.unwrap_or_else(|_| path.to_path_buf())
}

//! # dub-sync
//!
//! Библиотека автоматического дубляжа видео: распознавание речи, перевод,
//! синтез новой речи и ее выравнивание по временным окнам исходных реплик.
//!
//! Точка входа для приложения: [`DubbingService`]. Сервис принимает
//! источник видео, запускает конвейер в фоне и отдает снимки состояния
//! задачи по ее идентификатору.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dub_sync::{Collaborators, DubSyncConfig, DubbingService, MemoryTaskStore};
//! use dub_sync::task::{SourceDescriptor, TaskOptions};
//!
//! # async fn run() -> dub_sync::Result<()> {
//! let config = DubSyncConfig::from_env()?;
//! let collaborators = Collaborators::from_config(&config)?;
//! let service = DubbingService::new(config, collaborators, Arc::new(MemoryTaskStore::new()))?;
//!
//! let id = service.start_task(
//!     SourceDescriptor::Remote { url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into() },
//!     TaskOptions::default(),
//! )?;
//! let record = service.wait(&id).await?;
//! println!("{:?}: {:?}", record.status, record.output_path);
//! # Ok(())
//! # }
//! ```

pub mod collab;
pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod subtitle;
pub mod sync;
pub mod task;
pub mod utils;

pub use collab::{Collaborators, TranscriptSegment};
pub use config::{DubSyncConfig, SyncSettings, TtsModel, TtsVoice};
pub use error::{CollaboratorError, DubSyncError, FailureKind, Result, SegmentError};
pub use logger::init_logger;
pub use pipeline::{Pipeline, TaskContext};
pub use progress::{PipelineStage, ProgressReporter};
pub use scheduler::DubbingService;
pub use subtitle::{CaptionFormat, CaptionTrack};
pub use sync::{SegmentAudio, SegmentSynchronizer, SynchronizedTrack};
pub use task::{MemoryTaskStore, TaskId, TaskRecord, TaskStatus, TaskStore};

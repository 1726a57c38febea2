//! Модуль учета задач дубляжа

pub mod record;
pub mod store;

pub use record::{
    AudioMode, SegmentIssue, SegmentWarning, SourceDescriptor, TaskId, TaskOptions, TaskRecord,
    TaskStatus,
};
pub use store::{MemoryTaskStore, TaskStore};

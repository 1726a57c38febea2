//! Синхронизация синтезированной речи с временными окнами сегментов

pub mod stretch;
pub mod synchronizer;

pub use stretch::time_stretch;
pub use synchronizer::{FitOutcome, SegmentAudio, SegmentFit, SegmentSynchronizer, SynchronizedTrack};

//! Вспомогательные функции

pub mod process;
pub mod text;
pub mod workspace;

pub use text::prepare_text_for_tts;
pub use workspace::TaskWorkspace;

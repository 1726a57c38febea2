//! Работа с аудиоданными

pub mod audio;

pub use audio::{
    compute_rms, decode_audio_file, decode_bytes, duration_in_seconds, encode_wav, encode_wav_bytes, resample,
    samples_for, AudioBuffer,
};

/// Whisper model inference engine
pub mod engine;

pub use engine::{ModelInfo, Transcriber, TranscriptionError, WhisperEngine};

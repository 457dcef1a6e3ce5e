//! Dictate Hotkey - push-to-toggle voice dictation
//!
//! This library exports core modules for testing and potential future reuse.

/// Audio capture and sample handling
pub mod audio;
/// Configuration management
pub mod config;
/// Status indicator command channel and rendering surface
pub mod indicator;
/// Input handling (key hook, hotkey watcher)
pub mod input;
/// Text output dispatch (typing, clipboard, notifications)
pub mod output;
/// Scratch WAV lifecycle for in-flight takes
pub mod scratch;
/// Session orchestration state machine
pub mod session;
/// Logging setup
pub mod telemetry;
/// Whisper transcription engine
pub mod transcription;

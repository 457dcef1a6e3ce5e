/// Microphone capture and sample conversion
pub mod capture;

pub use capture::{is_silent, AudioBlock, Capture, CaptureError, MicCapture};

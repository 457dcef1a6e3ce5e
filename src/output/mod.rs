/// Typing, clipboard, and notification primitives
pub mod backends;
/// Output mode policy and fallback
pub mod dispatcher;

pub use backends::{
    ArboardClipboard, BackendError, ClipboardBackend, DesktopNotifier, EnigoTyper, Notifier,
    TypingBackend,
};
pub use dispatcher::{DispatchOutcome, OutputDispatcher, OutputError};

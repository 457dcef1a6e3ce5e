use arboard::Clipboard;
use enigo::{Enigo, Keyboard, Settings};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure from a single backend operation
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// Keystroke-injection primitive
#[cfg_attr(test, mockall::automock)]
pub trait TypingBackend: Send {
    /// Type the full string at the cursor, pausing `delay` between characters
    ///
    /// # Errors
    /// Returns error if injection fails partway; the dispatcher retries the
    /// whole string, never a resumed partial attempt.
    fn type_text(&mut self, text: &str, delay: Duration) -> Result<(), BackendError>;
}

/// Clipboard primitive
#[cfg_attr(test, mockall::automock)]
pub trait ClipboardBackend: Send {
    /// Replace the clipboard contents with `text`
    ///
    /// # Errors
    /// Returns error if the clipboard is unavailable.
    fn copy(&mut self, text: &str) -> Result<(), BackendError>;
}

/// Desktop notification primitive. Best-effort: implementations swallow and
/// log failures, never propagate them.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send {
    /// Fire-and-forget notification
    fn notify(&self, title: &str, message: &str);
}

/// Keystroke injection via enigo
pub struct EnigoTyper {
    enigo: Enigo,
}

impl EnigoTyper {
    /// Connect to the platform input synthesis backend.
    ///
    /// # Errors
    /// Returns error if the backend is unavailable (e.g. no display).
    pub fn new() -> Result<Self, BackendError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| BackendError(format!("failed to initialize enigo: {e}")))?;
        Ok(Self { enigo })
    }
}

impl TypingBackend for EnigoTyper {
    fn type_text(&mut self, text: &str, delay: Duration) -> Result<(), BackendError> {
        for ch in text.chars() {
            self.enigo
                .text(&ch.to_string())
                .map_err(|e| BackendError(format!("keystroke injection failed: {e}")))?;
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        debug!(text_len = text.len(), "typed text");
        Ok(())
    }
}

/// Clipboard access via arboard
pub struct ArboardClipboard;

impl ClipboardBackend for ArboardClipboard {
    fn copy(&mut self, text: &str) -> Result<(), BackendError> {
        // a fresh handle per copy sidesteps long-lived X11 selection quirks
        let mut clipboard =
            Clipboard::new().map_err(|e| BackendError(format!("clipboard unavailable: {e}")))?;
        clipboard
            .set_text(text)
            .map_err(|e| BackendError(format!("clipboard copy failed: {e}")))?;
        debug!(text_len = text.len(), "copied text to clipboard");
        Ok(())
    }
}

/// Desktop notifications via notify-rust
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) {
        if let Err(e) = notify_rust::Notification::new()
            .summary(title)
            .body(message)
            .show()
        {
            // notifications are cosmetic
            warn!("notification failed: {}", e);
        }
    }
}

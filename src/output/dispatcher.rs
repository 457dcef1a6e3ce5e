use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{OutputConfig, OutputMode, TypingConfig};
use crate::output::backends::{ClipboardBackend, Notifier, TypingBackend};

/// Notification title for all dispatch outcomes
const NOTIFY_TITLE: &str = "Dictate Hotkey";

/// Terminal failures of one dispatch cycle
#[derive(Debug, Error)]
pub enum OutputError {
    /// Typing failed and the mode has no fallback
    #[error("typing failed after {attempts} attempts: {message}")]
    Typing {
        /// Attempts made (full-string each)
        attempts: u32,
        /// Last backend error
        message: String,
    },

    /// Clipboard copy failed (terminal for the cycle)
    #[error("clipboard copy failed: {0}")]
    Clipboard(String),
}

/// How a successful dispatch delivered the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Text was typed at the cursor
    Typed,
    /// Text was copied to the clipboard
    Copied,
    /// Input was empty; nothing to output
    Empty,
}

/// Delivers recognized text per the configured output mode.
///
/// | mode        | primary | on primary failure     | notify condition      |
/// |-------------|---------|------------------------|-----------------------|
/// | `type`      | typing  | report, no fallback    | if typing succeeded   |
/// | `clipboard` | copy    | n/a                    | always on success     |
/// | `auto`      | typing  | fall back to clipboard | either path's outcome |
pub struct OutputDispatcher {
    typing: Box<dyn TypingBackend>,
    clipboard: Box<dyn ClipboardBackend>,
    notifier: Box<dyn Notifier>,
}

impl OutputDispatcher {
    #[must_use]
    pub fn new(
        typing: Box<dyn TypingBackend>,
        clipboard: Box<dyn ClipboardBackend>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            typing,
            clipboard,
            notifier,
        }
    }

    /// Deliver `text` according to `config`.
    ///
    /// Empty text is a no-op, not a failure.
    ///
    /// # Errors
    /// Returns error when the cycle ends with nothing delivered.
    pub fn dispatch(
        &mut self,
        text: &str,
        config: &OutputConfig,
    ) -> Result<DispatchOutcome, OutputError> {
        if text.is_empty() {
            info!("nothing to output");
            return Ok(DispatchOutcome::Empty);
        }

        match config.mode {
            OutputMode::Type => {
                self.try_typing(text, &config.typing)?;
                self.maybe_notify(config, "Text typed");
                Ok(DispatchOutcome::Typed)
            }
            OutputMode::Clipboard => {
                self.copy(text)?;
                self.maybe_notify(config, "Text copied to clipboard");
                Ok(DispatchOutcome::Copied)
            }
            OutputMode::Auto => match self.try_typing(text, &config.typing) {
                Ok(()) => {
                    self.maybe_notify(config, "Text typed");
                    Ok(DispatchOutcome::Typed)
                }
                Err(e) => {
                    warn!("typing failed, falling back to clipboard: {}", e);
                    self.copy(text)?;
                    self.maybe_notify(config, "Text copied to clipboard (typing failed)");
                    Ok(DispatchOutcome::Copied)
                }
            },
        }
    }

    /// Type the full string, retrying whole attempts up to the configured count
    fn try_typing(&mut self, text: &str, config: &TypingConfig) -> Result<(), OutputError> {
        let full_text = if config.add_trailing_space {
            format!("{text} ")
        } else {
            text.to_owned()
        };
        let delay = Duration::from_secs_f64(config.delay_between_chars.max(0.0));

        let mut last_error = "no attempts configured".to_owned();
        for attempt in 1..=config.retry_count {
            match self.typing.type_text(&full_text, delay) {
                Ok(()) => {
                    info!(attempt, text_len = text.len(), "typing succeeded");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, "typing attempt failed: {}", e);
                    last_error = e.to_string();
                }
            }
        }

        Err(OutputError::Typing {
            attempts: config.retry_count,
            message: last_error,
        })
    }

    fn copy(&mut self, text: &str) -> Result<(), OutputError> {
        self.clipboard
            .copy(text)
            .map_err(|e| OutputError::Clipboard(e.to_string()))?;
        info!(text_len = text.len(), "copied to clipboard");
        Ok(())
    }

    fn maybe_notify(&self, config: &OutputConfig, message: &str) {
        if config.notify {
            self.notifier.notify(NOTIFY_TITLE, message);
        }
    }
}

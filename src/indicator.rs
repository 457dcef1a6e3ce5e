use std::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

/// One command for the status indicator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCommand {
    /// Bring the indicator up
    Show,
    /// Take the indicator down (no-op if it is not up)
    Hide,
    /// Replace the indicator message
    SetMessage(String),
}

/// Create the status command channel: producers for any thread, one
/// receiver for the thread that owns the rendering surface.
#[must_use]
pub fn status_channel() -> (StatusSender, StatusReceiver) {
    let (tx, rx) = mpsc::channel();
    (StatusSender { tx }, StatusReceiver { rx })
}

/// Producer half; cheap to clone, never blocks on send
#[derive(Clone)]
pub struct StatusSender {
    tx: Sender<StatusCommand>,
}

impl StatusSender {
    pub fn show(&self) {
        self.send(StatusCommand::Show);
    }

    pub fn hide(&self) {
        self.send(StatusCommand::Hide);
    }

    pub fn set_message(&self, text: impl Into<String>) {
        self.send(StatusCommand::SetMessage(text.into()));
    }

    fn send(&self, command: StatusCommand) {
        if self.tx.send(command).is_err() {
            // consumer went away during shutdown; nothing to render to
            debug!("status consumer gone, command dropped");
        }
    }
}

/// Consumer half; drain on the UI-owning thread only
pub struct StatusReceiver {
    rx: Receiver<StatusCommand>,
}

impl StatusReceiver {
    /// Apply all pending commands in enqueue order, then render once.
    ///
    /// Returns the number of commands applied. Never blocks.
    pub fn drain<S: IndicatorSurface>(&self, indicator: &mut Indicator<S>) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.rx.try_recv() {
            indicator.apply(command);
            applied += 1;
        }
        indicator.render();
        applied
    }

    /// Pop one pending command without blocking
    #[must_use]
    pub fn try_next(&self) -> Option<StatusCommand> {
        self.rx.try_recv().ok()
    }
}

/// Rendering surface the indicator draws on. Implementations run only on
/// the thread that owns them; rendering itself is outside this crate's
/// concern beyond the console surface below.
pub trait IndicatorSurface {
    /// Create the window with an initial message
    fn show(&mut self, message: &str);
    /// Update the message of an existing window
    fn set_message(&mut self, message: &str);
    /// Destroy the window
    fn hide(&mut self);
}

/// Applies status commands to a surface with one render pass per drain.
///
/// Commands are applied in FIFO order but rendering is coalesced: the last
/// `SetMessage` before a render wins. A `SetMessage` arriving before any
/// `Show` is kept as the initial message; `Hide` without a window is a
/// no-op.
pub struct Indicator<S: IndicatorSurface> {
    surface: S,
    window_up: bool,
    visible: bool,
    message: String,
    rendered_message: String,
    dirty: bool,
}

impl<S: IndicatorSurface> Indicator<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            window_up: false,
            visible: false,
            message: String::new(),
            rendered_message: String::new(),
            dirty: false,
        }
    }

    /// Record one command; takes effect at the next [`render`](Self::render)
    pub fn apply(&mut self, command: StatusCommand) {
        match command {
            StatusCommand::Show => self.visible = true,
            StatusCommand::Hide => self.visible = false,
            StatusCommand::SetMessage(text) => self.message = text,
        }
        self.dirty = true;
    }

    /// Reconcile the surface with the applied commands
    pub fn render(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;

        match (self.window_up, self.visible) {
            (false, true) => {
                self.surface.show(&self.message);
                self.window_up = true;
                self.rendered_message = self.message.clone();
            }
            (true, true) => {
                if self.message != self.rendered_message {
                    self.surface.set_message(&self.message);
                    self.rendered_message = self.message.clone();
                }
            }
            (true, false) => {
                self.surface.hide();
                self.window_up = false;
            }
            // no window to hide; a pending message stays buffered
            (false, false) => {}
        }
    }
}

/// Minimal console rendering surface
#[allow(clippy::print_stderr)] // stderr is this surface's canvas
pub struct ConsoleIndicator;

#[allow(clippy::print_stderr)]
impl IndicatorSurface for ConsoleIndicator {
    fn show(&mut self, message: &str) {
        eprintln!("● {message}");
    }

    fn set_message(&mut self, message: &str) {
        eprintln!("● {message}");
    }

    fn hide(&mut self) {
        eprintln!("○ idle");
    }
}

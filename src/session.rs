use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioBlock, Capture};
use crate::config::{Config, ConfigHandle, OutputMode};
use crate::indicator::StatusSender;
use crate::input::watcher::ToggleHandler;
use crate::output::OutputDispatcher;
use crate::scratch;
use crate::transcription::Transcriber;

/// Indicator stays up briefly after a cycle so the last status is readable
const HIDE_GRACE: Duration = Duration::from_millis(600);

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Processing,
}

/// What one delivered toggle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Idle → Recording
    Started,
    /// A full processing cycle delivered text
    Finished,
    /// Stop with zero captured frames; transcription skipped
    NoAudio,
    /// The cycle errored; state still returned to Idle
    Failed,
    /// Toggle observed while Processing; ignored
    Dropped,
}

/// Bookkeeping for the one live recording
struct ActiveSession {
    started_at: Instant,
    /// Config snapshot captured at start; reloads do not touch it
    config: Arc<Config>,
}

/// Drives the Idle ⇄ Recording ⇄ Processing lifecycle.
///
/// All transitions run on whichever thread delivers the toggle — the hotkey
/// watcher thread in production — so transitions are serialized by
/// construction. The state lock is held only for the transition decision;
/// the blocking transcription/output work runs with the state visibly
/// `Processing`, which is how a concurrently delivered toggle gets dropped.
pub struct SessionOrchestrator {
    state: Mutex<SessionState>,
    capture: Mutex<Box<dyn Capture>>,
    transcriber: Arc<dyn Transcriber>,
    dispatcher: Mutex<OutputDispatcher>,
    status: StatusSender,
    config: Arc<ConfigHandle>,
    session: Mutex<Option<ActiveSession>>,
    hide_grace: Duration,
}

impl SessionOrchestrator {
    #[must_use]
    pub fn new(
        capture: Box<dyn Capture>,
        transcriber: Arc<dyn Transcriber>,
        dispatcher: OutputDispatcher,
        status: StatusSender,
        config: Arc<ConfigHandle>,
    ) -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            capture: Mutex::new(capture),
            transcriber,
            dispatcher: Mutex::new(dispatcher),
            status,
            config,
            session: Mutex::new(None),
            hide_grace: HIDE_GRACE,
        }
    }

    /// Override the post-cycle indicator grace interval (tests use zero)
    #[must_use]
    pub fn with_hide_grace(mut self, grace: Duration) -> Self {
        self.hide_grace = grace;
        self
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    /// Process one toggle. Blocks for the length of the cycle on a stop
    /// toggle; drops the toggle when a cycle is already in flight.
    pub fn handle_toggle(&self) -> ToggleOutcome {
        let previous = {
            let mut state = self.lock_state();
            match *state {
                SessionState::Idle => {
                    *state = SessionState::Recording;
                    SessionState::Idle
                }
                SessionState::Recording => {
                    *state = SessionState::Processing;
                    SessionState::Recording
                }
                SessionState::Processing => SessionState::Processing,
            }
        };

        match previous {
            SessionState::Idle => {
                info!("toggle: Idle → Recording");
                let outcome = self.start_session();
                if outcome != ToggleOutcome::Started {
                    *self.lock_state() = SessionState::Idle;
                }
                outcome
            }
            SessionState::Recording => {
                info!("toggle: Recording → Processing");
                let outcome = self.stop_session();
                *self.lock_state() = SessionState::Idle;
                info!("processing complete: Processing → Idle");
                outcome
            }
            SessionState::Processing => {
                debug!("toggle during processing dropped");
                ToggleOutcome::Dropped
            }
        }
    }

    /// Tear down an in-progress recording on process exit.
    ///
    /// The captured frames are discarded without a scratch spill, so no
    /// partial-state file survives the exit. A cycle already in Processing
    /// is left to run to completion.
    pub fn shutdown(&self) {
        let mut state = self.lock_state();
        match *state {
            SessionState::Recording => {
                info!("shutdown during recording; discarding take");
                if let Err(e) = self.lock_capture().finalize() {
                    warn!("failed to finalize capture on shutdown: {}", e);
                }
                *self.lock_session() = None;
                *state = SessionState::Idle;
            }
            SessionState::Processing => {
                info!("shutdown requested mid-processing; cycle will finish first");
            }
            SessionState::Idle => {}
        }
        self.status.hide();
    }

    fn start_session(&self) -> ToggleOutcome {
        let config = self.config.current();

        // indicator first: it must never lag audible recording
        self.status.show();
        self.status.set_message("listening");

        match self.lock_capture().arm() {
            Ok(()) => {
                *self.lock_session() = Some(ActiveSession {
                    started_at: Instant::now(),
                    config,
                });
                info!("recording started");
                ToggleOutcome::Started
            }
            Err(e) => {
                error!("failed to arm capture: {}", e);
                self.status.hide();
                ToggleOutcome::Failed
            }
        }
    }

    fn stop_session(&self) -> ToggleOutcome {
        let session = self.lock_session().take();
        let config = session.as_ref().map_or_else(|| self.config.current(), |s| Arc::clone(&s.config));

        let finalized = self.lock_capture().finalize();
        if let Some(session) = &session {
            debug!(
                recording_ms = session.started_at.elapsed().as_millis(),
                "recording stopped"
            );
        }

        match finalized {
            Ok(Some(block)) => self.process_take(&block, &config),
            Ok(None) => {
                info!("no audio captured");
                self.status.hide();
                ToggleOutcome::NoAudio
            }
            Err(e) => {
                error!("failed to finalize capture: {}", e);
                self.status.hide();
                ToggleOutcome::Failed
            }
        }
    }

    fn process_take(&self, block: &AudioBlock, config: &Config) -> ToggleOutcome {
        if block.is_silent(config.audio.silence_threshold) {
            debug!(
                duration_secs = block.duration_secs(),
                "take below silence threshold"
            );
        }

        // spill before the model runs so a bad cycle leaves the take inspectable
        let scratch_path = match scratch::write_take(block) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("failed to spill scratch take: {}", e);
                None
            }
        };

        let result = self.recognize_and_dispatch(block, config);

        // the take is consumed exactly once; its backing file goes with it
        if let Some(path) = &scratch_path {
            scratch::remove_take(path);
        }

        match result {
            Ok(()) => {
                std::thread::sleep(self.hide_grace);
                self.status.hide();
                ToggleOutcome::Finished
            }
            Err(e) => {
                error!("processing failed: {:#}", e);
                self.status.hide();
                ToggleOutcome::Failed
            }
        }
    }

    fn recognize_and_dispatch(&self, block: &AudioBlock, config: &Config) -> Result<()> {
        self.status.set_message("transcribing");
        let text = self
            .transcriber
            .transcribe(block)
            .context("transcription failed")?;
        debug!(text_len = text.len(), "transcription returned");

        let stage = match config.output.mode {
            OutputMode::Clipboard => "copying",
            OutputMode::Type | OutputMode::Auto => "typing",
        };
        self.status.set_message(stage);

        let outcome = self
            .lock_dispatcher()
            .dispatch(&text, &config.output)
            .context("output failed")?;
        info!(?outcome, "dispatch complete");
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_capture(&self) -> MutexGuard<'_, Box<dyn Capture>> {
        match self.capture.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_dispatcher(&self) -> MutexGuard<'_, OutputDispatcher> {
        match self.dispatcher.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ToggleHandler for SessionOrchestrator {
    fn handle_toggle(&self) -> ToggleOutcome {
        Self::handle_toggle(self)
    }
}

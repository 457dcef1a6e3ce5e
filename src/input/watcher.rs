use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use rdev::{EventType, Key};
use tracing::{debug, error, info, warn};

use crate::input::keymap::KeyCombo;
use crate::session::ToggleOutcome;

/// Interval at which the watcher thread re-checks its shutdown flag
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Raw key notification from the OS input hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyNotification {
    Press(Key),
    Release(Key),
}

/// Receives a toggle each time the hotkey combination fires
pub trait ToggleHandler: Send + Sync {
    /// Process one toggle; may block for the length of a processing cycle
    fn handle_toggle(&self) -> ToggleOutcome;
}

/// Edge-triggered tracker for one hotkey combination.
///
/// Holds the currently-depressed key set plus an explicit fired flag, so
/// "already fired for this press" is a state rather than a side effect of
/// set mutation order. One toggle per qualifying press of the trigger key;
/// re-armed only when the trigger key is released.
pub struct ComboTracker {
    combo: KeyCombo,
    held: HashSet<Key>,
    fired: bool,
}

impl ComboTracker {
    #[must_use]
    pub fn new(combo: KeyCombo) -> Self {
        Self {
            combo,
            held: HashSet::new(),
            fired: false,
        }
    }

    /// Apply one notification; returns true when the combination fires.
    ///
    /// OS key repeat arrives as repeated press notifications for a held key;
    /// the fired flag absorbs them.
    pub fn on_notification(&mut self, notification: KeyNotification) -> bool {
        match notification {
            KeyNotification::Press(key) => {
                self.held.insert(key);
                if self.fired || !self.combo_satisfied() {
                    return false;
                }
                self.fired = true;
                debug!(?key, "hotkey combination satisfied");
                true
            }
            KeyNotification::Release(key) => {
                // removal of a key we never saw pressed is a no-op
                self.held.remove(&key);
                if key == self.combo.trigger {
                    self.fired = false;
                }
                false
            }
        }
    }

    fn combo_satisfied(&self) -> bool {
        self.combo
            .modifiers
            .iter()
            .all(|modifier| self.held.iter().any(|&key| modifier.matches(key)))
            && self.held.contains(&self.combo.trigger)
    }
}

/// Background thread turning raw key notifications into toggle calls.
///
/// The OS hook runs on its own thread and only forwards events into a
/// channel; this thread owns the [`ComboTracker`] and runs the orchestrator
/// inline, so session transitions are serialized by construction.
pub struct HotkeyWatcher {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HotkeyWatcher {
    /// Spawn the watcher thread and the OS input hook feeding it.
    ///
    /// # Errors
    /// Returns error if the watcher thread cannot be spawned. A hook
    /// registration failure surfaces later as an error log from the hook
    /// thread (rdev reports it only once `listen` runs).
    pub fn spawn(combo: KeyCombo, handler: Arc<dyn ToggleHandler>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        spawn_hook_thread(tx)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let tracker = ComboTracker::new(combo);

        let handle = std::thread::Builder::new()
            .name("hotkey-watcher".to_owned())
            .spawn(move || run_watcher(tracker, &rx, handler.as_ref(), &shutdown_flag))
            .context("failed to spawn hotkey watcher thread")?;

        info!("hotkey watcher started");

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Stop the watcher thread and wait for it to exit.
    ///
    /// The OS hook thread itself stays parked inside the platform hook and
    /// is reaped at process exit; it only ever forwards into a channel
    /// nobody reads after this point.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("hotkey watcher thread panicked");
            }
        }
        info!("hotkey watcher stopped");
    }
}

fn spawn_hook_thread(tx: Sender<KeyNotification>) -> Result<()> {
    std::thread::Builder::new()
        .name("input-hook".to_owned())
        .spawn(move || {
            // the hook callback must stay bounded: forward and return
            let result = rdev::listen(move |event| {
                let notification = match event.event_type {
                    EventType::KeyPress(key) => KeyNotification::Press(key),
                    EventType::KeyRelease(key) => KeyNotification::Release(key),
                    _ => return,
                };
                let _ = tx.send(notification);
            });
            if let Err(e) = result {
                error!("input hook failed: {:?}", e);
            }
        })
        .context("failed to spawn input hook thread")?;
    Ok(())
}

fn run_watcher(
    mut tracker: ComboTracker,
    rx: &Receiver<KeyNotification>,
    handler: &dyn ToggleHandler,
    shutdown: &AtomicBool,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        match rx.recv_timeout(SHUTDOWN_POLL) {
            Ok(notification) => {
                if tracker.on_notification(notification) {
                    dispatch_toggle(&mut tracker, rx, handler);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("input hook channel closed");
                break;
            }
        }
    }
}

fn dispatch_toggle(
    tracker: &mut ComboTracker,
    rx: &Receiver<KeyNotification>,
    handler: &dyn ToggleHandler,
) {
    let outcome = handler.handle_toggle();
    debug!(?outcome, "toggle handled");

    if outcome == ToggleOutcome::Started {
        return;
    }

    // A stop toggle blocks this thread for the length of the processing
    // cycle. Presses that queued up during the block would otherwise fire a
    // surprise new session the instant we return to Idle; apply them to the
    // held set but suppress their toggles.
    let mut suppressed = 0_u32;
    while let Ok(stale) = rx.try_recv() {
        if tracker.on_notification(stale) {
            suppressed += 1;
        }
    }
    if suppressed > 0 {
        info!(suppressed, "dropped toggle presses queued during processing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::keymap::resolve;
    use crate::config::HotkeyConfig;
    use std::sync::Mutex;

    fn combo(modifiers: &[&str], key: &str) -> KeyCombo {
        resolve(&HotkeyConfig {
            modifiers: modifiers.iter().map(|m| (*m).to_owned()).collect(),
            key: key.to_owned(),
        })
        .unwrap()
    }

    fn press(key: Key) -> KeyNotification {
        KeyNotification::Press(key)
    }

    fn release(key: Key) -> KeyNotification {
        KeyNotification::Release(key)
    }

    #[test]
    fn test_fires_once_per_qualifying_press() {
        let mut tracker = ComboTracker::new(combo(&["Control", "Alt"], "D"));
        assert!(!tracker.on_notification(press(Key::ControlLeft)));
        assert!(!tracker.on_notification(press(Key::Alt)));
        assert!(tracker.on_notification(press(Key::KeyD)));
    }

    #[test]
    fn test_no_fire_with_missing_modifier() {
        let mut tracker = ComboTracker::new(combo(&["Control", "Alt"], "D"));
        assert!(!tracker.on_notification(press(Key::ControlLeft)));
        assert!(!tracker.on_notification(press(Key::KeyD)));
    }

    #[test]
    fn test_key_repeat_does_not_refire() {
        let mut tracker = ComboTracker::new(combo(&["Control"], "D"));
        assert!(!tracker.on_notification(press(Key::ControlLeft)));
        assert!(tracker.on_notification(press(Key::KeyD)));
        // OS key repeat while held
        assert!(!tracker.on_notification(press(Key::KeyD)));
        assert!(!tracker.on_notification(press(Key::KeyD)));
    }

    #[test]
    fn test_refires_after_trigger_release_and_repress() {
        let mut tracker = ComboTracker::new(combo(&["Control"], "D"));
        assert!(!tracker.on_notification(press(Key::ControlLeft)));
        assert!(tracker.on_notification(press(Key::KeyD)));
        assert!(!tracker.on_notification(release(Key::KeyD)));
        assert!(tracker.on_notification(press(Key::KeyD)));
    }

    #[test]
    fn test_modifier_rerelease_does_not_refire_while_trigger_held() {
        let mut tracker = ComboTracker::new(combo(&["Control"], "D"));
        assert!(!tracker.on_notification(press(Key::ControlLeft)));
        assert!(tracker.on_notification(press(Key::KeyD)));
        // modifier bounces while trigger stays down
        assert!(!tracker.on_notification(release(Key::ControlLeft)));
        assert!(!tracker.on_notification(press(Key::ControlLeft)));
    }

    #[test]
    fn test_fires_when_trigger_pressed_before_modifier() {
        // the combination completes on whichever press satisfies it
        let mut tracker = ComboTracker::new(combo(&["Control"], "D"));
        assert!(!tracker.on_notification(press(Key::KeyD)));
        assert!(tracker.on_notification(press(Key::ControlLeft)));
    }

    #[test]
    fn test_either_modifier_variant_satisfies() {
        let mut tracker = ComboTracker::new(combo(&["Control"], "D"));
        assert!(!tracker.on_notification(press(Key::ControlRight)));
        assert!(tracker.on_notification(press(Key::KeyD)));
    }

    #[test]
    fn test_release_of_unseen_key_is_noop() {
        let mut tracker = ComboTracker::new(combo(&["Control"], "D"));
        assert!(!tracker.on_notification(release(Key::KeyX)));
        assert!(!tracker.on_notification(press(Key::ControlLeft)));
        assert!(tracker.on_notification(press(Key::KeyD)));
    }

    #[test]
    fn test_unrelated_keys_do_not_disturb_tracking() {
        let mut tracker = ComboTracker::new(combo(&["Control"], "D"));
        assert!(!tracker.on_notification(press(Key::ControlLeft)));
        assert!(!tracker.on_notification(press(Key::KeyQ)));
        assert!(!tracker.on_notification(release(Key::KeyQ)));
        assert!(tracker.on_notification(press(Key::KeyD)));
    }

    struct RecordingHandler {
        outcomes: Mutex<Vec<ToggleOutcome>>,
        script: Mutex<Vec<ToggleOutcome>>,
    }

    impl RecordingHandler {
        fn new(script: Vec<ToggleOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(Vec::new()),
                script: Mutex::new(script),
            }
        }
    }

    impl ToggleHandler for RecordingHandler {
        fn handle_toggle(&self) -> ToggleOutcome {
            let mut script = self.script.lock().unwrap();
            let outcome = if script.is_empty() {
                ToggleOutcome::Dropped
            } else {
                script.remove(0)
            };
            self.outcomes.lock().unwrap().push(outcome);
            outcome
        }
    }

    #[test]
    fn test_watcher_loop_drops_presses_queued_during_processing() {
        let (tx, rx) = mpsc::channel();
        let handler = RecordingHandler::new(vec![ToggleOutcome::Started, ToggleOutcome::Finished]);
        let shutdown = AtomicBool::new(false);
        let tracker = ComboTracker::new(combo(&["Control"], "D"));

        // start toggle
        tx.send(press(Key::ControlLeft)).unwrap();
        tx.send(press(Key::KeyD)).unwrap();
        tx.send(release(Key::KeyD)).unwrap();
        // stop toggle; the Finished outcome makes the loop drain the queue
        tx.send(press(Key::KeyD)).unwrap();
        // this press "arrives during processing" (already queued when the
        // stop toggle is serviced) and must not become a third toggle
        tx.send(release(Key::KeyD)).unwrap();
        tx.send(press(Key::KeyD)).unwrap();
        drop(tx);

        run_watcher(tracker, &rx, &handler, &shutdown);

        let outcomes = handler.outcomes.lock().unwrap();
        assert_eq!(
            *outcomes,
            vec![ToggleOutcome::Started, ToggleOutcome::Finished]
        );
    }

    #[test]
    fn test_watcher_loop_allows_back_to_back_sessions() {
        let (tx, rx) = mpsc::channel();
        let handler = Arc::new(RecordingHandler::new(vec![
            ToggleOutcome::Started,
            ToggleOutcome::Finished,
            ToggleOutcome::Started,
            ToggleOutcome::NoAudio,
        ]));
        let shutdown = Arc::new(AtomicBool::new(false));
        let tracker = ComboTracker::new(combo(&["Control"], "D"));

        let thread_handler = Arc::clone(&handler);
        let thread_shutdown = Arc::clone(&shutdown);
        let watcher = std::thread::spawn(move || {
            run_watcher(tracker, &rx, thread_handler.as_ref(), &thread_shutdown);
        });

        for _ in 0..2 {
            tx.send(press(Key::ControlLeft)).unwrap();
            tx.send(press(Key::KeyD)).unwrap();
            tx.send(release(Key::KeyD)).unwrap();
            tx.send(press(Key::KeyD)).unwrap();
            tx.send(release(Key::KeyD)).unwrap();
            tx.send(release(Key::ControlLeft)).unwrap();
            // let the loop go quiet between sessions so the drain after the
            // stop toggle finds an empty queue
            std::thread::sleep(Duration::from_millis(50));
        }
        drop(tx);
        watcher.join().unwrap();

        let outcomes = handler.outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 4, "expected two full sessions: {outcomes:?}");
    }

    #[test]
    fn test_watcher_loop_exits_on_shutdown_flag() {
        let (tx, rx) = mpsc::channel::<KeyNotification>();
        let handler = RecordingHandler::new(vec![]);
        let shutdown = AtomicBool::new(true);
        let tracker = ComboTracker::new(combo(&["Control"], "D"));

        run_watcher(tracker, &rx, &handler, &shutdown);
        drop(tx);
        assert!(handler.outcomes.lock().unwrap().is_empty());
    }
}

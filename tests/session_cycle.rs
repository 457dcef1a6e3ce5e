//! End-to-end session cycle tests.
//!
//! These wire the real hotkey tracker and session orchestrator together with
//! stub capture/transcription/output backends, covering the path from raw
//! key notifications to text landing in the clipboard. The OS input hook,
//! microphone, and Whisper model stay out; their contracts are exercised by
//! the per-module tests (hardware-dependent ones behind #[ignore]).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rdev::Key;

use dictate_hotkey::audio::{AudioBlock, Capture, CaptureError};
use dictate_hotkey::config::{
    AudioConfig, Config, ConfigHandle, HotkeyConfig, ModelConfig, OutputConfig, OutputMode,
    TypingConfig,
};
use dictate_hotkey::indicator::{status_channel, StatusCommand, StatusReceiver};
use dictate_hotkey::input::{keymap, ComboTracker, KeyNotification};
use dictate_hotkey::output::{BackendError, ClipboardBackend, Notifier, OutputDispatcher, TypingBackend};
use dictate_hotkey::session::{SessionOrchestrator, SessionState, ToggleOutcome};
use dictate_hotkey::transcription::{ModelInfo, Transcriber, TranscriptionError};

struct StubCapture {
    take: Option<AudioBlock>,
}

impl Capture for StubCapture {
    fn arm(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn finalize(&mut self) -> Result<Option<AudioBlock>, CaptureError> {
        Ok(self.take.take())
    }
}

struct StubTranscriber {
    text: &'static str,
    expected_samples: Vec<f32>,
}

impl Transcriber for StubTranscriber {
    fn transcribe(&self, block: &AudioBlock) -> Result<String, TranscriptionError> {
        assert_eq!(
            block.samples, self.expected_samples,
            "orchestrator must hand the finalized take through unchanged"
        );
        Ok(self.text.to_owned())
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            size: "stub".to_owned(),
            language: Some("en".to_owned()),
        }
    }
}

#[derive(Clone, Default)]
struct SharedClipboard(Arc<Mutex<Vec<String>>>);

impl ClipboardBackend for SharedClipboard {
    fn copy(&mut self, text: &str) -> Result<(), BackendError> {
        self.0.lock().unwrap().push(text.to_owned());
        Ok(())
    }
}

struct RejectingTyper;

impl TypingBackend for RejectingTyper {
    fn type_text(&mut self, _text: &str, _delay: Duration) -> Result<(), BackendError> {
        Err(BackendError("typing unavailable".to_owned()))
    }
}

#[derive(Clone, Default)]
struct CountingNotifier(Arc<Mutex<u32>>);

impl Notifier for CountingNotifier {
    fn notify(&self, _title: &str, _message: &str) {
        *self.0.lock().unwrap() += 1;
    }
}

fn test_config(mode: OutputMode, notify: bool) -> Config {
    Config {
        hotkey: HotkeyConfig {
            modifiers: vec!["Control".to_owned(), "Alt".to_owned()],
            key: "D".to_owned(),
        },
        audio: AudioConfig {
            channels: 1,
            sample_rate: 16_000,
            silence_threshold: 0.01,
        },
        model: ModelConfig {
            size: "tiny".to_owned(),
            path: "/tmp/ggml-tiny.bin".to_owned(),
            language: String::new(),
            threads: 4,
            beam_size: 5,
        },
        output: OutputConfig {
            mode,
            notify,
            typing: TypingConfig {
                delay_between_chars: 0.0,
                add_trailing_space: false,
                retry_count: 2,
            },
        },
        telemetry: Default::default(),
    }
}

fn take_samples() -> Vec<f32> {
    vec![0.25, -0.25, 0.5, -0.5]
}

struct Harness {
    orchestrator: Arc<SessionOrchestrator>,
    tracker: ComboTracker,
    status_rx: StatusReceiver,
    clipboard: SharedClipboard,
    notifications: CountingNotifier,
}

fn harness(mode: OutputMode, notify: bool) -> Harness {
    let config = test_config(mode, notify);
    let combo = keymap::resolve(&config.hotkey).unwrap();

    let clipboard = SharedClipboard::default();
    let notifications = CountingNotifier::default();
    let dispatcher = OutputDispatcher::new(
        Box::new(RejectingTyper),
        Box::new(clipboard.clone()),
        Box::new(notifications.clone()),
    );

    let (status_tx, status_rx) = status_channel();
    let orchestrator = Arc::new(
        SessionOrchestrator::new(
            Box::new(StubCapture {
                take: Some(AudioBlock {
                    samples: take_samples(),
                    sample_rate: 16_000,
                    channels: 1,
                }),
            }),
            Arc::new(StubTranscriber {
                text: "hello world",
                expected_samples: take_samples(),
            }),
            dispatcher,
            status_tx,
            Arc::new(ConfigHandle::from_config(config)),
        )
        .with_hide_grace(Duration::ZERO),
    );

    Harness {
        orchestrator,
        tracker: ComboTracker::new(combo),
        status_rx,
        clipboard,
        notifications,
    }
}

/// Feed one notification; when the combination fires, run the toggle
fn feed(harness: &mut Harness, notification: KeyNotification) -> Option<ToggleOutcome> {
    if harness.tracker.on_notification(notification) {
        Some(harness.orchestrator.handle_toggle())
    } else {
        None
    }
}

fn drain(rx: &StatusReceiver) -> Vec<StatusCommand> {
    let mut commands = Vec::new();
    while let Some(command) = rx.try_next() {
        commands.push(command);
    }
    commands
}

#[test]
fn round_trip_from_key_events_to_clipboard() {
    let mut h = harness(OutputMode::Clipboard, false);

    // press the combination: start toggle fires on the trigger press
    assert_eq!(feed(&mut h, KeyNotification::Press(Key::ControlLeft)), None);
    assert_eq!(feed(&mut h, KeyNotification::Press(Key::Alt)), None);
    assert_eq!(
        feed(&mut h, KeyNotification::Press(Key::KeyD)),
        Some(ToggleOutcome::Started)
    );
    assert_eq!(h.orchestrator.state(), SessionState::Recording);

    // release and press again: stop toggle runs the full cycle
    assert_eq!(feed(&mut h, KeyNotification::Release(Key::KeyD)), None);
    assert_eq!(
        feed(&mut h, KeyNotification::Press(Key::KeyD)),
        Some(ToggleOutcome::Finished)
    );
    assert_eq!(h.orchestrator.state(), SessionState::Idle);

    assert_eq!(*h.clipboard.0.lock().unwrap(), vec!["hello world".to_owned()]);
    assert_eq!(
        drain(&h.status_rx),
        vec![
            StatusCommand::Show,
            StatusCommand::SetMessage("listening".to_owned()),
            StatusCommand::SetMessage("transcribing".to_owned()),
            StatusCommand::SetMessage("copying".to_owned()),
            StatusCommand::Hide,
        ]
    );
}

#[test]
fn holding_the_combination_starts_exactly_one_session() {
    let mut h = harness(OutputMode::Clipboard, false);

    assert_eq!(feed(&mut h, KeyNotification::Press(Key::ControlLeft)), None);
    assert_eq!(feed(&mut h, KeyNotification::Press(Key::Alt)), None);
    assert_eq!(
        feed(&mut h, KeyNotification::Press(Key::KeyD)),
        Some(ToggleOutcome::Started)
    );

    // OS key repeat while the combination is held
    for _ in 0..5 {
        assert_eq!(feed(&mut h, KeyNotification::Press(Key::KeyD)), None);
    }
    assert_eq!(h.orchestrator.state(), SessionState::Recording);
}

#[test]
fn incomplete_combination_never_toggles() {
    let mut h = harness(OutputMode::Clipboard, false);

    assert_eq!(feed(&mut h, KeyNotification::Press(Key::ControlLeft)), None);
    assert_eq!(feed(&mut h, KeyNotification::Press(Key::KeyD)), None);
    assert_eq!(feed(&mut h, KeyNotification::Release(Key::KeyD)), None);
    assert_eq!(feed(&mut h, KeyNotification::Press(Key::KeyD)), None);

    assert_eq!(h.orchestrator.state(), SessionState::Idle);
    assert!(drain(&h.status_rx).is_empty());
}

#[test]
fn auto_mode_falls_back_to_clipboard_and_notifies() {
    let mut h = harness(OutputMode::Auto, true);

    assert_eq!(feed(&mut h, KeyNotification::Press(Key::ControlLeft)), None);
    assert_eq!(feed(&mut h, KeyNotification::Press(Key::Alt)), None);
    assert_eq!(
        feed(&mut h, KeyNotification::Press(Key::KeyD)),
        Some(ToggleOutcome::Started)
    );
    assert_eq!(feed(&mut h, KeyNotification::Release(Key::KeyD)), None);
    assert_eq!(
        feed(&mut h, KeyNotification::Press(Key::KeyD)),
        Some(ToggleOutcome::Finished)
    );

    // typing is rejected twice (retry_count = 2), clipboard lands the text
    assert_eq!(*h.clipboard.0.lock().unwrap(), vec!["hello world".to_owned()]);
    assert_eq!(*h.notifications.0.lock().unwrap(), 1);

    // the indicator reported the primary path ("typing"), not the fallback
    let commands = drain(&h.status_rx);
    assert!(commands.contains(&StatusCommand::SetMessage("typing".to_owned())));
    assert_eq!(commands.last(), Some(&StatusCommand::Hide));
}

#[test]
fn stop_with_empty_take_never_reaches_the_model() {
    struct RejectingTranscriber;
    impl Transcriber for RejectingTranscriber {
        fn transcribe(&self, _block: &AudioBlock) -> Result<String, TranscriptionError> {
            Err(TranscriptionError::StateCreation)
        }
        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                size: "stub".to_owned(),
                language: None,
            }
        }
    }

    let config = test_config(OutputMode::Clipboard, false);
    let combo = keymap::resolve(&config.hotkey).unwrap();
    let (status_tx, status_rx) = status_channel();
    let clipboard = SharedClipboard::default();
    let orchestrator = SessionOrchestrator::new(
        Box::new(StubCapture { take: None }),
        Arc::new(RejectingTranscriber),
        OutputDispatcher::new(
            Box::new(RejectingTyper),
            Box::new(clipboard.clone()),
            Box::new(CountingNotifier::default()),
        ),
        status_tx,
        Arc::new(ConfigHandle::from_config(config)),
    )
    .with_hide_grace(Duration::ZERO);

    let mut tracker = ComboTracker::new(combo);
    assert!(!tracker.on_notification(KeyNotification::Press(Key::ControlLeft)));
    assert!(!tracker.on_notification(KeyNotification::Press(Key::Alt)));
    assert!(tracker.on_notification(KeyNotification::Press(Key::KeyD)));
    assert_eq!(orchestrator.handle_toggle(), ToggleOutcome::Started);

    assert!(!tracker.on_notification(KeyNotification::Release(Key::KeyD)));
    assert!(tracker.on_notification(KeyNotification::Press(Key::KeyD)));
    assert_eq!(orchestrator.handle_toggle(), ToggleOutcome::NoAudio);

    assert_eq!(orchestrator.state(), SessionState::Idle);
    assert!(clipboard.0.lock().unwrap().is_empty());
    assert_eq!(
        drain(&status_rx),
        vec![
            StatusCommand::Show,
            StatusCommand::SetMessage("listening".to_owned()),
            StatusCommand::Hide,
        ]
    );
}

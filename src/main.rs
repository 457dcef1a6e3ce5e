use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use dictate_hotkey::audio::MicCapture;
use dictate_hotkey::config::{Config, ConfigHandle};
use dictate_hotkey::indicator::{status_channel, ConsoleIndicator, Indicator};
use dictate_hotkey::input::{keymap, HotkeyWatcher, ToggleHandler};
use dictate_hotkey::output::{ArboardClipboard, DesktopNotifier, EnigoTyper, OutputDispatcher};
use dictate_hotkey::scratch;
use dictate_hotkey::session::SessionOrchestrator;
use dictate_hotkey::telemetry;
use dictate_hotkey::transcription::{Transcriber, WhisperEngine};

/// Render tick for the status indicator drain loop
const RENDER_TICK: Duration = Duration::from_millis(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_handle = Arc::new(ConfigHandle::load()?);
    let config = config_handle.current();
    println!("✓ Config loaded from ~/.dictate-hotkey.toml");

    telemetry::init(&config.telemetry)?;
    tracing::info!("dictate-hotkey starting");

    // An unknown key name is a configuration error; fail before any thread spawns
    let combo = keymap::resolve(&config.hotkey).context("invalid hotkey configuration")?;
    println!(
        "✓ Hotkey resolved: {:?} + {}",
        config.hotkey.modifiers, config.hotkey.key
    );

    let swept = scratch::sweep_stale()?;
    if swept > 0 {
        println!("✓ Removed {swept} stale scratch takes");
    }

    let model_path = Config::expand_path(&config.model.path)?;
    let engine: Arc<dyn Transcriber> = Arc::new(
        WhisperEngine::new(&model_path, &config.model)
            .context("failed to load whisper model (set model.path to a ggml file on disk)")?,
    );
    println!("✓ Model loaded: {}", engine.model_info());

    let capture = MicCapture::new(&config.audio).context("failed to open audio input")?;
    println!("✓ Audio input ready");

    let dispatcher = OutputDispatcher::new(
        Box::new(EnigoTyper::new().context("failed to initialize typing backend")?),
        Box::new(ArboardClipboard),
        Box::new(DesktopNotifier),
    );

    let (status_tx, status_rx) = status_channel();
    let orchestrator = Arc::new(SessionOrchestrator::new(
        Box::new(capture),
        engine,
        dispatcher,
        status_tx,
        Arc::clone(&config_handle),
    ));

    let handler: Arc<dyn ToggleHandler> = Arc::clone(&orchestrator) as Arc<dyn ToggleHandler>;
    let watcher = HotkeyWatcher::spawn(combo, handler)?;

    println!(
        "\nDictate Hotkey is running. Press {:?} + {} to toggle dictation.",
        config.hotkey.modifiers, config.hotkey.key
    );
    println!("Press Ctrl+C to exit.\n");

    let shutdown = Arc::new(tokio::sync::Notify::new());
    spawn_signal_tasks(&shutdown, &config_handle, &config);

    // UI-owning loop: drain status commands, render, watch for shutdown
    let mut indicator = Indicator::new(ConsoleIndicator);
    loop {
        status_rx.drain(&mut indicator);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
            () = shutdown.notified() => {
                tracing::info!("termination signal received");
                break;
            }
            () = tokio::time::sleep(RENDER_TICK) => {}
        }
    }

    println!("\nShutting down...");
    orchestrator.shutdown();
    // render the final Hide before the channel goes away
    status_rx.drain(&mut indicator);
    watcher.shutdown();

    Ok(())
}

#[cfg(unix)]
fn spawn_signal_tasks(
    shutdown: &Arc<tokio::sync::Notify>,
    config_handle: &Arc<ConfigHandle>,
    startup_config: &Arc<Config>,
) {
    use tokio::signal::unix::{signal, SignalKind};

    // SIGTERM takes the same clean-shutdown path as Ctrl+C
    let notify = Arc::clone(shutdown);
    tokio::spawn(async move {
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            return;
        };
        sigterm.recv().await;
        notify.notify_one();
    });

    // SIGHUP swaps the config snapshot for subsequent sessions
    let handle = Arc::clone(config_handle);
    let startup = Arc::clone(startup_config);
    tokio::spawn(async move {
        let Ok(mut sighup) = signal(SignalKind::hangup()) else {
            return;
        };
        while sighup.recv().await.is_some() {
            match handle.reload() {
                Ok(reloaded) => {
                    if keymap::resolve(&reloaded.hotkey).is_err() {
                        tracing::error!("reloaded hotkey is invalid; keeping the registered one");
                    } else if reloaded.hotkey.key != startup.hotkey.key
                        || reloaded.hotkey.modifiers != startup.hotkey.modifiers
                    {
                        tracing::warn!("hotkey changes take effect after restart");
                    }
                }
                Err(e) => tracing::error!("config reload failed: {:#}", e),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_signal_tasks(
    _shutdown: &Arc<tokio::sync::Notify>,
    _config_handle: &Arc<ConfigHandle>,
    _startup_config: &Arc<Config>,
) {
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Application configuration, deserialized from `~/.dictate-hotkey.toml`
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub hotkey: HotkeyConfig,
    pub audio: AudioConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HotkeyConfig {
    pub modifiers: Vec<String>,
    pub key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AudioConfig {
    pub channels: u16,
    pub sample_rate: u32,
    pub silence_threshold: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Model size name ("tiny", "base", "small", ...)
    pub size: String,
    /// Path to the ggml model file
    pub path: String,
    /// Language code; empty string means auto-detect
    #[serde(default)]
    pub language: String,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_beam_size")]
    pub beam_size: usize,
}

/// How recognized text reaches the focused application
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Type,
    Clipboard,
    Auto,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub notify: bool,
    #[serde(default)]
    pub typing: TypingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TypingConfig {
    /// Seconds between simulated keystrokes
    pub delay_between_chars: f64,
    pub add_trailing_space: bool,
    pub retry_count: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub log_path: String,
}

fn default_threads() -> usize {
    4
}

fn default_beam_size() -> usize {
    5
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::Auto,
            notify: true,
            typing: TypingConfig::default(),
        }
    }
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            delay_between_chars: 0.01,
            add_trailing_space: true,
            retry_count: 3,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: "~/.dictate-hotkey/dictate.log".to_owned(),
        }
    }
}

impl Config {
    /// Load config from ~/.dictate-hotkey.toml, creating defaults if absent
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        Self::load_from(&config_path)
    }

    /// Load config from an explicit path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let contents = fs::read_to_string(path).context("failed to read config file")?;

        let config: Self = toml::from_str(&contents).context("failed to parse config TOML")?;

        Ok(config)
    }

    /// Path of the config file (`~/.dictate-hotkey.toml`)
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".dictate-hotkey.toml"))
    }

    fn create_default(path: &PathBuf) -> Result<()> {
        let default_config = r#"[hotkey]
modifiers = ["Control", "Alt"]
key = "D"

[audio]
channels = 1
sample_rate = 16000
silence_threshold = 0.01

[model]
size = "small"
path = "~/.dictate-hotkey/models/ggml-small.bin"
language = ""
threads = 4
beam_size = 5

[output]
mode = "auto"
notify = true

[output.typing]
delay_between_chars = 0.01
add_trailing_space = true
retry_count = 3

[telemetry]
enabled = false
log_path = "~/.dictate-hotkey/dictate.log"
"#;
        fs::write(path, default_config).context("failed to write default config")?;
        Ok(())
    }

    /// Expand ~ in paths to home directory
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }

    /// Language option as whisper expects it (None = auto-detect)
    #[must_use]
    pub fn language_option(&self) -> Option<String> {
        if self.model.language.is_empty() {
            None
        } else {
            Some(self.model.language.clone())
        }
    }
}

/// Shared handle to the active configuration snapshot.
///
/// Components capture an `Arc<Config>` via [`ConfigHandle::current`] when a
/// session starts; [`ConfigHandle::reload`] swaps the snapshot for subsequent
/// sessions without touching one already in flight.
pub struct ConfigHandle {
    path: PathBuf,
    current: Mutex<Arc<Config>>,
}

impl ConfigHandle {
    /// Load the initial snapshot from the default location
    pub fn load() -> Result<Self> {
        let path = Config::config_path()?;
        let config = Config::load()?;
        Ok(Self {
            path,
            current: Mutex::new(Arc::new(config)),
        })
    }

    /// Build a handle around an explicit path and snapshot
    #[must_use]
    pub fn new(path: PathBuf, config: Config) -> Self {
        Self {
            path,
            current: Mutex::new(Arc::new(config)),
        }
    }

    /// Build a handle around an already-loaded snapshot (no backing file)
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self::new(PathBuf::new(), config)
    }

    /// The active snapshot
    #[must_use]
    pub fn current(&self) -> Arc<Config> {
        match self.current.lock() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-read the config file and atomically replace the snapshot.
    ///
    /// Returns the new snapshot. A parse failure leaves the old snapshot in
    /// place.
    pub fn reload(&self) -> Result<Arc<Config>> {
        let config = Arc::new(Config::load_from(&self.path)?);
        match self.current.lock() {
            Ok(mut guard) => *guard = Arc::clone(&config),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&config),
        }
        tracing::info!("configuration reloaded");
        Ok(config)
    }
}

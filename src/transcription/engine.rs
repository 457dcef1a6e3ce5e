use anyhow::{Context, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::AudioBlock;
use crate::config::ModelConfig;

/// Model/language configuration a transcriber is running with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model size name ("tiny", "base", ...)
    pub size: String,
    /// Language code, `None` = auto-detect
    pub language: Option<String>,
}

impl std::fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.language {
            Some(lang) => write!(f, "{} ({})", self.size, lang),
            None => write!(f, "{} (auto)", self.size),
        }
    }
}

/// Errors that can occur during transcription
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// Failed to load Whisper model
    #[error("failed to load whisper model from {path}: {source}")]
    ModelLoad {
        /// Path to model file
        path: String,
        /// Underlying error
        source: anyhow::Error,
    },

    /// Failed to create Whisper inference state
    #[error("failed to create whisper state")]
    StateCreation,

    /// Transcription inference failed
    #[error("failed to transcribe audio")]
    Transcription(#[from] anyhow::Error),
}

/// Speech-to-text boundary.
///
/// The call may block for multiple seconds; the orchestrator treats a
/// failure as a Processing-path error, never a crash.
#[cfg_attr(test, mockall::automock)]
pub trait Transcriber: Send + Sync {
    /// Transcribe one finalized take to text
    ///
    /// # Errors
    /// Returns error if inference fails.
    fn transcribe(&self, block: &AudioBlock) -> Result<String, TranscriptionError>;

    /// The model/language configuration in effect
    fn model_info(&self) -> ModelInfo;
}

/// Whisper transcription engine
pub struct WhisperEngine {
    /// Whisper context (thread-safe behind the mutex)
    ctx: Arc<Mutex<WhisperContext>>,
    /// Number of CPU threads for inference
    threads: i32,
    /// Beam search width
    beam_size: i32,
    /// Language code (None = auto-detect)
    language: Option<String>,
    /// Size name for reporting
    size: String,
}

impl WhisperEngine {
    /// Determines sampling strategy based on beam size (pure, testable)
    const fn get_sampling_strategy(beam_size: i32) -> SamplingStrategy {
        if beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size,
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        }
    }

    /// Load the ggml model named by `config` from `model_path`.
    ///
    /// # Errors
    /// Returns error if the model file is missing or invalid, or if
    /// `threads`/`beam_size` are zero or exceed `i32::MAX`.
    pub fn new(model_path: &Path, config: &ModelConfig) -> Result<Self, TranscriptionError> {
        let language = if config.language.is_empty() {
            None
        } else {
            Some(config.language.clone())
        };

        if config.threads == 0 {
            return Err(TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("threads must be > 0"),
            });
        }
        if config.beam_size == 0 {
            return Err(TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("beam_size must be > 0"),
            });
        }

        let threads =
            i32::try_from(config.threads).map_err(|_| TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("threads value too large (max: {})", i32::MAX),
            })?;
        let beam_size =
            i32::try_from(config.beam_size).map_err(|_| TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("beam_size value too large (max: {})", i32::MAX),
            })?;

        tracing::info!(
            path = %model_path.display(),
            size = %config.size,
            threads,
            beam_size,
            language = ?language,
            "loading whisper model"
        );

        let path_str = model_path
            .to_str()
            .ok_or_else(|| TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("model path contains invalid UTF-8"),
            })?;

        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(path_str, params).map_err(|e| {
            TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("{e:?}"),
            }
        })?;

        tracing::info!("whisper model loaded");

        Ok(Self {
            ctx: Arc::new(Mutex::new(ctx)),
            threads,
            beam_size,
            language,
            size: config.size.clone(),
        })
    }

    fn transcribe_impl(&self, block: &AudioBlock) -> Result<String, TranscriptionError> {
        let audio_data = block.to_whisper_samples();
        let _span = tracing::debug_span!("transcription", samples = audio_data.len()).entered();

        let mut state = self
            .ctx
            .lock()
            .map_err(|e| anyhow::anyhow!("mutex poisoned: {e}"))?
            .create_state()
            .map_err(|_| TranscriptionError::StateCreation)?;

        let strategy = Self::get_sampling_strategy(self.beam_size);
        let mut params = FullParams::new(strategy);
        params.set_n_threads(self.threads);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(self.language.as_deref());
        params.set_translate(false);

        let start = std::time::Instant::now();
        state
            .full(params, &audio_data)
            .context("whisper inference failed")?;
        let inference_duration = start.elapsed();

        let mut result = String::new();
        for segment in state.as_iter() {
            result.push_str(&segment.to_string());
        }
        let result = result.trim().to_owned();

        tracing::info!(
            segments = state.full_n_segments(),
            text_len = result.len(),
            inference_ms = inference_duration.as_millis(),
            "transcription completed"
        );

        Ok(result)
    }
}

impl Transcriber for WhisperEngine {
    fn transcribe(&self, block: &AudioBlock) -> Result<String, TranscriptionError> {
        self.transcribe_impl(block)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            size: self.size.clone(),
            language: self.language.clone(),
        }
    }
}

// SAFETY: WhisperEngine is thread-safe because:
// 1. WhisperContext is wrapped in Arc<Mutex<>>, ensuring exclusive access
// 2. All methods require acquiring the mutex lock before accessing the context
// 3. No shared mutable state exists outside the mutex
// 4. whisper-rs WhisperContext is documented as thread-safe when properly synchronized
#[allow(unsafe_code)]
unsafe impl Send for WhisperEngine {}
#[allow(unsafe_code)]
unsafe impl Sync for WhisperEngine {}

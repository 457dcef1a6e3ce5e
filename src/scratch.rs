//! Scratch WAV spill for in-flight takes.
//!
//! Each finalized take is written here before transcription so it can be
//! inspected when the model mangles a recording, and removed as soon as the
//! cycle completes. A startup sweep clears takes orphaned by a crash.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::audio::AudioBlock;

const TAKE_PREFIX: &str = "take_";

fn scratch_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".dictate-hotkey").join("scratch"))
}

/// Spill one take to the scratch directory, returning its path.
///
/// # Errors
/// Returns error if the directory or WAV file cannot be written.
pub fn write_take(block: &AudioBlock) -> Result<PathBuf> {
    write_take_in(&scratch_dir()?, block)
}

fn write_take_in(dir: &Path, block: &AudioBlock) -> Result<PathBuf> {
    fs::create_dir_all(dir).context("failed to create scratch directory")?;

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("failed to get current time")?
        .as_millis();
    let path = dir.join(format!("{TAKE_PREFIX}{timestamp}.wav"));

    let spec = WavSpec {
        channels: block.channels,
        sample_rate: block.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(&path, spec).context("failed to create scratch WAV")?;
    for &sample in &block.samples {
        writer
            .write_sample(sample)
            .context("failed to write sample")?;
    }
    writer.finalize().context("failed to finalize scratch WAV")?;

    debug!(
        path = %path.display(),
        samples = block.samples.len(),
        "scratch take written"
    );
    Ok(path)
}

/// Remove a take once its cycle completes. Best-effort: a failure is logged,
/// the sweep will catch the file next startup.
pub fn remove_take(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "scratch take removed"),
        Err(e) => warn!(path = %path.display(), "failed to remove scratch take: {}", e),
    }
}

/// Delete takes left behind by a previous crash. Returns the number removed.
///
/// # Errors
/// Returns error if the directory listing fails; individual file deletion
/// failures are logged and skipped.
pub fn sweep_stale() -> Result<usize> {
    sweep_dir(&scratch_dir()?)
}

fn sweep_dir(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir).context("failed to read scratch directory")? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_file() || !is_take_file(&path) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                debug!(path = %path.display(), "stale take removed");
            }
            Err(e) => warn!(path = %path.display(), "failed to remove stale take: {}", e),
        }
    }

    if removed > 0 {
        tracing::info!(removed, "swept stale scratch takes");
    }
    Ok(removed)
}

fn is_take_file(path: &Path) -> bool {
    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    filename.starts_with(TAKE_PREFIX)
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
}

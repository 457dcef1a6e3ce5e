use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapRb,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AudioConfig;

/// Sample rate Whisper inference expects
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Longest take the ring buffer is sized for
const MAX_RECORDING_SECS: usize = 30;

/// Errors from the capture boundary
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No default input device
    #[error("no input device available")]
    NoDevice,

    /// Device or stream configuration failed
    #[error("failed to configure input stream: {0}")]
    StreamConfig(String),

    /// Stream transport control failed
    #[error("failed to {action} audio stream: {message}")]
    Stream {
        /// "resume" or "pause"
        action: &'static str,
        /// Backend error text
        message: String,
    },

    /// The thread owning the stream has exited
    #[error("audio control thread is gone")]
    ControlThreadGone,
}

/// One finalized recording: interleaved samples plus stream geometry
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    /// Interleaved samples at the device rate
    pub samples: Vec<f32>,
    /// Device sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

/// Whether a chunk's mean absolute amplitude falls below `threshold`.
///
/// Exposed for callers that want to skip silent chunks; nothing in the
/// session path gates on it beyond logging.
#[must_use]
pub fn is_silent(chunk: &[f32], threshold: f32) -> bool {
    if chunk.is_empty() {
        return true;
    }
    // f64 accumulator keeps long takes from losing precision
    let sum: f64 = chunk.iter().map(|&s| f64::from(s.abs())).sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = sum / (chunk.len() as f64);
    mean < f64::from(threshold)
}

impl AudioBlock {
    /// Whether the whole take is below the silence threshold
    #[must_use]
    pub fn is_silent(&self, threshold: f32) -> bool {
        is_silent(&self.samples, threshold)
    }

    /// Take length in seconds
    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let frames = (self.samples.len() / self.channels as usize) as f32;
        #[allow(clippy::cast_precision_loss)]
        {
            frames / self.sample_rate as f32
        }
    }

    /// Samples as 16kHz mono f32, the format Whisper consumes
    #[must_use]
    pub fn to_whisper_samples(&self) -> Vec<f32> {
        let mono = downmix_to_mono(&self.samples, self.channels);
        resample_linear(&mono, self.sample_rate, WHISPER_SAMPLE_RATE)
    }
}

/// Average interleaved channels into a mono track
fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels_f64 = f64::from(channels);
    samples
        .chunks(channels as usize)
        .map(|frame| {
            let sum_f64: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            // f64 → f32: audio samples are stored as f32, precision sufficient
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum_f64 / channels_f64) as f32
            }
        })
        .collect()
}

/// Linear-interpolation resampling
// Fractional index math needs f64 ↔ usize conversions
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len_f64 = (samples.len() as f64) / ratio;
    let output_len = if output_len_f64.is_finite() && output_len_f64 >= 0.0 {
        output_len_f64.ceil() as usize
    } else {
        samples.len()
    };

    let mut resampled = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_idx_f64 = (i as f64) * ratio;
        let src_idx_floor = if src_idx_f64 >= 0.0 && src_idx_f64 < (usize::MAX as f64) {
            src_idx_f64.floor() as usize
        } else {
            0
        };
        let src_idx_ceil = (src_idx_floor + 1).min(samples.len().saturating_sub(1));
        let fract = src_idx_f64 - src_idx_f64.floor();

        let sample = if src_idx_floor < samples.len() {
            let s1 = f64::from(samples[src_idx_floor]);
            let s2 = f64::from(samples[src_idx_ceil]);
            let interpolated = s1.mul_add(1.0 - fract, s2 * fract);
            interpolated as f32
        } else {
            0.0_f32
        };
        resampled.push(sample);
    }

    debug!(
        from_rate,
        to_rate,
        input_samples = samples.len(),
        output_samples = resampled.len(),
        "resampled"
    );

    resampled
}

/// Microphone boundary as the session orchestrator sees it
pub trait Capture: Send {
    /// Begin appending incoming frames to the take buffer
    ///
    /// # Errors
    /// Returns error if the stream cannot be resumed.
    fn arm(&mut self) -> Result<(), CaptureError>;

    /// Disarm, flush pending frames, and hand back the take.
    ///
    /// Returns `None` when zero frames were captured. No frames arrive
    /// after this returns.
    ///
    /// # Errors
    /// Returns error if the stream cannot be paused.
    fn finalize(&mut self) -> Result<Option<AudioBlock>, CaptureError>;
}

/// Trait for controlling audio stream lifecycle
trait StreamControl {
    /// Resume audio stream (activate microphone)
    fn play(&self) -> Result<(), CaptureError>;
    /// Pause audio stream (deactivate microphone)
    fn pause(&self) -> Result<(), CaptureError>;
}

/// CPAL stream wrapper implementing `StreamControl`
struct CpalStreamControl {
    stream: cpal::Stream,
}

impl StreamControl for CpalStreamControl {
    fn play(&self) -> Result<(), CaptureError> {
        self.stream.play().map_err(|e| CaptureError::Stream {
            action: "resume",
            message: e.to_string(),
        })
    }

    fn pause(&self) -> Result<(), CaptureError> {
        self.stream.pause().map_err(|e| CaptureError::Stream {
            action: "pause",
            message: e.to_string(),
        })
    }
}

/// Stream-owning side of the capture boundary.
///
/// Lives on the audio control thread; the realtime callback only does a
/// lock-free ring-buffer push gated by the armed flag, so it can never
/// block on orchestrator work.
struct CaptureWorker {
    stream: Box<dyn StreamControl>,
    consumer: HeapCons<f32>,
    armed: Arc<AtomicBool>,
    sample_rate: u32,
    channels: u16,
}

impl CaptureWorker {
    fn arm(&mut self) -> Result<(), CaptureError> {
        // discard anything left from an earlier take
        self.consumer.clear();

        // set the armed flag before resuming so no frame lands un-gated
        self.armed.store(true, Ordering::Relaxed);
        self.stream.play()?;

        debug!("capture armed");
        Ok(())
    }

    fn finalize(&mut self) -> Result<Option<AudioBlock>, CaptureError> {
        self.armed.store(false, Ordering::Relaxed);
        self.stream.pause()?;

        let mut samples = Vec::with_capacity(self.consumer.occupied_len());
        while let Some(sample) = self.consumer.try_pop() {
            samples.push(sample);
        }

        info!(samples = samples.len(), "capture finalized");

        if samples.is_empty() {
            return Ok(None);
        }

        Ok(Some(AudioBlock {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }))
    }
}

enum ControlRequest {
    Arm(Sender<Result<(), CaptureError>>),
    Finalize(Sender<Result<Option<AudioBlock>, CaptureError>>),
    Shutdown,
}

/// Microphone capture handle.
///
/// cpal streams are not `Send`, so the stream lives on a dedicated control
/// thread and this handle forwards `arm`/`finalize` requests to it.
pub struct MicCapture {
    requests: Sender<ControlRequest>,
}

impl MicCapture {
    /// Open the default input device and start its (paused) stream.
    ///
    /// # Errors
    /// Returns error if no input device is available or the stream cannot
    /// be built.
    pub fn new(config: &AudioConfig) -> Result<Self, CaptureError> {
        let (requests, request_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        std::thread::Builder::new()
            .name("audio-control".to_owned())
            .spawn(move || run_control_thread(&request_rx, &ready_tx))
            .map_err(|e| {
                CaptureError::StreamConfig(format!("failed to spawn audio control thread: {e}"))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    requested_rate = config.sample_rate,
                    requested_channels = config.channels,
                    "audio capture ready (device defaults in effect, resampled at finalize)"
                );
                Ok(Self { requests })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::ControlThreadGone),
        }
    }
}

impl Capture for MicCapture {
    fn arm(&mut self) -> Result<(), CaptureError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.requests
            .send(ControlRequest::Arm(reply_tx))
            .map_err(|_| CaptureError::ControlThreadGone)?;
        reply_rx.recv().map_err(|_| CaptureError::ControlThreadGone)?
    }

    fn finalize(&mut self) -> Result<Option<AudioBlock>, CaptureError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.requests
            .send(ControlRequest::Finalize(reply_tx))
            .map_err(|_| CaptureError::ControlThreadGone)?;
        reply_rx.recv().map_err(|_| CaptureError::ControlThreadGone)?
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        let _ = self.requests.send(ControlRequest::Shutdown);
    }
}

fn run_control_thread(
    requests: &Receiver<ControlRequest>,
    ready: &Sender<Result<(), CaptureError>>,
) {
    let mut worker = match build_worker() {
        Ok(worker) => {
            let _ = ready.send(Ok(()));
            worker
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while let Ok(request) = requests.recv() {
        match request {
            ControlRequest::Arm(reply) => {
                let _ = reply.send(worker.arm());
            }
            ControlRequest::Finalize(reply) => {
                let _ = reply.send(worker.finalize());
            }
            ControlRequest::Shutdown => break,
        }
    }
    debug!("audio control thread exiting");
}

fn build_worker() -> Result<CaptureWorker, CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

    let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
    info!("using input device: {}", device_name);

    let supported_config = device
        .default_input_config()
        .map_err(|e| CaptureError::StreamConfig(e.to_string()))?;

    let sample_rate = supported_config.sample_rate();
    let channels = supported_config.channels();
    info!("device config: {} Hz, {} channels", sample_rate, channels);

    // sized so no samples drop within the longest supported take
    let capacity = (sample_rate as usize) * (channels as usize) * MAX_RECORDING_SECS;
    let ring_buffer = HeapRb::<f32>::new(capacity);
    let (mut producer, consumer) = ring_buffer.split();

    let armed = Arc::new(AtomicBool::new(false));
    let armed_flag = Arc::clone(&armed);

    let stream_config = supported_config.into();
    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if armed_flag.load(Ordering::Relaxed) {
                    // lock-free push; bounded-time work only in the callback
                    let pushed = producer.push_slice(data);
                    if pushed < data.len() {
                        warn!("ring buffer full, dropped {} samples", data.len() - pushed);
                    }
                }
            },
            move |err| {
                warn!("audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| CaptureError::StreamConfig(e.to_string()))?;

    let stream = CpalStreamControl { stream };

    // start then immediately pause: the mic stays inactive until armed
    stream.play()?;
    stream.pause()?;
    debug!("audio stream initialized (paused)");

    Ok(CaptureWorker {
        stream: Box::new(stream),
        consumer,
        armed,
        sample_rate,
        channels,
    })
}

//! Audio capture from microphone
//!
//! A [`Microphone`] records exactly one phrase per [`Microphone::listen`]
//! call. The input stream only exists for the duration of that call.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};

use crate::error::RecognitionFailure;
use crate::{Error, Result};

/// Floor for the calibrated speech threshold
const MIN_ENERGY_THRESHOLD: f32 = 0.01;

/// Speech must be this many times louder than the ambient noise
const AMBIENT_MULTIPLIER: f32 = 1.5;

/// How long to wait for a capture chunk before re-checking deadlines
const RECV_POLL: Duration = Duration::from_millis(100);

/// Timing limits for one listen call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenLimits {
    /// Ambient noise sampled before listening, used to set the threshold
    pub calibration: Duration,
    /// Give up if no phrase starts within this window
    pub start_timeout: Duration,
    /// Cut a phrase off after this long
    pub phrase_limit: Duration,
    /// Trailing silence that ends a phrase
    pub pause: Duration,
}

impl Default for ListenLimits {
    fn default() -> Self {
        Self {
            calibration: Duration::from_millis(500),
            start_timeout: Duration::from_secs(5),
            phrase_limit: Duration::from_secs(5),
            pause: Duration::from_millis(800),
        }
    }
}

/// A captured phrase, mono
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSegment {
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate.max(1) as f32
    }

    /// Encode as 16-bit WAV for upload
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        samples_to_wav(&self.samples, self.sample_rate)
    }
}

/// One selectable input device
pub trait Microphone: Send + Sync {
    /// Record a single phrase
    ///
    /// # Errors
    ///
    /// `PhraseTimeout` if nobody speaks before the start timeout,
    /// `DeviceUnavailable` if the device is missing or fails
    fn listen(
        &self,
        limits: &ListenLimits,
    ) -> std::result::Result<AudioSegment, RecognitionFailure>;

    /// Human-readable name for logs and status lines
    fn name(&self) -> String;
}

/// Progress of phrase segmentation after a chunk
#[derive(Debug, Clone, PartialEq)]
pub enum PhraseProgress {
    /// Keep feeding audio
    Pending,
    /// A phrase ended (trailing silence or length limit)
    Complete(Vec<f32>),
    /// No phrase started before the start timeout
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhraseState {
    Waiting,
    InPhrase,
}

/// Splits a live sample stream into one phrase using RMS energy
#[derive(Debug)]
pub struct PhraseDetector {
    threshold: f32,
    state: PhraseState,
    phrase: Vec<f32>,
    waited: usize,
    silence: usize,
    start_timeout_samples: usize,
    phrase_limit_samples: usize,
    pause_samples: usize,
}

impl PhraseDetector {
    #[must_use]
    pub fn new(sample_rate: u32, limits: &ListenLimits) -> Self {
        Self {
            threshold: MIN_ENERGY_THRESHOLD,
            state: PhraseState::Waiting,
            phrase: Vec::new(),
            waited: 0,
            silence: 0,
            start_timeout_samples: samples_for(limits.start_timeout, sample_rate),
            phrase_limit_samples: samples_for(limits.phrase_limit, sample_rate).max(1),
            pause_samples: samples_for(limits.pause, sample_rate),
        }
    }

    /// Raise the speech threshold above the measured background noise
    pub fn calibrate(&mut self, ambient: &[f32]) {
        self.threshold = (calculate_energy(ambient) * AMBIENT_MULTIPLIER).max(MIN_ENERGY_THRESHOLD);
        tracing::trace!(threshold = self.threshold, "ambient noise calibrated");
    }

    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Feed the next chunk of captured audio
    pub fn push(&mut self, chunk: &[f32]) -> PhraseProgress {
        let is_speech = calculate_energy(chunk) > self.threshold;

        match self.state {
            PhraseState::Waiting => {
                if is_speech {
                    self.state = PhraseState::InPhrase;
                    self.phrase.extend_from_slice(chunk);
                    self.silence = 0;
                } else {
                    self.waited += chunk.len();
                    if self.waited >= self.start_timeout_samples {
                        return PhraseProgress::TimedOut;
                    }
                    return PhraseProgress::Pending;
                }
            }
            PhraseState::InPhrase => {
                self.phrase.extend_from_slice(chunk);
                if is_speech {
                    self.silence = 0;
                } else {
                    self.silence += chunk.len();
                }
            }
        }

        if self.phrase.len() >= self.phrase_limit_samples {
            let mut phrase = std::mem::take(&mut self.phrase);
            phrase.truncate(self.phrase_limit_samples);
            return PhraseProgress::Complete(phrase);
        }

        if self.silence >= self.pause_samples && self.pause_samples > 0 {
            return PhraseProgress::Complete(std::mem::take(&mut self.phrase));
        }

        PhraseProgress::Pending
    }
}

/// Input device selected by its index in the host's device list
pub struct CpalMicrophone {
    index: usize,
    name: String,
}

impl CpalMicrophone {
    /// Check that input device `index` exists
    ///
    /// # Errors
    ///
    /// Returns `MicrophoneUnavailable` if there is no such device
    pub fn new(index: usize) -> Result<Self> {
        let device = input_device(index)?;
        let name = device.name().unwrap_or_else(|_| format!("input #{index}"));

        tracing::debug!(index, device = %name, "microphone selected");

        Ok(Self { index, name })
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    fn open_stream(
        device: &Device,
        config: &StreamConfig,
        format: SampleFormat,
        tx: mpsc::Sender<Vec<f32>>,
    ) -> std::result::Result<Stream, RecognitionFailure> {
        let channels = usize::from(config.channels.max(1));
        let on_error = |err: cpal::StreamError| {
            tracing::error!(error = %err, "audio capture error");
        };

        let stream = match format {
            SampleFormat::F32 => device.build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = tx.send(downmix(data.iter().copied(), channels));
                },
                on_error,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let _ = tx.send(downmix(
                        data.iter().map(|s| f32::from(*s) / 32768.0),
                        channels,
                    ));
                },
                on_error,
                None,
            ),
            other => {
                return Err(RecognitionFailure::DeviceUnavailable(format!(
                    "unsupported input sample format {other:?}"
                )));
            }
        };

        stream.map_err(device_unavailable)
    }
}

impl Microphone for CpalMicrophone {
    fn listen(
        &self,
        limits: &ListenLimits,
    ) -> std::result::Result<AudioSegment, RecognitionFailure> {
        let device = input_device(self.index).map_err(|e| match e {
            Error::MicrophoneUnavailable(reason) => RecognitionFailure::DeviceUnavailable(reason),
            other => device_unavailable(other),
        })?;
        let supported = device.default_input_config().map_err(device_unavailable)?;
        let format = supported.sample_format();
        let config = supported.config();
        let sample_rate = config.sample_rate.0;

        let (tx, rx) = mpsc::channel();
        // Dropped on every return path, which releases the device
        let stream = Self::open_stream(&device, &config, format, tx)?;
        stream.play().map_err(device_unavailable)?;

        tracing::info!(device = %self.name, sample_rate, "listening");

        let mut detector = PhraseDetector::new(sample_rate, limits);
        let calibration_samples = samples_for(limits.calibration, sample_rate);
        let mut ambient = Vec::with_capacity(calibration_samples);
        let deadline = Instant::now()
            + limits.calibration
            + limits.start_timeout
            + limits.phrase_limit
            + Duration::from_secs(1);

        loop {
            if Instant::now() > deadline {
                return Err(RecognitionFailure::PhraseTimeout);
            }

            let chunk = match rx.recv_timeout(RECV_POLL) {
                Ok(chunk) => chunk,
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(RecognitionFailure::DeviceUnavailable(
                        "capture stream closed".to_string(),
                    ));
                }
            };

            if ambient.len() < calibration_samples {
                ambient.extend_from_slice(&chunk);
                if ambient.len() >= calibration_samples {
                    detector.calibrate(&ambient);
                }
                continue;
            }

            match detector.push(&chunk) {
                PhraseProgress::Pending => {}
                PhraseProgress::TimedOut => return Err(RecognitionFailure::PhraseTimeout),
                PhraseProgress::Complete(samples) => {
                    let segment = AudioSegment::new(samples, sample_rate);
                    tracing::debug!(seconds = segment.duration_secs(), "phrase captured");
                    return Ok(segment);
                }
            }
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

#[allow(clippy::needless_pass_by_value)]
fn device_unavailable(e: impl std::fmt::Display) -> RecognitionFailure {
    RecognitionFailure::DeviceUnavailable(e.to_string())
}

fn input_device(index: usize) -> Result<Device> {
    cpal::default_host()
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .nth(index)
        .ok_or_else(|| Error::MicrophoneUnavailable(format!("no input device at index {index}")))
}

fn downmix(samples: impl Iterator<Item = f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.collect();
    }

    let interleaved: Vec<f32> = samples.collect();
    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * f64::from(sample_rate)) as usize
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

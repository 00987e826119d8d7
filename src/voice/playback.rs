//! Audio playback to speakers
//!
//! Synthesized buffers are streamed in fixed-size blocks pulled by the output
//! device. Every [`PlaybackSession`] carries its own cancellation flag, so a
//! stop request from the interactive layer silences output within one block.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, Stream, StreamConfig, SupportedStreamConfig};
use uuid::Uuid;

use super::profile::apply_volume;
use crate::{Error, Result};

/// Frames handed to the device per callback
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// What the stream should do after the block just filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// More samples remain
    Continue,
    /// The session is exhausted or cancelled; stop pulling
    Finished,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every sample was delivered
    Completed { blocks: usize },
    /// Stopped early by a cancel request
    Cancelled { blocks: usize },
}

impl PlaybackOutcome {
    /// Number of blocks that carried audio
    #[must_use]
    pub const fn blocks(self) -> usize {
        match self {
            Self::Completed { blocks } | Self::Cancelled { blocks } => blocks,
        }
    }

    #[must_use]
    pub const fn was_cancelled(self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// One cancellable run of a synthesized buffer through the output device
#[derive(Debug)]
pub struct PlaybackSession {
    id: Uuid,
    samples: Vec<f32>,
    sample_rate: u32,
    block_size: usize,
    cursor: AtomicUsize,
    blocks: AtomicUsize,
    cancelled: AtomicBool,
    finished: AtomicBool,
}

impl PlaybackSession {
    fn new(samples: Vec<f32>, sample_rate: u32, block_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            samples,
            sample_rate,
            block_size: block_size.max(1),
            cursor: AtomicUsize::new(0),
            blocks: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Samples queued for output, with volume already applied
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Index of the next sample to be delivered
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// True once the stream has delivered its last block or was cancelled
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Fill the next output block
    ///
    /// Called from the device callback. A cancelled or exhausted session
    /// writes silence and reports [`BlockStatus::Finished`]; a short tail is
    /// zero-padded and is the last block delivered.
    pub fn fill_block(&self, out: &mut [f32]) -> BlockStatus {
        if self.is_done() || self.is_cancelled() {
            out.fill(0.0);
            self.finished.store(true, Ordering::Release);
            return BlockStatus::Finished;
        }

        let start = self.cursor.load(Ordering::Acquire);
        let end = (start + out.len()).min(self.samples.len());
        let filled = end - start;

        out[..filled].copy_from_slice(&self.samples[start..end]);
        out[filled..].fill(0.0);

        self.cursor.store(end, Ordering::Release);
        self.blocks.fetch_add(1, Ordering::AcqRel);

        if end >= self.samples.len() {
            self.finished.store(true, Ordering::Release);
            BlockStatus::Finished
        } else {
            BlockStatus::Continue
        }
    }

    /// Request a cooperative stop; no-op once the session is done
    pub fn cancel(&self) {
        if !self.is_done() {
            self.cancelled.store(true, Ordering::Release);
        }
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    fn outcome(&self) -> PlaybackOutcome {
        let blocks = self.blocks.load(Ordering::Acquire);
        if self.is_cancelled() && self.cursor() < self.samples.len() {
            PlaybackOutcome::Cancelled { blocks }
        } else {
            PlaybackOutcome::Completed { blocks }
        }
    }

    fn duration(&self) -> Duration {
        let rate = u64::from(self.sample_rate.max(1));
        let len = u64::try_from(self.samples.len()).unwrap_or(u64::MAX);
        Duration::from_millis(len.saturating_mul(1000) / rate)
    }

    fn block_duration(&self) -> Duration {
        let rate = u64::from(self.sample_rate.max(1));
        let block = u64::try_from(self.block_size).unwrap_or(u64::MAX);
        Duration::from_micros(block.saturating_mul(1_000_000) / rate)
    }
}

/// Shared reference to a registered session
#[derive(Debug, Clone)]
pub struct SessionHandle(Arc<PlaybackSession>);

impl SessionHandle {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.0.id()
    }

    #[must_use]
    pub fn session(&self) -> &Arc<PlaybackSession> {
        &self.0
    }

    /// Whether the session is still delivering audio
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.0.is_done() && !self.0.is_cancelled()
    }
}

/// An output device that pulls blocks from a session
pub trait AudioSink: Send {
    /// Stream `session` until it reports done, blocking the caller
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened or fails mid-stream
    fn stream(&mut self, session: &Arc<PlaybackSession>) -> Result<()>;
}

/// Owns the output device and the single active session
pub struct PlaybackController {
    sink: Mutex<Box<dyn AudioSink>>,
    /// Set by [`arm`](Self::arm) while the audio for the next session is
    /// still being produced. Locked before `current`.
    armed: Mutex<Option<Arc<AtomicBool>>>,
    current: Mutex<Option<SessionHandle>>,
    block_size: usize,
}

impl PlaybackController {
    #[must_use]
    pub fn new(sink: Box<dyn AudioSink>, block_size: usize) -> Self {
        Self {
            sink: Mutex::new(sink),
            armed: Mutex::new(None),
            current: Mutex::new(None),
            block_size: block_size.max(1),
        }
    }

    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Register a new session, superseding any session still playing
    ///
    /// Volume is applied here, before anything is queued to the device.
    /// A [`cancel_current`](Self::cancel_current) issued since the last
    /// [`arm`](Self::arm) makes the new session start out cancelled.
    #[must_use]
    pub fn begin(&self, samples: &[f32], sample_rate: u32, volume: f32) -> SessionHandle {
        let session =
            PlaybackSession::new(apply_volume(samples, volume), sample_rate, self.block_size);
        let handle = SessionHandle(Arc::new(session));

        let mut armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        if armed.take().is_some_and(|flag| flag.load(Ordering::Acquire)) {
            tracing::debug!(session = %handle.id(), "speech cancelled before playback");
            handle.0.cancel();
        }
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle.clone());
        drop(armed);

        if let Some(previous) = previous {
            if previous.is_active() {
                tracing::debug!(session = %previous.id(), "superseding active playback");
            }
            previous.0.cancel();
        }

        tracing::debug!(
            session = %handle.id(),
            samples = handle.0.samples.len(),
            sample_rate,
            volume,
            "playback session created"
        );

        handle
    }

    /// Drive a registered session through the sink until it finishes
    ///
    /// # Errors
    ///
    /// Returns error if the output device fails; the session is torn down
    /// either way
    pub fn run(&self, handle: &SessionHandle) -> Result<PlaybackOutcome> {
        let session = &handle.0;

        let result = if session.samples.is_empty() || session.is_cancelled() {
            Ok(())
        } else {
            self.sink
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .stream(session)
        };

        session.finish();
        self.release(handle);

        result?;
        let outcome = session.outcome();
        tracing::debug!(session = %handle.id(), ?outcome, "playback complete");
        Ok(outcome)
    }

    /// Register and stream a buffer in one call
    ///
    /// # Errors
    ///
    /// Returns error if the output device fails
    pub fn play(&self, samples: &[f32], sample_rate: u32, volume: f32) -> Result<PlaybackOutcome> {
        let handle = self.begin(samples, sample_rate, volume);
        self.run(&handle)
    }

    /// Request a cooperative stop of `handle`
    ///
    /// Completed or superseded sessions are left untouched.
    pub fn cancel(&self, handle: &SessionHandle) {
        if handle.is_active() {
            tracing::debug!(session = %handle.id(), "playback cancel requested");
        }
        handle.0.cancel();
    }

    /// Cancel whatever is playing right now
    ///
    /// Returns true if an active session was cancelled.
    pub fn cancel_current(&self) -> bool {
        let armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match (current, armed.as_ref()) {
            (Some(handle), _) if handle.is_active() => {
                self.cancel(&handle);
                true
            }
            (_, Some(flag)) => {
                tracing::debug!("pending speech cancelled");
                !flag.swap(true, Ordering::AcqRel)
            }
            _ => false,
        }
    }

    /// Mark the next session as on its way
    ///
    /// Lets [`cancel_current`](Self::cancel_current) reach speech whose audio
    /// is still being synthesized. Consumed by the next [`begin`](Self::begin).
    pub fn arm(&self) {
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(AtomicBool::new(false)));
    }

    /// Withdraw an [`arm`](Self::arm) that will not be followed by a session
    pub fn disarm(&self) {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    #[must_use]
    pub fn is_active(&self, handle: &SessionHandle) -> bool {
        handle.is_active()
    }

    /// The session registered most recently, if still tracked
    #[must_use]
    pub fn current(&self) -> Option<SessionHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn release(&self, handle: &SessionHandle) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|c| c.id() == handle.id()) {
            *current = None;
        }
    }
}

/// Plays sessions on the default output device
///
/// The device is looked up again for every session so the sink stays `Send`
/// and follows changes to the system default.
pub struct CpalSink {
    _private: (),
}

impl CpalSink {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self { _private: () })
    }

    fn open_stream(
        device: &Device,
        config: &StreamConfig,
        session: &Arc<PlaybackSession>,
        failure: &Arc<Mutex<Option<String>>>,
    ) -> std::result::Result<Stream, cpal::BuildStreamError> {
        let channels = usize::from(config.channels.max(1));
        let feed = Arc::clone(session);
        let failure = Arc::clone(failure);
        let mut mono = vec![0.0f32; session.block_size()];

        device.build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                if mono.len() < frames {
                    mono.resize(frames, 0.0);
                }
                feed.fill_block(&mut mono[..frames]);

                for (frame, sample) in data.chunks_mut(channels).zip(&mono) {
                    frame.fill(*sample);
                }
            },
            move |err| {
                tracing::error!(error = %err, "audio playback error");
                *failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
            },
            None,
        )
    }
}

impl AudioSink for CpalSink {
    fn stream(&mut self, session: &Arc<PlaybackSession>) -> Result<()> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device".to_string()))?;
        let supported = output_config(&device, session.sample_rate())?;
        let mut config = supported.config();

        let failure = Arc::new(Mutex::new(None));
        config.buffer_size = BufferSize::Fixed(
            u32::try_from(session.block_size())
                .map_err(|_| Error::Playback("block size out of range".to_string()))?,
        );

        // Not every backend honours a fixed buffer size
        let stream = match Self::open_stream(&device, &config, session, &failure) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!(error = %e, "fixed block size rejected, using device default");
                config.buffer_size = BufferSize::Default;
                Self::open_stream(&device, &config, session, &failure)
                    .map_err(|e| Error::Playback(e.to_string()))?
            }
        };

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        let poll = session.block_duration().min(Duration::from_millis(20));
        let timeout = session.duration() + Duration::from_millis(500);
        let start = Instant::now();

        while !session.is_done() && !session.is_cancelled() {
            if let Some(err) = failure.lock().unwrap_or_else(PoisonError::into_inner).take() {
                return Err(Error::Playback(err));
            }
            if start.elapsed() > timeout {
                tracing::warn!(session = %session.id(), "playback timed out");
                break;
            }
            std::thread::sleep(poll);
        }

        // Let the final block drain unless we were told to stop
        if !session.is_cancelled() {
            std::thread::sleep(session.block_duration());
        }

        drop(stream);
        Ok(())
    }
}

/// Find a mono (or, failing that, stereo) config at `sample_rate`
fn output_config(device: &Device, sample_rate: u32) -> Result<SupportedStreamConfig> {
    let rate = SampleRate(sample_rate);
    let fits = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels
            && c.sample_format() == cpal::SampleFormat::F32
            && c.min_sample_rate() <= rate
            && c.max_sample_rate() >= rate
    };

    device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| fits(c, 1))
        .or_else(|| {
            device
                .supported_output_configs()
                .ok()?
                .find(|c| fits(c, 2))
        })
        .map(|c| c.with_sample_rate(rate))
        .ok_or_else(|| Error::Audio(format!("no output config for {sample_rate} Hz")))
}

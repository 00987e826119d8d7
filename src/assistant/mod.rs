//! The listen → dispatch → speak loop
//!
//! [`AssistantLoop`] owns a single worker thread. The interactive side only
//! touches shared settings behind short-lived locks, the atomic state cell and
//! the playback controller's cancel flag, so every call here returns
//! immediately.

mod events;
mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub use events::{AssistantEvent, EventSender, event_channel};
pub use state::{AssistantState, StateCell};

use crate::commands::{CommandDispatcher, OsActions, Utterance};
use crate::error::RecognitionFailure;
use crate::voice::{
    ListenLimits, Microphone, PlaybackController, PlaybackOutcome, SpeechSource, Synthesizer,
    VoiceId, VoiceProfile,
};
use crate::{Error, Result};

/// Status emitted when a cycle produced no usable text
pub const NOT_RECOGNIZED: &str = "Could not recognize the command";

/// Status emitted while the loop waits for an input device
pub const MICROPHONE_NOT_SELECTED: &str = "Microphone is not selected";

const WORKER_NAME: &str = "assistant-loop";

/// Engines and side-effect handlers the loop drives
pub struct Collaborators {
    pub speech: Arc<dyn SpeechSource>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub playback: Arc<PlaybackController>,
    pub actions: Arc<dyn OsActions>,
    pub dispatcher: CommandDispatcher,
}

/// Fixed per-run settings
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Recognition language, e.g. `ru-RU`
    pub language: String,
    pub limits: ListenLimits,
    /// How often to re-check for a microphone while none is selected
    pub idle_poll: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            language: "ru-RU".to_string(),
            limits: ListenLimits::default(),
            idle_poll: Duration::from_millis(200),
        }
    }
}

struct Shared {
    state: StateCell,
    profile: Mutex<VoiceProfile>,
    microphone: Mutex<Option<Arc<dyn Microphone>>>,
    stop: AtomicBool,
    events: EventSender,
}

impl Shared {
    fn enter(&self, next: AssistantState) {
        if self.state.set(next) != next {
            tracing::debug!(state = %next, "assistant state");
            self.events.state(next);
        }
    }

    fn profile(&self) -> VoiceProfile {
        *self.profile.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn microphone(&self) -> Option<Arc<dyn Microphone>> {
        self.microphone
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Voice assistant state machine running on a dedicated thread
pub struct AssistantLoop {
    shared: Arc<Shared>,
    collaborators: Arc<Collaborators>,
    settings: LoopSettings,
    announcements: Option<mpsc::Sender<String>>,
    worker: Option<JoinHandle<()>>,
}

impl AssistantLoop {
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        settings: LoopSettings,
        profile: VoiceProfile,
        events: EventSender,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: StateCell::default(),
                profile: Mutex::new(profile),
                microphone: Mutex::new(None),
                stop: AtomicBool::new(false),
                events,
            }),
            collaborators: Arc::new(collaborators),
            settings,
            announcements: None,
            worker: None,
        }
    }

    /// Spawn the worker
    ///
    /// `microphone` replaces the current device when given. Without any
    /// device the worker waits, reporting [`MICROPHONE_NOT_SELECTED`].
    ///
    /// # Errors
    ///
    /// Returns error if the loop is already running or the thread cannot be
    /// spawned
    pub fn start(&mut self, microphone: Option<Arc<dyn Microphone>>) -> Result<()> {
        if self.is_running() {
            return Err(Error::Worker("assistant is already running".to_string()));
        }
        // Reap a previous run that ended on its own
        self.join();

        if let Some(mic) = microphone {
            self.update_microphone(mic);
        }

        self.shared.stop.store(false, Ordering::Release);
        self.shared.enter(AssistantState::Idle);

        let (tx, rx) = mpsc::channel();
        let worker = Worker {
            shared: Arc::clone(&self.shared),
            collaborators: Arc::clone(&self.collaborators),
            settings: self.settings.clone(),
            announcements: rx,
        };

        let handle = std::thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(|e| Error::Worker(format!("failed to spawn worker: {e}")))?;

        self.announcements = Some(tx);
        self.worker = Some(handle);
        tracing::info!("assistant started");
        Ok(())
    }

    /// Ask the worker to exit after its current step
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        tracing::info!("assistant stop requested");
    }

    /// Wait for the worker to exit
    pub fn join(&mut self) {
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            tracing::error!("assistant worker panicked");
            self.shared.enter(AssistantState::Stopped);
        }
        self.announcements = None;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    #[must_use]
    pub fn state(&self) -> AssistantState {
        self.shared.state.get()
    }

    /// Snapshot of the voice settings
    #[must_use]
    pub fn profile(&self) -> VoiceProfile {
        self.shared.profile()
    }

    /// Takes effect on the next speak step
    pub fn update_voice(&self, voice: VoiceId) {
        self.shared
            .profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .speaker = voice;
        tracing::info!(voice = %voice, "voice changed");
    }

    /// Linear gain, clamped into `[0, 1]`
    pub fn update_volume(&self, volume: f32) {
        let mut profile = self
            .shared
            .profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        profile.set_volume(volume);
        tracing::info!(volume = profile.volume, "volume changed");
    }

    /// Takes effect on the next listen step
    pub fn update_microphone(&self, microphone: Arc<dyn Microphone>) {
        tracing::info!(microphone = %microphone.name(), "microphone changed");
        *self
            .shared
            .microphone
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(microphone);
    }

    #[must_use]
    pub fn has_microphone(&self) -> bool {
        self.shared.microphone().is_some()
    }

    /// Queue a sentence for the worker to speak before its next listen
    ///
    /// Returns false, discarding the text, when the loop is not running.
    pub fn announce(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        match &self.announcements {
            Some(tx) if self.is_running() => tx.send(text).is_ok(),
            _ => {
                tracing::debug!(text = %text, "assistant not running, announcement dropped");
                false
            }
        }
    }

    /// Cancel whatever is being spoken right now
    pub fn stop_speaking(&self) -> bool {
        self.collaborators.playback.cancel_current()
    }
}

impl Drop for AssistantLoop {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.collaborators.playback.cancel_current();
    }
}

enum Flow {
    Continue,
    Stop,
    /// The microphone failed for good, carrying the reason
    MicrophoneLost(String),
}

struct Worker {
    shared: Arc<Shared>,
    collaborators: Arc<Collaborators>,
    settings: LoopSettings,
    announcements: mpsc::Receiver<String>,
}

impl Worker {
    fn run(self) {
        let mut waiting_reported = false;
        // A device that failed stays parked until another one is selected
        let mut lost: Option<Arc<dyn Microphone>> = None;

        while !self.shared.stop_requested() {
            self.speak_announcements();
            if self.shared.stop_requested() {
                break;
            }

            let microphone = self
                .shared
                .microphone()
                .filter(|mic| !lost.as_ref().is_some_and(|bad| Arc::ptr_eq(bad, mic)));
            let Some(microphone) = microphone else {
                self.shared.enter(AssistantState::Idle);
                if !waiting_reported {
                    tracing::warn!("no microphone selected");
                    self.shared.events.status(MICROPHONE_NOT_SELECTED);
                    waiting_reported = true;
                }
                std::thread::sleep(self.settings.idle_poll);
                continue;
            };
            waiting_reported = false;
            lost = None;

            match self.cycle(microphone.as_ref()) {
                Flow::Continue => {}
                Flow::Stop => break,
                Flow::MicrophoneLost(reason) => {
                    tracing::error!(
                        microphone = %microphone.name(),
                        reason = %reason,
                        "microphone lost"
                    );
                    self.shared.enter(AssistantState::Idle);
                    self.shared
                        .events
                        .status(Error::MicrophoneUnavailable(reason).to_string());
                    waiting_reported = true;
                    lost = Some(microphone);
                }
            }
        }

        self.shared.enter(AssistantState::Stopped);
        tracing::info!("assistant stopped");
    }

    fn cycle(&self, microphone: &dyn Microphone) -> Flow {
        let started = Instant::now();
        let utterance = match self.listen(microphone) {
            Ok(utterance) if !utterance.is_empty() => utterance,
            Ok(_) => return self.not_recognized(started),
            Err(RecognitionFailure::DeviceUnavailable(reason)) => {
                return Flow::MicrophoneLost(reason);
            }
            Err(failure) => {
                log_failure(&failure);
                return self.not_recognized(started);
            }
        };
        self.shared.events.status(format!("You said: {utterance}"));

        self.shared.enter(AssistantState::Dispatching);
        let decision = self.collaborators.dispatcher.dispatch(&utterance);

        // Reply first, then the action it announces
        self.shared.enter(AssistantState::Speaking);
        self.say(&decision.response);

        if let Some(action) = decision.os_action {
            self.collaborators.actions.perform(action);
        }

        if decision.continue_loop {
            Flow::Continue
        } else {
            Flow::Stop
        }
    }

    fn listen(
        &self,
        microphone: &dyn Microphone,
    ) -> std::result::Result<Utterance, RecognitionFailure> {
        self.shared.enter(AssistantState::Listening);
        self.shared.events.listening(true);

        let heard = microphone
            .listen(&self.settings.limits)
            .and_then(|segment| {
                self.collaborators
                    .speech
                    .recognize(&segment, &self.settings.language)
            });

        self.shared.events.listening(false);
        heard.map(|text| Utterance::new(&text))
    }

    /// Report a cycle without an utterance
    ///
    /// Cycles that fail faster than `idle_poll` are padded up to it so a
    /// broken recognizer cannot spin the worker.
    fn not_recognized(&self, started: Instant) -> Flow {
        self.shared.events.status(NOT_RECOGNIZED);
        if let Some(rest) = self.settings.idle_poll.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
        Flow::Continue
    }

    fn speak_announcements(&self) {
        while let Ok(text) = self.announcements.try_recv() {
            if self.shared.stop_requested() {
                return;
            }
            self.shared.enter(AssistantState::Speaking);
            self.say(&text);
        }
    }

    /// Speak `text`, reporting failures as status events
    fn say(&self, text: &str) {
        match self.speak(text) {
            Ok(outcome) if outcome.was_cancelled() => {
                tracing::info!(blocks = outcome.blocks(), "speech interrupted");
            }
            Ok(outcome) => {
                tracing::debug!(blocks = outcome.blocks(), "speech finished");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to speak response");
                self.shared
                    .events
                    .status(format!("Could not speak the response: {e}"));
            }
        }
    }

    fn speak(&self, text: &str) -> Result<PlaybackOutcome> {
        let profile = self.shared.profile();
        let playback = &self.collaborators.playback;

        playback.arm();
        let samples = match self.collaborators.synthesizer.synthesize(
            text,
            profile.speaker.as_str(),
            profile.sample_rate,
        ) {
            Ok(samples) => samples,
            Err(e) => {
                playback.disarm();
                return Err(e.into());
            }
        };
        playback.play(&samples, profile.sample_rate, profile.volume)
    }
}

fn log_failure(failure: &RecognitionFailure) {
    match failure {
        RecognitionFailure::NoSpeechDetected => tracing::warn!("speech not recognized"),
        RecognitionFailure::PhraseTimeout => tracing::warn!("timed out waiting for a phrase"),
        RecognitionFailure::ServiceUnavailable(reason)
        | RecognitionFailure::DeviceUnavailable(reason) => {
            tracing::error!(reason = %reason, "recognition service unavailable");
        }
    }
}

//! Shared test utilities
//!
//! Fakes for every hardware and network boundary so the assistant can run
//! end to end inside a test.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use voxloop::assistant::{AssistantEvent, Collaborators, LoopSettings};
use voxloop::commands::{CommandDispatcher, OsAction, OsActions};
use voxloop::control::{ControlListener, MicrophoneProvider};
use voxloop::voice::{
    AudioSegment, AudioSink, BlockStatus, ListenLimits, Microphone, PlaybackController,
    PlaybackSession, SpeechSource, Synthesizer,
};
use voxloop::{AssistantState, Error, RecognitionFailure, Result, SynthesisError};

pub const TEST_RATE: u32 = 48000;

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Fast settings for loop tests
pub fn test_settings() -> LoopSettings {
    LoopSettings {
        language: "ru-RU".to_string(),
        limits: ListenLimits::default(),
        idle_poll: Duration::from_millis(10),
    }
}

/// Microphone that hands back a short segment immediately
pub struct StaticMicrophone {
    name: String,
    calls: AtomicUsize,
}

impl StaticMicrophone {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Microphone for StaticMicrophone {
    fn listen(
        &self,
        _limits: &ListenLimits,
    ) -> std::result::Result<AudioSegment, RecognitionFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(1));
        Ok(AudioSegment::new(vec![0.1; 160], 16000))
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Microphone whose `listen` fails at once
pub struct BrokenMicrophone {
    failure: RecognitionFailure,
    calls: AtomicUsize,
}

impl BrokenMicrophone {
    pub fn new(failure: RecognitionFailure) -> Arc<Self> {
        Arc::new(Self {
            failure,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Microphone for BrokenMicrophone {
    fn listen(
        &self,
        _limits: &ListenLimits,
    ) -> std::result::Result<AudioSegment, RecognitionFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.failure.clone())
    }

    fn name(&self) -> String {
        "broken mic".to_string()
    }
}

/// Opens a [`StaticMicrophone`] for index 0 only
pub struct FakeMicrophones;

impl MicrophoneProvider for FakeMicrophones {
    fn open(&self, index: usize) -> Result<Arc<dyn Microphone>> {
        if index == 0 {
            Ok(StaticMicrophone::new("test mic"))
        } else {
            Err(Error::MicrophoneUnavailable(format!("no input device at index {index}")))
        }
    }
}

/// Recognizer that replays a script, then times out forever
///
/// Answers instantly, so an exhausted script also checks the worker's own
/// pacing.
pub struct ScriptedSpeech {
    script: Mutex<VecDeque<std::result::Result<String, RecognitionFailure>>>,
}

impl ScriptedSpeech {
    pub fn new(script: Vec<std::result::Result<String, RecognitionFailure>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }

    /// Script made only of successful transcripts
    pub fn saying(lines: &[&str]) -> Arc<Self> {
        Self::new(lines.iter().map(|l| Ok((*l).to_string())).collect())
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

impl SpeechSource for ScriptedSpeech {
    fn recognize(
        &self,
        _segment: &AudioSegment,
        _language: &str,
    ) -> std::result::Result<String, RecognitionFailure> {
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or(Err(RecognitionFailure::PhraseTimeout))
    }
}

/// Synthesizer returning a constant tone and recording requests
pub struct FakeSynthesizer {
    samples_per_call: usize,
    fail_on: Option<String>,
    delay: Duration,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeSynthesizer {
    fn build(samples_per_call: usize, fail_on: Option<String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            samples_per_call,
            fail_on,
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn new(samples_per_call: usize) -> Arc<Self> {
        Self::build(samples_per_call, None, Duration::ZERO)
    }

    /// Fails for any text containing `needle`
    pub fn failing_on(samples_per_call: usize, needle: &str) -> Arc<Self> {
        Self::build(samples_per_call, Some(needle.to_string()), Duration::ZERO)
    }

    /// Takes `delay` per request, like a remote model
    pub fn slow(samples_per_call: usize, delay: Duration) -> Arc<Self> {
        Self::build(samples_per_call, None, delay)
    }

    /// `(text, speaker)` for every request, failed ones included
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls().into_iter().map(|(text, _)| text).collect()
    }
}

impl Synthesizer for FakeSynthesizer {
    fn synthesize(
        &self,
        text: &str,
        speaker: &str,
        _sample_rate: u32,
    ) -> std::result::Result<Vec<f32>, SynthesisError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), speaker.to_string()));
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail_on.as_deref().is_some_and(|n| text.contains(n)) {
            return Err(SynthesisError::Service("model crashed".to_string()));
        }
        Ok(vec![0.5; self.samples_per_call])
    }
}

#[derive(Debug, Default)]
struct Tape {
    samples: Vec<f32>,
    callbacks: usize,
    sessions: usize,
}

/// What a [`RecordingSink`] received, readable from the test
#[derive(Debug, Clone, Default)]
pub struct Recording(Arc<Mutex<Tape>>);

impl Recording {
    pub fn samples(&self) -> Vec<f32> {
        self.0.lock().unwrap().samples.clone()
    }

    pub fn non_zero(&self) -> usize {
        self.samples().iter().filter(|s| **s != 0.0).count()
    }

    /// Device callbacks, the final silent one after a cancel included
    pub fn callbacks(&self) -> usize {
        self.0.lock().unwrap().callbacks
    }

    pub fn sessions(&self) -> usize {
        self.0.lock().unwrap().sessions
    }
}

/// Sink that pulls blocks like a device would and keeps what it got
pub struct RecordingSink {
    recording: Recording,
    cancel_after: Option<usize>,
    block_delay: Duration,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> (Self, Recording) {
        let recording = Recording::default();
        let sink = Self {
            recording: recording.clone(),
            cancel_after: None,
            block_delay: Duration::ZERO,
            fail: false,
        };
        (sink, recording)
    }

    /// Cancel the session from inside the callback after `blocks` blocks
    pub fn cancel_after(mut self, blocks: usize) -> Self {
        self.cancel_after = Some(blocks);
        self
    }

    /// Sleep between callbacks, like a real device clock
    pub fn paced(mut self, delay: Duration) -> Self {
        self.block_delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl AudioSink for RecordingSink {
    fn stream(&mut self, session: &Arc<PlaybackSession>) -> Result<()> {
        self.recording.0.lock().unwrap().sessions += 1;
        if self.fail {
            return Err(Error::Playback("device unplugged".to_string()));
        }

        let mut block = vec![0.0; session.block_size()];
        let mut pulled = 0;
        loop {
            let status = session.fill_block(&mut block);
            {
                let mut tape = self.recording.0.lock().unwrap();
                tape.samples.extend_from_slice(&block);
                tape.callbacks += 1;
            }
            if status == BlockStatus::Finished {
                return Ok(());
            }
            pulled += 1;
            if self.cancel_after == Some(pulled) {
                session.cancel();
            }
            if !self.block_delay.is_zero() {
                std::thread::sleep(self.block_delay);
            }
        }
    }
}

/// Launcher that only remembers what it was asked to do
pub struct RecordingActions {
    synthesizer: Arc<FakeSynthesizer>,
    performed: Mutex<Vec<(OsAction, Option<String>)>>,
}

impl RecordingActions {
    pub fn new(synthesizer: Arc<FakeSynthesizer>) -> Self {
        Self {
            synthesizer,
            performed: Mutex::new(Vec::new()),
        }
    }

    pub fn performed(&self) -> Vec<OsAction> {
        self.performed
            .lock()
            .unwrap()
            .iter()
            .map(|(action, _)| *action)
            .collect()
    }

    /// The last text sent to the synthesizer when each action ran
    pub fn last_spoken(&self) -> Vec<Option<String>> {
        self.performed
            .lock()
            .unwrap()
            .iter()
            .map(|(_, spoken)| spoken.clone())
            .collect()
    }
}

impl OsActions for RecordingActions {
    fn perform(&self, action: OsAction) {
        let spoken = self.synthesizer.texts().pop();
        self.performed.lock().unwrap().push((action, spoken));
    }
}

/// Handles on the fakes wired into a set of [`Collaborators`]
pub struct Probes {
    pub speech: Arc<ScriptedSpeech>,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub playback: Arc<PlaybackController>,
    pub recording: Recording,
    pub actions: Arc<RecordingActions>,
}

/// Wire fakes together around `speech`, `synthesizer` and `sink`
pub fn wire(
    speech: Arc<ScriptedSpeech>,
    synthesizer: Arc<FakeSynthesizer>,
    sink: RecordingSink,
) -> (Collaborators, Probes) {
    let recording = sink.recording.clone();
    let playback = Arc::new(PlaybackController::new(Box::new(sink), 1024));
    let actions = Arc::new(RecordingActions::new(Arc::clone(&synthesizer)));

    let collaborators = Collaborators {
        speech: speech.clone(),
        synthesizer: synthesizer.clone(),
        playback: Arc::clone(&playback),
        actions: actions.clone(),
        dispatcher: CommandDispatcher::default(),
    };
    let probes = Probes {
        speech,
        synthesizer,
        playback,
        recording,
        actions,
    };
    (collaborators, probes)
}

/// Fakes with a scripted recognizer and an instant sink
pub fn scripted(lines: &[&str]) -> (Collaborators, Probes) {
    let (sink, _) = RecordingSink::new();
    wire(ScriptedSpeech::saying(lines), FakeSynthesizer::new(2048), sink)
}

/// Status texts in arrival order
pub fn statuses(events: &[AssistantEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            AssistantEvent::Status(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Listener that keeps everything it is told
#[derive(Debug, Default)]
pub struct CollectingListener {
    pub statuses: Vec<String>,
    pub listening: Vec<bool>,
    pub states: Vec<AssistantState>,
}

impl ControlListener for CollectingListener {
    fn on_status(&mut self, text: &str) {
        self.statuses.push(text.to_string());
    }

    fn on_listening(&mut self, active: bool) {
        self.listening.push(active);
    }

    fn on_state(&mut self, state: AssistantState) {
        self.states.push(state);
    }
}

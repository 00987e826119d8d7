//! Boundary between the interactive layer and the assistant loop
//!
//! Every command returns immediately. Outcomes the user should see travel as
//! [`AssistantEvent`]s through the same ordered channel the worker uses, so a
//! listener receives surface and worker events interleaved in the order they
//! happened.

use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::assistant::{
    AssistantEvent, AssistantLoop, AssistantState, Collaborators, EventSender, LoopSettings,
    event_channel,
};
use crate::Result;
use crate::voice::{CpalMicrophone, Microphone, VoiceId, VoiceProfile};

/// Receives assistant events on the interactive thread
pub trait ControlListener {
    fn on_status(&mut self, text: &str);

    fn on_listening(&mut self, active: bool);

    fn on_state(&mut self, _state: AssistantState) {}
}

/// Opens input devices by index
pub trait MicrophoneProvider: Send {
    /// # Errors
    ///
    /// Returns `MicrophoneUnavailable` if there is no device at `index`
    fn open(&self, index: usize) -> Result<Arc<dyn Microphone>>;
}

/// Opens `cpal` input devices
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMicrophones;

impl MicrophoneProvider for CpalMicrophones {
    fn open(&self, index: usize) -> Result<Arc<dyn Microphone>> {
        Ok(Arc::new(CpalMicrophone::new(index)?))
    }
}

/// Forward one event to the matching listener callback
pub fn deliver(event: &AssistantEvent, listener: &mut dyn ControlListener) {
    match event {
        AssistantEvent::Status(text) => listener.on_status(text),
        AssistantEvent::Listening(active) => listener.on_listening(*active),
        AssistantEvent::State(state) => listener.on_state(*state),
    }
}

/// Commands and event stream for a running assistant
pub struct ControlSurface {
    assistant: AssistantLoop,
    events: UnboundedReceiver<AssistantEvent>,
    status: EventSender,
    microphones: Box<dyn MicrophoneProvider>,
    microphone_index: Option<usize>,
}

impl ControlSurface {
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        settings: LoopSettings,
        profile: VoiceProfile,
        microphones: Box<dyn MicrophoneProvider>,
    ) -> Self {
        let (status, events) = event_channel();
        let assistant = AssistantLoop::new(collaborators, settings, profile, status.clone());
        Self {
            assistant,
            events,
            status,
            microphones,
            microphone_index: None,
        }
    }

    /// Start the worker
    ///
    /// A no-op with a status event while the loop is already running.
    pub fn start(&mut self) {
        if self.assistant.is_running() {
            self.status.status("Assistant is already running");
            return;
        }
        match self.assistant.start(None) {
            Ok(()) => self.status.status("Working"),
            Err(e) => {
                tracing::error!(error = %e, "failed to start assistant");
                self.status.status(format!("Error: {e}"));
            }
        }
    }

    /// Request the worker to exit after its current step
    pub fn stop(&mut self) {
        if !self.assistant.is_running() {
            self.status.status("Assistant is not running");
            return;
        }
        self.assistant.stop();
        self.status.status("Stopping");
    }

    /// Cancel the current speech, if any
    pub fn stop_speaking(&self) -> bool {
        let cancelled = self.assistant.stop_speaking();
        if cancelled {
            tracing::info!("speech cancelled");
        }
        cancelled
    }

    /// Switch voice by name
    pub fn set_voice(&mut self, id: &str) {
        match VoiceId::from_str(id) {
            Ok(voice) => {
                self.assistant.update_voice(voice);
                self.status.status(format!("Voice: {voice}"));
                self.assistant
                    .announce(format!("Now I'm using my voice {voice}"));
            }
            Err(e) => self.status.status(e.to_string()),
        }
    }

    /// Set volume as a percentage in `0..=100`
    pub fn set_volume(&mut self, percent: u32) {
        let Ok(percent) = u8::try_from(percent) else {
            self.status.status(format!("Volume must be 0-100, got {percent}"));
            return;
        };
        if percent > 100 {
            self.status.status(format!("Volume must be 0-100, got {percent}"));
            return;
        }

        self.assistant.update_volume(f32::from(percent) / 100.0);
        self.status.status(format!("Volume: {percent}"));
        if percent % 10 == 0 {
            self.assistant
                .announce(format!("The volume is set to {percent}"));
        }
    }

    /// Select the input device used from the next listen on
    pub fn set_microphone(&mut self, index: usize) {
        match self.microphones.open(index) {
            Ok(microphone) => {
                let name = microphone.name();
                self.assistant.update_microphone(microphone);
                self.microphone_index = Some(index);
                self.status.status(format!("Microphone: {name}"));
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "cannot open microphone");
                self.status.status(e.to_string());
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.assistant.is_running()
    }

    #[must_use]
    pub fn state(&self) -> AssistantState {
        self.assistant.state()
    }

    #[must_use]
    pub fn profile(&self) -> VoiceProfile {
        self.assistant.profile()
    }

    #[must_use]
    pub const fn microphone_index(&self) -> Option<usize> {
        self.microphone_index
    }

    /// Deliver every queued event without blocking, returning how many
    pub fn pump(&mut self, listener: &mut dyn ControlListener) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.events.try_recv() {
            deliver(&event, listener);
            delivered += 1;
        }
        delivered
    }

    /// Wait for the next event
    pub async fn next_event(&mut self) -> Option<AssistantEvent> {
        self.events.recv().await
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(&mut self) {
        self.assistant.stop();
        self.assistant.stop_speaking();
        self.assistant.join();
    }
}

//! voxloop - a voice-driven command loop
//!
//! Listens on a microphone, recognizes the phrase, picks a canned reply for
//! it and speaks the reply back, while the interactive side can change
//! voice, volume and microphone or cut the speech short at any time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Console  ──►  ControlSurface                 │
//! └────────────────────────┬─────────────────────────────┘
//!            events ▲      │ start / stop / settings
//! ┌─────────────────┴──────▼─────────────────────────────┐
//! │        AssistantLoop (worker thread)                  │
//! │  Microphone → SpeechSource → CommandDispatcher        │
//! │           → Synthesizer → PlaybackController          │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod commands;
pub mod config;
pub mod console;
pub mod control;
pub mod error;
pub mod voice;

pub use assistant::{
    AssistantEvent, AssistantLoop, AssistantState, Collaborators, LoopSettings, event_channel,
};
pub use commands::{CommandDispatcher, Decision, OsAction, OsActions, Utterance};
pub use config::Config;
pub use control::{ControlListener, ControlSurface, CpalMicrophones, MicrophoneProvider};
pub use error::{Error, RecognitionFailure, Result, SynthesisError};
pub use voice::{PlaybackController, VoiceId, VoiceProfile};

//! Error types for voxloop

use thiserror::Error;

/// Result type alias for voxloop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the assistant core
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// No input device has been selected or it could not be opened
    #[error("microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    /// Speech recognition failed
    #[error(transparent)]
    Recognition(#[from] RecognitionFailure),

    /// Speech synthesis failed
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// Output device failed while streaming a session
    #[error("playback error: {0}")]
    Playback(String),

    /// Voice name outside the known set
    #[error("unknown voice: {0}")]
    UnknownVoice(String),

    /// The worker thread could not be spawned or joined
    #[error("worker error: {0}")]
    Worker(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Why a listen/recognize step produced no utterance
///
/// All variants are recoverable. `DeviceUnavailable` parks the loop until a
/// different microphone is selected, the rest count as an empty utterance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionFailure {
    /// Audio was captured but no speech could be made out
    #[error("no speech detected")]
    NoSpeechDetected,

    /// The recognition service failed
    #[error("recognition service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The input device is gone or cannot be opened
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),

    /// Nobody started speaking before the start timeout
    #[error("timed out waiting for a phrase")]
    PhraseTimeout,
}

/// Why a synthesis request failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    /// The synthesizer does not know this speaker
    #[error("unknown speaker: {0}")]
    UnknownSpeaker(String),

    /// The synthesis backend failed
    #[error("synthesis service error: {0}")]
    Service(String),
}

//! Voice processing module
//!
//! Microphone capture, speech recognition, synthesis and block-based playback.
//! The recognition and synthesis engines sit behind [`SpeechSource`] and
//! [`Synthesizer`] so the assistant loop can be driven without hardware.

mod capture;
mod playback;
mod profile;
mod stt;
mod tts;

pub use capture::{
    AudioSegment, CpalMicrophone, ListenLimits, Microphone, PhraseDetector, PhraseProgress,
    calculate_energy, samples_to_wav,
};
pub use playback::{
    AudioSink, BlockStatus, CpalSink, DEFAULT_BLOCK_SIZE, PlaybackController, PlaybackOutcome,
    PlaybackSession, SessionHandle,
};
pub use profile::{
    DEFAULT_SAMPLE_RATE, SUPPORTED_SAMPLE_RATES, VoiceId, VoiceProfile, apply_volume,
    validate_sample_rate,
};
pub use stt::{HttpSpeechSource, SpeechSource, SttProvider};
pub use tts::{HttpSynthesizer, Synthesizer, decode_mp3, resample};

//! Speech-to-text (STT) processing

use std::time::Duration;

use super::capture::AudioSegment;
use crate::error::RecognitionFailure;
use crate::{Error, Result};

/// Request timeout for transcription calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEEPGRAM_LISTEN_URL: &str = "https://api.deepgram.com/v1/listen";

/// Turns a captured phrase into text
pub trait SpeechSource: Send + Sync {
    /// Recognize `segment` spoken in `language` (BCP 47 tag, e.g. `ru-RU`)
    ///
    /// # Errors
    ///
    /// Returns a [`RecognitionFailure`] when nothing usable was recognized
    fn recognize(
        &self,
        segment: &AudioSegment,
        language: &str,
    ) -> std::result::Result<String, RecognitionFailure>;
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// STT provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SttProvider {
    Whisper,
    Deepgram,
}

impl std::str::FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Cloud speech recognition over HTTP
pub struct HttpSpeechSource {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    provider: SttProvider,
}

impl HttpSpeechSource {
    /// Create a new STT instance for `provider`
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or the client cannot be built
    pub fn new(provider: SttProvider, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!(
                "API key required for {provider:?} speech recognition"
            )));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            model,
            provider,
        })
    }

    /// Transcribe using OpenAI Whisper
    fn transcribe_whisper(
        &self,
        wav: Vec<u8>,
        language: &str,
    ) -> std::result::Result<String, RecognitionFailure> {
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::blocking::multipart::Form::new()
            .part(
                "file",
                reqwest::blocking::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(service_error)?,
            )
            .text("model", self.model.clone())
            .text("language", primary_language(language).to_string());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .map_err(service_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RecognitionFailure::ServiceUnavailable(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = response.json().map_err(service_error)?;
        Ok(result.text)
    }

    fn deepgram_request(&self, wav: Vec<u8>, language: &str) -> reqwest::blocking::RequestBuilder {
        self.client
            .post(DEEPGRAM_LISTEN_URL)
            .query(&[
                ("model", self.model.as_str()),
                ("language", primary_language(language)),
                ("punctuate", "true"),
            ])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(wav)
    }

    /// Transcribe using Deepgram
    fn transcribe_deepgram(
        &self,
        wav: Vec<u8>,
        language: &str,
    ) -> std::result::Result<String, RecognitionFailure> {
        tracing::debug!(audio_bytes = wav.len(), "starting Deepgram transcription");

        let response = self
            .deepgram_request(wav, language)
            .send()
            .map_err(service_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RecognitionFailure::ServiceUnavailable(format!(
                "Deepgram API error {status}: {body}"
            )));
        }

        let result: DeepgramResponse = response.json().map_err(service_error)?;

        Ok(result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default())
    }
}

impl SpeechSource for HttpSpeechSource {
    fn recognize(
        &self,
        segment: &AudioSegment,
        language: &str,
    ) -> std::result::Result<String, RecognitionFailure> {
        if segment.samples.is_empty() {
            return Err(RecognitionFailure::NoSpeechDetected);
        }

        let wav = segment
            .to_wav()
            .map_err(|e| RecognitionFailure::ServiceUnavailable(e.to_string()))?;

        let text = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(wav, language)?,
            SttProvider::Deepgram => self.transcribe_deepgram(wav, language)?,
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(RecognitionFailure::NoSpeechDetected);
        }

        tracing::info!(transcript = %text, "transcription complete");
        Ok(text.to_string())
    }
}

/// `ru-RU` -> `ru`
fn primary_language(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

#[allow(clippy::needless_pass_by_value)]
fn service_error(e: reqwest::Error) -> RecognitionFailure {
    tracing::error!(error = %e, "speech recognition request failed");
    RecognitionFailure::ServiceUnavailable(e.to_string())
}

//! Text-to-speech (TTS) processing

use std::io::Cursor;
use std::time::Duration;

use crate::error::SynthesisError;
use crate::{Error, Result};

/// Request timeout for synthesis calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns text into playable mono samples
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` with `speaker` at `sample_rate`
    ///
    /// # Errors
    ///
    /// `UnknownSpeaker` for a speaker the backend does not offer,
    /// `Service` for any backend failure
    fn synthesize(
        &self,
        text: &str,
        speaker: &str,
        sample_rate: u32,
    ) -> std::result::Result<Vec<f32>, SynthesisError>;
}

/// Synthesizes speech through an OpenAI-compatible `/audio/speech` endpoint
///
/// The endpoint returns MP3, which is decoded and resampled to the rate the
/// caller asked for.
pub struct HttpSynthesizer {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    speakers: Vec<String>,
}

impl HttpSynthesizer {
    /// Create a synthesizer offering `speakers`
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is empty or the client cannot be built
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: String,
        speakers: Vec<String>,
    ) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("TTS base URL required".to_string()));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.filter(|k| !k.is_empty()),
            model,
            speakers: speakers.into_iter().map(|s| s.to_lowercase()).collect(),
        })
    }

    /// Speakers this synthesizer accepts
    #[must_use]
    pub fn speakers(&self) -> &[String] {
        &self.speakers
    }

    fn request_mp3(
        &self,
        text: &str,
        speaker: &str,
    ) -> std::result::Result<Vec<u8>, SynthesisError> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: speaker,
            response_format: "mp3",
        };

        let mut builder = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .map_err(|e| SynthesisError::Service(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(SynthesisError::Service(format!("TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .map_err(|e| SynthesisError::Service(e.to_string()))?;
        Ok(audio.to_vec())
    }
}

impl Synthesizer for HttpSynthesizer {
    fn synthesize(
        &self,
        text: &str,
        speaker: &str,
        sample_rate: u32,
    ) -> std::result::Result<Vec<f32>, SynthesisError> {
        let speaker = speaker.to_lowercase();
        if !self.speakers.iter().any(|s| *s == speaker) {
            return Err(SynthesisError::UnknownSpeaker(speaker));
        }

        tracing::debug!(text, speaker = %speaker, sample_rate, "synthesizing");

        let mp3 = self.request_mp3(text, &speaker)?;
        let (samples, source_rate) =
            decode_mp3(&mp3).map_err(|e| SynthesisError::Service(e.to_string()))?;

        let samples = if source_rate == sample_rate {
            samples
        } else {
            resample(&samples, source_rate, sample_rate)
                .map_err(|e| SynthesisError::Service(e.to_string()))?
        };

        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        tracing::debug!(samples = samples.len(), peak, "speech synthesized");

        Ok(samples)
    }
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the stream is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0_u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(sample_rate);
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            // ID3 tags and padding between frames
            Err(minimp3::Error::SkippedData) => {}
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("MP3 stream contained no frames".to_string()));
    }

    Ok((samples, sample_rate))
}

/// Resample mono audio using rubato
///
/// # Errors
///
/// Returns error if the resampler rejects the rates
#[allow(clippy::cast_possible_truncation)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output =
        Vec::with_capacity(samples.len() * to_rate as usize / from_rate.max(1) as usize);

    for chunk in input.chunks(chunk_size) {
        let result = if chunk.len() == chunk_size {
            resampler.process(&[chunk], None)
        } else {
            resampler.process_partial(Some(&[chunk]), None)
        }
        .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output.iter().map(|&s| s as f32).collect())
}

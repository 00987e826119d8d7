//! Voice settings shared between the interactive layer and the worker

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Sample rates the synthesizer accepts
pub const SUPPORTED_SAMPLE_RATES: [u32; 3] = [8000, 24000, 48000];

/// Default synthesis sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Known speaker voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VoiceId {
    #[default]
    Xenia,
    Baya,
    Kseniya,
    Aidar,
    Eugene,
    /// Lets the synthesizer pick a speaker per request
    Random,
}

impl VoiceId {
    /// Every known voice, in presentation order
    pub const ALL: [Self; 6] = [
        Self::Xenia,
        Self::Baya,
        Self::Kseniya,
        Self::Aidar,
        Self::Eugene,
        Self::Random,
    ];

    /// Speaker identifier passed to the synthesizer
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Xenia => "xenia",
            Self::Baya => "baya",
            Self::Kseniya => "kseniya",
            Self::Aidar => "aidar",
            Self::Eugene => "eugene",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| Error::UnknownVoice(s.trim().to_string()))
    }
}

/// Current speaker, sample rate and volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceProfile {
    pub speaker: VoiceId,
    pub sample_rate: u32,
    /// Linear gain in `[0, 1]`
    pub volume: f32,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            speaker: VoiceId::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            volume: 0.5,
        }
    }
}

impl VoiceProfile {
    /// Set the volume, clamped into `[0, 1]`
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
    }

    /// Set the volume from a `0..=100` percentage
    pub fn set_volume_percent(&mut self, percent: u8) {
        self.set_volume(f32::from(percent.min(100)) / 100.0);
    }

    /// Volume as a `0..=100` percentage
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn volume_percent(&self) -> u8 {
        (self.volume * 100.0).round() as u8
    }
}

/// Check that a sample rate is one the synthesizer accepts
///
/// # Errors
///
/// Returns error for any rate outside [`SUPPORTED_SAMPLE_RATES`]
pub fn validate_sample_rate(rate: u32) -> crate::Result<u32> {
    if SUPPORTED_SAMPLE_RATES.contains(&rate) {
        Ok(rate)
    } else {
        Err(Error::Config(format!(
            "unsupported sample rate {rate}, expected one of {SUPPORTED_SAMPLE_RATES:?}"
        )))
    }
}

/// Scale samples by `volume`, clipping to the valid amplitude range
#[must_use]
pub fn apply_volume(samples: &[f32], volume: f32) -> Vec<f32> {
    let gain = volume.clamp(0.0, 1.0);
    samples
        .iter()
        .map(|s| (s * gain).clamp(-1.0, 1.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_parse_is_case_insensitive() {
        assert_eq!("Baya".parse::<VoiceId>().unwrap(), VoiceId::Baya);
        assert_eq!("  EUGENE ".parse::<VoiceId>().unwrap(), VoiceId::Eugene);
        assert!(matches!(
            "alloy".parse::<VoiceId>(),
            Err(Error::UnknownVoice(name)) if name == "alloy"
        ));
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut profile = VoiceProfile::default();
        profile.set_volume(1.7);
        assert!((profile.volume - 1.0).abs() < f32::EPSILON);
        profile.set_volume(-0.2);
        assert!(profile.volume.abs() < f32::EPSILON);
        profile.set_volume_percent(40);
        assert_eq!(profile.volume_percent(), 40);
    }

    #[test]
    fn test_apply_volume_scales_and_clips() {
        let scaled = apply_volume(&[0.5, -0.5, 1.0, 2.0, -3.0], 0.5);
        assert_eq!(scaled, vec![0.25, -0.25, 0.5, 1.0, -1.0]);

        let silent = apply_volume(&[0.3, -0.9, 0.1], 0.0);
        assert!(silent.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_sample_rate_validation() {
        assert_eq!(validate_sample_rate(24000).unwrap(), 24000);
        assert!(validate_sample_rate(44100).is_err());
    }
}

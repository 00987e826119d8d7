//! Configuration management for voxloop
//!
//! Values resolve env > TOML file > defaults. The binary's CLI flags are
//! applied on top by the caller.

pub mod file;

use std::str::FromStr;
use std::time::Duration;

use crate::commands::DEFAULT_BROWSER_URL;
use crate::voice::{
    DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, ListenLimits, SttProvider, VoiceId, VoiceProfile,
    validate_sample_rate,
};
use crate::{Error, Result};

use file::ConfigFile;

/// Default OpenAI-compatible speech endpoint (a local server)
pub const DEFAULT_TTS_URL: &str = "http://127.0.0.1:8000/v1";

/// voxloop configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub voice: VoiceConfig,
    pub listen: ListenConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub actions: ActionsConfig,
}

/// Speaker and playback settings
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub speaker: VoiceId,
    pub sample_rate: u32,
    /// Percentage, 0-100
    pub volume: u8,
    /// Frames per playback block
    pub block_size: usize,
}

impl VoiceConfig {
    /// Initial profile for the assistant loop
    #[must_use]
    pub fn profile(&self) -> VoiceProfile {
        let mut profile = VoiceProfile {
            speaker: self.speaker,
            sample_rate: self.sample_rate,
            ..VoiceProfile::default()
        };
        profile.set_volume_percent(self.volume);
        profile
    }
}

/// Microphone and capture timing
#[derive(Debug, Clone)]
pub struct ListenConfig {
    /// Input device index, `None` until selected
    pub microphone: Option<usize>,
    pub language: String,
    pub limits: ListenLimits,
}

/// Speech recognition backend
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub provider: SttProvider,
    pub model: String,
    pub api_key: Option<String>,
}

/// Speech synthesis backend
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub voices: Vec<String>,
}

/// Desktop actions
#[derive(Debug, Clone)]
pub struct ActionsConfig {
    pub browser_url: String,
    pub editor: Option<String>,
    pub dry_run: bool,
}

impl Config {
    /// Load configuration from the standard file and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with environment values looked up through `env`
    ///
    /// # Errors
    ///
    /// Returns error for an unknown speaker or STT provider, an unsupported
    /// sample rate, a volume above 100 or a zero block size
    pub fn resolve(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let speaker = fc
            .voice
            .speaker
            .as_deref()
            .map(VoiceId::from_str)
            .transpose()?
            .unwrap_or_default();

        let sample_rate =
            validate_sample_rate(fc.voice.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE))?;

        let volume = fc.voice.volume.unwrap_or(50);
        if volume > 100 {
            return Err(Error::Config(format!("volume must be 0-100, got {volume}")));
        }

        let block_size = fc.voice.block_size.unwrap_or(DEFAULT_BLOCK_SIZE);
        if block_size == 0 {
            return Err(Error::Config("block_size must be positive".to_string()));
        }

        let voice = VoiceConfig {
            speaker,
            sample_rate,
            volume,
            block_size,
        };

        let defaults = ListenLimits::default();
        let listen = ListenConfig {
            microphone: fc.listen.microphone,
            language: env("VOXLOOP_LANGUAGE")
                .or(fc.listen.language)
                .unwrap_or_else(|| "ru-RU".to_string()),
            limits: ListenLimits {
                calibration: fc
                    .listen
                    .calibration_ms
                    .map_or(defaults.calibration, Duration::from_millis),
                start_timeout: fc
                    .listen
                    .start_timeout_secs
                    .map_or(defaults.start_timeout, Duration::from_secs),
                phrase_limit: fc
                    .listen
                    .phrase_limit_secs
                    .map_or(defaults.phrase_limit, Duration::from_secs),
                pause: fc.listen.pause_ms.map_or(defaults.pause, Duration::from_millis),
            },
        };

        let provider = fc
            .stt
            .provider
            .as_deref()
            .map(SttProvider::from_str)
            .transpose()?
            .unwrap_or(SttProvider::Whisper);
        let provider_key = match provider {
            SttProvider::Whisper => env("OPENAI_API_KEY"),
            SttProvider::Deepgram => env("DEEPGRAM_API_KEY"),
        };
        let default_model = match provider {
            SttProvider::Whisper => "whisper-1",
            SttProvider::Deepgram => "nova-2",
        };
        let stt = SttConfig {
            provider,
            model: env("VOXLOOP_STT_MODEL")
                .or(fc.stt.model)
                .unwrap_or_else(|| default_model.to_string()),
            api_key: provider_key.or(fc.stt.api_key),
        };

        let tts = TtsConfig {
            base_url: env("VOXLOOP_TTS_URL")
                .or(fc.tts.base_url)
                .unwrap_or_else(|| DEFAULT_TTS_URL.to_string()),
            model: fc.tts.model.unwrap_or_else(|| "tts-1".to_string()),
            api_key: env("VOXLOOP_TTS_API_KEY").or(fc.tts.api_key),
            voices: fc.tts.voices.unwrap_or_else(|| {
                VoiceId::ALL.iter().map(|v| v.as_str().to_string()).collect()
            }),
        };

        let actions = ActionsConfig {
            browser_url: fc
                .actions
                .browser_url
                .unwrap_or_else(|| DEFAULT_BROWSER_URL.to_string()),
            editor: fc.actions.editor,
            dry_run: fc.actions.dry_run.unwrap_or(false),
        };

        Ok(Self {
            voice,
            listen,
            stt,
            tts,
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(toml_text: &str) -> ConfigFile {
        toml::from_str(toml_text).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(ConfigFile::default(), no_env).unwrap();
        assert_eq!(config.voice.speaker, VoiceId::Xenia);
        assert_eq!(config.voice.sample_rate, 48000);
        assert_eq!(config.voice.volume, 50);
        assert_eq!(config.voice.block_size, 1024);
        assert_eq!(config.listen.microphone, None);
        assert_eq!(config.listen.language, "ru-RU");
        assert_eq!(config.listen.limits, ListenLimits::default());
        assert_eq!(config.stt.provider, SttProvider::Whisper);
        assert_eq!(config.stt.model, "whisper-1");
        assert_eq!(config.tts.base_url, DEFAULT_TTS_URL);
        assert_eq!(config.tts.voices.len(), VoiceId::ALL.len());
        assert_eq!(config.actions.browser_url, DEFAULT_BROWSER_URL);
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = parse(
            r#"
[listen]
language = "en-US"

[stt]
provider = "deepgram"
api_key = "from-file"

[tts]
base_url = "http://file.example/v1"
"#,
        );
        let env: HashMap<&str, &str> = [
            ("VOXLOOP_LANGUAGE", "ru-RU"),
            ("DEEPGRAM_API_KEY", "from-env"),
            ("VOXLOOP_TTS_URL", "http://env.example/v1"),
        ]
        .into_iter()
        .collect();

        let config =
            Config::resolve(fc, |key| env.get(key).map(ToString::to_string)).unwrap();
        assert_eq!(config.listen.language, "ru-RU");
        assert_eq!(config.stt.provider, SttProvider::Deepgram);
        assert_eq!(config.stt.model, "nova-2");
        assert_eq!(config.stt.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.tts.base_url, "http://env.example/v1");
    }

    #[test]
    fn test_file_values_apply() {
        let fc = parse(
            r#"
[voice]
speaker = "Aidar"
sample_rate = 24000
volume = 30

[listen]
start_timeout_secs = 3
calibration_ms = 250
"#,
        );
        let config = Config::resolve(fc, no_env).unwrap();
        assert_eq!(config.voice.speaker, VoiceId::Aidar);
        assert_eq!(config.voice.sample_rate, 24000);
        assert_eq!(config.listen.limits.start_timeout, Duration::from_secs(3));
        assert_eq!(config.listen.limits.calibration, Duration::from_millis(250));

        let profile = config.voice.profile();
        assert_eq!(profile.volume_percent(), 30);
        assert_eq!(profile.speaker, VoiceId::Aidar);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for text in [
            "[voice]\nspeaker = \"nobody\"",
            "[voice]\nsample_rate = 44100",
            "[voice]\nvolume = 150",
            "[voice]\nblock_size = 0",
            "[stt]\nprovider = \"carrier-pigeon\"",
        ] {
            assert!(Config::resolve(parse(text), no_env).is_err(), "{text}");
        }
    }
}

//! TOML configuration file loading
//!
//! Supports `~/.config/voxloop/config.toml` as a persistent config source.
//! All fields are optional: the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub voice: VoiceFileConfig,

    #[serde(default)]
    pub listen: ListenFileConfig,

    #[serde(default)]
    pub stt: SttFileConfig,

    #[serde(default)]
    pub tts: TtsFileConfig,

    #[serde(default)]
    pub actions: ActionsFileConfig,
}

/// Speaker and playback settings
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Voice name (e.g. "xenia")
    pub speaker: Option<String>,

    /// Output sample rate, one of 8000, 24000, 48000
    pub sample_rate: Option<u32>,

    /// Volume percentage, 0-100
    pub volume: Option<u8>,

    /// Frames per playback block
    pub block_size: Option<usize>,
}

/// Microphone and capture timing
#[derive(Debug, Default, Deserialize)]
pub struct ListenFileConfig {
    /// Input device index
    pub microphone: Option<usize>,

    /// Recognition language (e.g. "ru-RU")
    pub language: Option<String>,

    pub start_timeout_secs: Option<u64>,
    pub phrase_limit_secs: Option<u64>,
    pub calibration_ms: Option<u64>,
    pub pause_ms: Option<u64>,
}

/// Speech recognition backend
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// "whisper" or "deepgram"
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

/// Speech synthesis backend
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Base URL of an OpenAI-compatible speech endpoint
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Speakers the endpoint accepts
    pub voices: Option<Vec<String>>,
}

/// Desktop actions
#[derive(Debug, Default, Deserialize)]
pub struct ActionsFileConfig {
    pub browser_url: Option<String>,
    pub editor: Option<String>,
    /// Log actions instead of launching programs
    pub dry_run: Option<bool>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_config_from(&path))
}

/// Load a config file from `path`, falling back to defaults on any failure
pub fn load_config_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voxloop/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voxloop").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_parses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[voice]
speaker = "baya"
volume = 70

[listen]
microphone = 2
"#
        )
        .unwrap();

        let config = load_config_from(file.path());
        assert_eq!(config.voice.speaker.as_deref(), Some("baya"));
        assert_eq!(config.voice.volume, Some(70));
        assert_eq!(config.voice.sample_rate, None);
        assert_eq!(config.listen.microphone, Some(2));
        assert!(config.tts.voices.is_none());
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[voice\nspeaker = ").unwrap();

        let config = load_config_from(file.path());
        assert!(config.voice.speaker.is_none());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml"));
        assert!(config.stt.provider.is_none());
    }
}

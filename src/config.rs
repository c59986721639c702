//! Configuration for live voice sessions
//!
//! Precedence is environment > TOML file > built-in default. The file lives
//! at `~/.config/lumina/config.toml` and every field in it is optional — it
//! is a partial overlay on top of defaults. The API key is only ever read
//! from the environment or the file, never from the command line.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::Result;

/// Default live endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default conversation model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// Default prebuilt voice for model speech
pub const DEFAULT_VOICE: &str = "Zephyr";

/// Live session configuration
#[derive(Debug)]
pub struct LiveConfig {
    /// WebSocket endpoint of the live API
    pub endpoint: String,

    /// Conversation model identifier
    pub model: String,

    /// Prebuilt voice name for model speech
    pub voice: String,

    /// Request transcription of user speech
    pub input_transcription: bool,

    /// Request transcription of model speech
    pub output_transcription: bool,

    /// API key, required to connect
    pub api_key: Option<SecretString>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            input_transcription: true,
            output_transcription: true,
            api_key: None,
        }
    }
}

/// TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
struct LiveConfigFile {
    endpoint: Option<String>,
    model: Option<String>,
    voice: Option<String>,
    input_transcription: Option<bool>,
    output_transcription: Option<bool>,
    api_key: Option<String>,
}

impl LiveConfig {
    /// Loads configuration from the standard path, or from `path_override`
    /// when given. The API key is taken from `LUMINA_API_KEY` (falling back
    /// to `GEMINI_API_KEY`), then the file.
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly-passed config file cannot be read or
    /// parsed. The standard path falls back to defaults instead.
    pub fn load(path_override: Option<&Path>) -> Result<Self> {
        let file = match path_override {
            Some(path) => read_config_file(path)?,
            None => load_default_config_file(),
        };

        let mut config = Self::from_overlay(file);
        if let Ok(key) =
            std::env::var("LUMINA_API_KEY").or_else(|_| std::env::var("GEMINI_API_KEY"))
        {
            config.api_key = Some(SecretString::from(key));
        }
        Ok(config)
    }

    /// Applies a file overlay on top of defaults
    fn from_overlay(file: LiveConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            endpoint: file.endpoint.unwrap_or(defaults.endpoint),
            model: file.model.unwrap_or(defaults.model),
            voice: file.voice.unwrap_or(defaults.voice),
            input_transcription: file
                .input_transcription
                .unwrap_or(defaults.input_transcription),
            output_transcription: file
                .output_transcription
                .unwrap_or(defaults.output_transcription),
            api_key: file.api_key.map(SecretString::from),
        }
    }
}

/// Reads and parses a config file, erroring on any failure
fn read_config_file(path: &Path) -> Result<LiveConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Loads the config file from the standard path.
///
/// Returns `LiveConfigFile::default()` if the file doesn't exist or can't be
/// parsed.
fn load_default_config_file() -> LiveConfigFile {
    let Some(path) = config_file_path() else {
        return LiveConfigFile::default();
    };

    if !path.exists() {
        return LiveConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
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
                LiveConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            LiveConfigFile::default()
        }
    }
}

/// Returns the standard config file path: `~/.config/lumina/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("lumina").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret as _;

    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = LiveConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.voice, DEFAULT_VOICE);
        assert!(config.input_transcription);
        assert!(config.output_transcription);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn empty_overlay_keeps_defaults() {
        let file: LiveConfigFile = toml::from_str("").unwrap();
        let config = LiveConfig::from_overlay(file);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.voice, DEFAULT_VOICE);
    }

    #[test]
    fn partial_overlay_overrides_only_named_fields() {
        let file: LiveConfigFile = toml::from_str(
            r#"
            voice = "Puck"
            output_transcription = false
            api_key = "file-key"
            "#,
        )
        .unwrap();
        let config = LiveConfig::from_overlay(file);

        assert_eq!(config.voice, "Puck");
        assert!(!config.output_transcription);
        assert!(config.input_transcription);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_key.unwrap().expose_secret(), "file-key");
    }

    #[test]
    fn secret_key_is_redacted_in_debug_output() {
        let file: LiveConfigFile = toml::from_str(r#"api_key = "super-secret""#).unwrap();
        let config = LiveConfig::from_overlay(file);
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn explicit_bad_path_is_an_error() {
        assert!(read_config_file(Path::new("/nonexistent/lumina.toml")).is_err());
    }
}

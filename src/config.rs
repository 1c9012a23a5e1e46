use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_PATH_VAR: &str = "REELSMITH_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "reelsmith.toml";

/// Application configuration.
///
/// Layered from built-in defaults, an optional TOML file and the environment.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: String,
    pub api_url: String,
    pub script_model: String,
    pub image_model: String,
    pub tts_model: String,
    /// Prebuilt TTS voice name.
    pub voice: String,
    /// Language the narration script is written in.
    pub script_language: String,
    /// Sample rate assumed for raw PCM audio when the response does not carry one.
    pub sample_rate: u32,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            script_model: "gemini-2.5-flash".to_string(),
            image_model: "imagen-4.0-generate-001".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            voice: "Kore".to_string(),
            script_language: "Uzbek".to_string(),
            sample_rate: 24_000,
            request_timeout_secs: 120,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `REELSMITH_CONFIG` (or `reelsmith.toml`) and the environment.
    ///
    /// `REELSMITH_*` variables override file values; `GEMINI_API_KEY` or `API_KEY`
    /// supply the credential.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("REELSMITH_"))
            .merge(Env::raw().only(&["API_KEY"]))
            .merge(Env::raw().only(&["GEMINI_API_KEY"]).map(|_| "api_key".into()));

        Self::from_figment(figment)
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let mut config: Config = figment.extract()?;
        config.api_key = config.api_key.trim().to_string();
        if config.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if config.sample_rate == 0 {
            return Err(ConfigError::NotPositive("sample_rate"));
        }
        if config.request_timeout_secs == 0 {
            return Err(ConfigError::NotPositive("request_timeout_secs"));
        }
        Ok(config)
    }
}

use thiserror::Error;

/// The audio payload could not be turned into samples.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("audio payload is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("audio payload is empty")]
    Empty,
    #[error("audio payload has an odd byte length ({0}); expected 16-bit samples")]
    OddLength(usize),
    #[error("audio container could not be decoded: {0}")]
    Container(String),
}

/// The content service returned nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("service returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("response is missing `{0}`")]
    MissingField(&'static str),
    #[error("no image was generated")]
    NoImage,
    #[error("no audio data in the response")]
    NoAudio,
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        GenerationError::Http(e.to_string())
    }
}

/// The audio output pipeline could not be created, resumed or driven.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("no audio output device found")]
    NoDevice,
    #[error("failed to get output config: {0}")]
    Config(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("failed to resume audio output: {0}")]
    Resume(String),
    #[error("audio output is closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayError {
    #[error("audio is not ready")]
    NotReady,
    #[error(transparent)]
    Device(#[from] DeviceError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Figment(#[from] Box<figment::Error>),
    #[error("no API key configured; set GEMINI_API_KEY or API_KEY")]
    MissingApiKey,
    #[error("`{0}` must be greater than zero")]
    NotPositive(&'static str),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Figment(Box::new(e))
    }
}

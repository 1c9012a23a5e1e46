use std::sync::Arc;

use crate::error::DeviceError;

/// Decoded mono audio stored entirely in memory.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioData {
    /// Samples normalized to [-1.0, 1.0].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Duration in seconds.
    pub duration: f64,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / sample_rate as f64
        };
        Self {
            samples,
            sample_rate,
            duration,
        }
    }

    pub fn num_frames(&self) -> usize {
        self.samples.len()
    }
}

/// Base64 audio as delivered by the content service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedAudio {
    pub data: String,
    /// e.g. `audio/L16;codec=pcm;rate=24000`
    pub mime_type: Option<String>,
}

impl EncodedAudio {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Sample rate announced by the MIME type's `rate=` parameter, if any.
    pub fn declared_sample_rate(&self) -> Option<u32> {
        self.mime_type
            .as_deref()?
            .split(';')
            .filter_map(|param| param.trim().split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
            .and_then(|(_, value)| value.trim().parse().ok())
            .filter(|rate| *rate > 0)
    }
}

/// Identifies one play action. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

/// Commands sent from the controller to the audio callback.
#[derive(Debug, Clone)]
pub enum OutputCommand {
    Start(SessionId, Arc<AudioData>),
    Stop(SessionId),
    SetGain(f32),
}

/// Events sent from the audio callback back to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// The session's buffer played to the end. Not sent for manual stops.
    SessionEnded(SessionId),
    StreamError(String),
}

/// Current playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Uninitialized,
    Ready,
    Playing(SessionId),
}

/// What draining the output events turned up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    /// The current session played to its end.
    Finished,
    /// The output stream failed; the pipeline has been released.
    Failed(DeviceError),
}

//! Scripted content service for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::orchestrator::Stage;
use super::service::{ContentService, ScriptDraft};
use crate::audio::types::EncodedAudio;
use crate::error::GenerationError;

/// Returns fixed artifacts and counts calls per stage; can fail at one stage.
#[derive(Default)]
pub struct ScriptedService {
    fail_at: Option<Stage>,
    calls: [AtomicUsize; 3],
    received: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub const SCRIPT: &'static str = "Sunlight scatters off air molecules, and blue scatters most.";
    pub const IMAGE_PROMPT: &'static str = "A cinematic wide shot of a deep blue afternoon sky";
    pub const IMAGE_B64: &'static str = "/9j/4AAQSkZJRg==";
    pub const AUDIO_B64: &'static str = "AAABAAIAAwA=";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(stage: Stage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::default()
        }
    }

    pub fn calls(&self, stage: Stage) -> usize {
        let idx = Stage::ALL.iter().position(|s| *s == stage).unwrap_or(0);
        self.calls[idx].load(Ordering::SeqCst)
    }

    /// Inputs received, in call order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    fn record(&self, stage: Stage, input: &str) -> Result<(), GenerationError> {
        let idx = Stage::ALL.iter().position(|s| *s == stage).unwrap_or(0);
        self.calls[idx].fetch_add(1, Ordering::SeqCst);
        self.received.lock().unwrap().push(input.to_string());
        match self.fail_at {
            Some(s) if s == stage => Err(match stage {
                Stage::Script => GenerationError::MissingField("imagePrompt"),
                Stage::Image => GenerationError::NoImage,
                Stage::Audio => GenerationError::NoAudio,
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ContentService for ScriptedService {
    async fn generate_script_and_image_prompt(
        &self,
        topic: &str,
    ) -> Result<ScriptDraft, GenerationError> {
        self.record(Stage::Script, topic)?;
        Ok(ScriptDraft {
            script: Self::SCRIPT.to_string(),
            image_prompt: Self::IMAGE_PROMPT.to_string(),
        })
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, GenerationError> {
        self.record(Stage::Image, prompt)?;
        Ok(Self::IMAGE_B64.to_string())
    }

    async fn generate_audio(&self, script: &str) -> Result<EncodedAudio, GenerationError> {
        self.record(Stage::Audio, script)?;
        Ok(EncodedAudio::new(Self::AUDIO_B64))
    }
}

use async_trait::async_trait;

use crate::audio::types::EncodedAudio;
use crate::error::GenerationError;

/// Narration script plus the prompt used to illustrate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDraft {
    pub script: String,
    pub image_prompt: String,
}

/// Remote backend that produces the pieces of a reel.
#[async_trait]
pub trait ContentService: Send + Sync {
    async fn generate_script_and_image_prompt(
        &self,
        topic: &str,
    ) -> Result<ScriptDraft, GenerationError>;

    /// Returns base64 JPEG bytes.
    async fn generate_image(&self, prompt: &str) -> Result<String, GenerationError>;

    async fn generate_audio(&self, script: &str) -> Result<EncodedAudio, GenerationError>;
}

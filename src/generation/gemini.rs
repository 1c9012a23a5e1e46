use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::service::{ContentService, ScriptDraft};
use crate::audio::types::EncodedAudio;
use crate::config::Config;
use crate::error::GenerationError;

/// Content service backed by the Gemini and Imagen REST endpoints.
#[derive(Debug)]
pub struct GeminiClient {
    api_key: String,
    api_url: String,
    script_model: String,
    image_model: String,
    tts_model: String,
    voice: String,
    script_language: String,
    client: HttpClient,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, GenerationError> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            api_key: config.api_key.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            script_model: config.script_model.clone(),
            image_model: config.image_model.clone(),
            tts_model: config.tts_model.clone(),
            voice: config.voice.clone(),
            script_language: config.script_language.clone(),
            client,
        })
    }

    async fn post(
        &self,
        model: &str,
        method: &str,
        body: &Value,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/models/{}:{}", self.api_url, model, method);
        debug!(%url, "sending request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(model, status = status.as_u16(), "request rejected");
            return Err(api_error(status.as_u16(), &text));
        }
        debug!(model, bytes = text.len(), "response received");
        Ok(text)
    }

    fn script_instruction(&self) -> String {
        format!(
            "You are a creative assistant producing content for short, one-minute \
             vertical video reels. Reply with a JSON object with two fields:\n\
             1. \"script\": an engaging, concise narration of 100-150 words written in {}. \
             It must read naturally when spoken aloud.\n\
             2. \"imagePrompt\": a detailed, high-quality, photorealistic or cinematic \
             description in English that visually captures the script, for an image \
             generation model.",
            self.script_language
        )
    }
}

#[async_trait]
impl ContentService for GeminiClient {
    async fn generate_script_and_image_prompt(
        &self,
        topic: &str,
    ) -> Result<ScriptDraft, GenerationError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": self.script_instruction() }] },
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("Create content for the topic: {topic}") }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "script": { "type": "STRING" },
                        "imagePrompt": { "type": "STRING" }
                    },
                    "required": ["script", "imagePrompt"]
                }
            }
        });
        let text = self.post(&self.script_model, "generateContent", &body).await?;
        parse_script_response(&text)
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": {
                "sampleCount": 1,
                "outputMimeType": "image/jpeg",
                "aspectRatio": "9:16"
            }
        });
        let text = self.post(&self.image_model, "predict", &body).await?;
        parse_image_response(&text)
    }

    async fn generate_audio(&self, script: &str) -> Result<EncodedAudio, GenerationError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": script }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.voice }
                    }
                }
            }
        });
        let text = self.post(&self.tts_model, "generateContent", &body).await?;
        parse_audio_response(&text)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawDraft {
    script: Option<String>,
    #[serde(rename = "imagePrompt")]
    image_prompt: Option<String>,
}

fn parse_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, GenerationError> {
    serde_json::from_str(text).map_err(|e| GenerationError::Malformed(e.to_string()))
}

fn first_parts(response: GenerateContentResponse) -> Vec<Part> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default()
}

/// Strip a Markdown code fence the model sometimes wraps JSON in.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

pub(crate) fn parse_script_response(body: &str) -> Result<ScriptDraft, GenerationError> {
    let response: GenerateContentResponse = parse_json(body)?;
    let text: String = first_parts(response)
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    if text.trim().is_empty() {
        return Err(GenerationError::MissingField("text"));
    }

    let raw: RawDraft = parse_json(strip_fence(&text))?;
    let script = raw
        .script
        .filter(|s| !s.trim().is_empty())
        .ok_or(GenerationError::MissingField("script"))?;
    let image_prompt = raw
        .image_prompt
        .filter(|s| !s.trim().is_empty())
        .ok_or(GenerationError::MissingField("imagePrompt"))?;

    Ok(ScriptDraft {
        script,
        image_prompt,
    })
}

pub(crate) fn parse_image_response(body: &str) -> Result<String, GenerationError> {
    let response: PredictResponse = parse_json(body)?;
    response
        .predictions
        .into_iter()
        .find_map(|p| p.bytes_base64_encoded.filter(|b| !b.is_empty()))
        .ok_or(GenerationError::NoImage)
}

pub(crate) fn parse_audio_response(body: &str) -> Result<EncodedAudio, GenerationError> {
    let response: GenerateContentResponse = parse_json(body)?;
    first_parts(response)
        .into_iter()
        .filter_map(|p| p.inline_data)
        .find_map(|inline| {
            let data = inline.data.filter(|d| !d.is_empty())?;
            let audio = EncodedAudio::new(data);
            Some(match inline.mime_type {
                Some(mime) => audio.with_mime_type(mime),
                None => audio,
            })
        })
        .ok_or(GenerationError::NoAudio)
}

pub(crate) fn api_error(status: u16, body: &str) -> GenerationError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().chars().take(200).collect());
    GenerationError::Api { status, message }
}

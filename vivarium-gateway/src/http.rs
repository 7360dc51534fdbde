//! HTTP-backed gateway provider.
//!
//! Talks to a Generative-Language-style REST surface: JSON
//! `generateContent` calls per model, camelCase response payloads, base64
//! inline data for audio and image bytes. The engine only ever sees the
//! [`AiGateway`] trait; this provider is one implementation among the mocks.

use crate::{AgentIdentity, AiGateway, DialogueReply, MergedPersona};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;
use vivarium_core::{GatewayError, Message, MessageRole, SourceRef, VivariumResult};

const PROVIDER: &str = "generative-language";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_DIALOGUE_MODEL: &str = "gemini-3-flash-preview";
const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_VOICE: &str = "Kore";

/// Gateway provider backed by a remote generative-language REST API.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    dialogue_model: String,
    speech_model: String,
    image_model: String,
    voice: String,
}

impl HttpGateway {
    /// Create a provider with stock endpoint and model ids.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            dialogue_model: DEFAULT_DIALOGUE_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
        }
    }

    /// Override the endpoint base URL (no trailing slash).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the dialogue model id.
    pub fn with_dialogue_model(mut self, model: impl Into<String>) -> Self {
        self.dialogue_model = model.into();
        self
    }

    /// Override the speech synthesis voice.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// POST a generateContent request and return the parsed JSON body.
    async fn generate_content(&self, model: &str, body: Value) -> VivariumResult<Value> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        debug!(model, "dispatching generateContent request");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<i64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(GatewayError::RateLimited {
                provider: PROVIDER.to_string(),
                retry_after_ms,
            }
            .into());
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: status.as_u16() as i32,
                message,
            }
            .into());
        }

        response.json::<Value>().await.map_err(|e| {
            GatewayError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl AiGateway for HttpGateway {
    async fn generate_dialogue(
        &self,
        identity: &AgentIdentity,
        prompt: &str,
        history: &[Message],
        grounding: &str,
    ) -> VivariumResult<DialogueReply> {
        let system_instruction = format!(
            "You are {}, an emotional intelligence agent identified by the emoji {}. \
             Current Memory: {}. \
             Be concise, helpful, and maintain your persona. Use your specific emoji often.",
            identity.name, identity.emoji, grounding
        );

        let mut contents = history.iter().map(wire_turn).collect::<Vec<_>>();
        contents.push(json!({ "role": "user", "parts": [{ "text": prompt }] }));

        let body = json!({
            "system_instruction": { "parts": [{ "text": system_instruction }] },
            "contents": contents,
            "tools": [{ "google_search": {} }],
        });

        let value = self.generate_content(&self.dialogue_model, body).await?;
        Ok(parse_dialogue(&value))
    }

    async fn synthesize_speech(&self, text: &str) -> VivariumResult<Option<Vec<u8>>> {
        let body = json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generation_config": {
                "response_modalities": ["AUDIO"],
                "speech_config": {
                    "voice_config": {
                        "prebuilt_voice_config": { "voice_name": self.voice }
                    }
                }
            }
        });

        let value = self.generate_content(&self.speech_model, body).await?;
        Ok(parse_inline_data(&value))
    }

    async fn evolve_disposition(
        &self,
        current: &str,
        target_level: i32,
    ) -> VivariumResult<String> {
        let prompt = format!(
            "The agent is leveling up to level {}. Their current trait is \"{}\". \
             Suggest a more advanced, cooler version of this trait (one or two words \
             maximum). Return only the new trait name.",
            target_level, current
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generation_config": { "thinking_config": { "thinking_budget": 0 } },
        });

        let value = self.generate_content(&self.dialogue_model, body).await?;
        Ok(collect_text(&value).trim().to_string())
    }

    async fn merge_personas(
        &self,
        a: &AgentIdentity,
        b: &AgentIdentity,
    ) -> VivariumResult<MergedPersona> {
        let prompt = format!(
            "Suggest a new combined emoji and name for merging {} {} and {} {}. Return JSON.",
            a.emoji, a.name, b.emoji, b.name
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generation_config": {
                "response_mime_type": "application/json",
                "response_schema": {
                    "type": "OBJECT",
                    "properties": {
                        "emoji": { "type": "STRING" },
                        "name": { "type": "STRING" },
                        "trait": { "type": "STRING" }
                    },
                    "required": ["emoji", "name", "trait"]
                }
            }
        });

        let value = self.generate_content(&self.dialogue_model, body).await?;
        parse_merged(&value)
    }

    async fn edit_image(
        &self,
        image: &[u8],
        instruction: &str,
    ) -> VivariumResult<Option<Vec<u8>>> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "inline_data": { "mime_type": "image/png", "data": BASE64.encode(image) } },
                    { "text": instruction }
                ]
            }]
        });

        let value = self.generate_content(&self.image_model, body).await?;
        Ok(parse_inline_data(&value))
    }
}

fn transport_error(e: &reqwest::Error) -> vivarium_core::VivariumError {
    GatewayError::RequestFailed {
        provider: PROVIDER.to_string(),
        status: e.status().map(|s| s.as_u16() as i32).unwrap_or(0),
        message: e.to_string(),
    }
    .into()
}

/// Encode a history message as a wire turn. Agent replies use the "model" role.
fn wire_turn(message: &Message) -> Value {
    let role = match message.role {
        MessageRole::User => "user",
        MessageRole::Agent => "model",
    };
    json!({ "role": role, "parts": [{ "text": message.content }] })
}

/// Concatenate the text parts of the first candidate.
fn collect_text(value: &Value) -> String {
    value["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

/// Extract reply text and grounding citations from a dialogue response.
fn parse_dialogue(value: &Value) -> DialogueReply {
    let sources = value["candidates"][0]["groundingMetadata"]["groundingChunks"]
        .as_array()
        .map(|chunks| {
            chunks
                .iter()
                .map(|chunk| SourceRef {
                    title: chunk["web"]["title"].as_str().unwrap_or("Source").to_string(),
                    uri: chunk["web"]["uri"].as_str().unwrap_or("").to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    DialogueReply {
        text: collect_text(value),
        sources,
    }
}

/// Decode the first base64 inline-data part of the first candidate.
fn parse_inline_data(value: &Value) -> Option<Vec<u8>> {
    let parts = value["candidates"][0]["content"]["parts"].as_array()?;
    parts
        .iter()
        .find_map(|p| p["inlineData"]["data"].as_str())
        .and_then(|data| BASE64.decode(data).ok())
}

/// Parse the JSON persona the model was asked to return for a merge.
fn parse_merged(value: &Value) -> VivariumResult<MergedPersona> {
    let text = collect_text(value);
    serde_json::from_str(&text).map_err(|e| {
        GatewayError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: format!("merge persona is not valid JSON: {}", e),
        }
        .into()
    })
}

// ============================================================================
// UNIT TESTS
// ============================================================================

//! Google Gemini adapter: text via `generateContent`, speech via the TTS
//! models' inline PCM audio.

use crate::audio::item::AudioItem;
use crate::config::ProviderConfig;
use crate::defaults;
use crate::prompt::Prompt;
use crate::provider::error::{ProviderError, ProviderErrorKind};
use crate::provider::text::TextGenerator;
use crate::provider::voice::SpeechSynthesizer;
use base64::Engine;
use serde_json::{Value, json};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";

pub struct GeminiProvider {
    id: String,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    text_model: String,
    speech_model: String,
    default_voice: String,
}

impl GeminiProvider {
    pub fn new(id: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            id: id.into(),
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            default_voice: defaults::DEFAULT_VOICE.to_string(),
        }
    }

    pub fn from_config(id: &str, config: &ProviderConfig) -> Self {
        let mut provider = Self::new(id, config.api_key());
        if let Some(url) = &config.base_url {
            provider = provider.with_base_url(url);
        }
        if let Some(model) = &config.text_model {
            provider.text_model = model.clone();
        }
        if let Some(model) = &config.speech_model {
            provider.speech_model = model.clone();
        }
        if let Some(voice) = &config.default_voice {
            provider.default_voice = voice.clone();
        }
        provider
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_text_model(mut self, model: impl Into<String>) -> Self {
        self.text_model = model.into();
        self
    }

    pub fn with_speech_model(mut self, model: impl Into<String>) -> Self {
        self.speech_model = model.into();
        self
    }

    async fn generate_content(&self, model: &str, body: &Value) -> Result<Value, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::missing_credential(&self.id))?;
        let url = format!("{}/v1beta/models/{model}:generateContent", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| ProviderError::from_request(&self.id, &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::from_request(&self.id, &e))?;
        if !status.is_success() {
            return Err(ProviderError::from_http(&self.id, status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| {
            ProviderError::new(
                ProviderErrorKind::Other,
                &self.id,
                format!("invalid response JSON: {e}"),
            )
        })
    }
}

fn parts(response: &Value) -> impl Iterator<Item = &Value> {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Concatenated text parts of the first candidate.
pub fn extract_text(response: &Value) -> Option<String> {
    let text: String = parts(response)
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// First inline audio part as `(base64 data, mime type)`.
pub fn extract_inline_audio(response: &Value) -> Option<(&str, &str)> {
    parts(response).find_map(|p| {
        let inline = p.get("inlineData")?;
        let data = inline.get("data")?.as_str()?;
        let mime = inline.get("mimeType").and_then(Value::as_str).unwrap_or("");
        Some((data, mime))
    })
}

/// Sample rate from a mime type such as `audio/L16;codec=pcm;rate=24000`.
pub fn sample_rate_from_mime(mime: &str) -> u32 {
    mime.split(';')
        .filter_map(|p| p.trim().strip_prefix("rate="))
        .find_map(|r| r.parse().ok())
        .unwrap_or(defaults::PCM_SAMPLE_RATE)
}

#[async_trait::async_trait]
impl TextGenerator for GeminiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": prompt.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
        });
        let response = self.generate_content(&self.text_model, &body).await?;
        extract_text(&response).ok_or_else(|| ProviderError::empty_result(&self.id))
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for GeminiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn resolve_voice(&self, requested: &str) -> String {
        defaults::GEMINI_VOICES
            .iter()
            .find(|v| v.eq_ignore_ascii_case(requested))
            .map(|v| v.to_string())
            .unwrap_or_else(|| self.default_voice.clone())
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<AudioItem, ProviderError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
                }
            }
        });
        let response = self.generate_content(&self.speech_model, &body).await?;
        let (data, mime) =
            extract_inline_audio(&response).ok_or_else(|| ProviderError::empty_result(&self.id))?;
        let pcm = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| {
                ProviderError::new(
                    ProviderErrorKind::Other,
                    &self.id,
                    format!("invalid audio payload: {e}"),
                )
            })?;
        if pcm.is_empty() {
            return Err(ProviderError::empty_result(&self.id));
        }
        Ok(AudioItem::pcm(pcm, sample_rate_from_mime(mime), 1).with_voice(voice))
    }
}

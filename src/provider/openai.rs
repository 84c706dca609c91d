//! OpenAI-compatible adapter (OpenAI, Groq, local servers exposing the same API).

use crate::audio::item::AudioItem;
use crate::config::ProviderConfig;
use crate::defaults;
use crate::prompt::Prompt;
use crate::provider::error::{ProviderError, ProviderErrorKind};
use crate::provider::text::TextGenerator;
use crate::provider::voice::SpeechSynthesizer;
use serde_json::{Value, json};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SPEECH_MODEL: &str = "tts-1";

/// Replies are a handful of words; cap the completion accordingly.
const MAX_TOKENS: u32 = 60;

pub struct OpenAiProvider {
    id: String,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    text_model: String,
    speech_model: Option<String>,
    default_voice: String,
}

impl OpenAiProvider {
    pub fn new(id: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            id: id.into(),
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            speech_model: Some(DEFAULT_SPEECH_MODEL.to_string()),
            default_voice: defaults::OPENAI_DEFAULT_VOICE.to_string(),
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
        provider.speech_model = config.speech_model.clone();
        if let Some(voice) = &config.default_voice {
            provider.default_voice = voice.to_lowercase();
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

    pub fn with_speech_model(mut self, model: Option<String>) -> Self {
        self.speech_model = model;
        self
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::missing_credential(&self.id))?;

        let response = self
            .client
            .post(format!("{}{endpoint}", self.base_url))
            .header("Authorization", format!("Bearer {key}"))
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| ProviderError::from_request(&self.id, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http(&self.id, status.as_u16(), &body));
        }
        Ok(response)
    }
}

/// Message content of the first choice.
pub fn extract_message(response: &Value) -> Option<String> {
    let content = response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)?
        .trim();
    (!content.is_empty()).then(|| content.to_string())
}

#[async_trait::async_trait]
impl TextGenerator for OpenAiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.text_model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "max_tokens": MAX_TOKENS,
        });
        let response = self.post("/chat/completions", &body).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::from_request(&self.id, &e))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            ProviderError::new(
                ProviderErrorKind::Other,
                &self.id,
                format!("invalid response JSON: {e}"),
            )
        })?;
        extract_message(&value).ok_or_else(|| ProviderError::empty_result(&self.id))
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for OpenAiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn resolve_voice(&self, requested: &str) -> String {
        let requested = requested.to_lowercase();
        if defaults::OPENAI_VOICES.contains(&requested.as_str()) {
            requested
        } else {
            self.default_voice.clone()
        }
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<AudioItem, ProviderError> {
        let Some(model) = &self.speech_model else {
            return Err(ProviderError::new(
                ProviderErrorKind::Other,
                &self.id,
                "no speech model configured",
            ));
        };
        let body = json!({
            "model": model,
            "input": text,
            "voice": voice.to_lowercase(),
            "response_format": "mp3",
        });
        let response = self.post("/audio/speech", &body).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_request(&self.id, &e))?;
        if bytes.is_empty() {
            return Err(ProviderError::empty_result(&self.id));
        }
        Ok(AudioItem::compressed(bytes, Some("mp3")).with_voice(voice))
    }
}

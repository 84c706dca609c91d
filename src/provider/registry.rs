//! Builds provider adapters from configuration.

use crate::config::{Config, LOCAL_VOICE, NO_VOICE, ProviderConfig, ProviderKind};
use crate::error::{AuraError, Result};
use crate::provider::failover::{TextFailover, VoiceDispatch};
use crate::provider::gemini::GeminiProvider;
use crate::provider::local::LocalSpeech;
use crate::provider::openai::OpenAiProvider;
use crate::provider::ring::ProviderRing;
use crate::provider::text::TextGenerator;
use crate::provider::voice::SpeechSynthesizer;
use std::sync::Arc;
use std::time::Duration;

fn text_adapter(id: &str, config: &ProviderConfig) -> Arc<dyn TextGenerator> {
    match config.kind {
        ProviderKind::Gemini => Arc::new(GeminiProvider::from_config(id, config)),
        ProviderKind::OpenaiCompatible => Arc::new(OpenAiProvider::from_config(id, config)),
    }
}

fn speech_adapter(id: &str, config: &ProviderConfig) -> Arc<dyn SpeechSynthesizer> {
    match config.kind {
        ProviderKind::Gemini => Arc::new(GeminiProvider::from_config(id, config)),
        ProviderKind::OpenaiCompatible => Arc::new(OpenAiProvider::from_config(id, config)),
    }
}

/// Text failover over `text.ring`, starting at `text.preferred`.
///
/// Providers without a credential are still registered; they fail fast with
/// `MissingCredential` and rotation moves on.
pub fn build_text_failover(config: &Config) -> Result<TextFailover> {
    let ring = ProviderRing::new(config.text.ring.iter().cloned())?
        .with_preferred(&config.text.preferred)?;
    let mut failover = TextFailover::new(ring, Duration::from_secs(config.text.timeout_secs));

    for id in &config.text.ring {
        let provider = config
            .providers
            .get(id)
            .ok_or_else(|| AuraError::ConfigInvalidValue {
                key: "text.ring".to_string(),
                message: format!("'{id}' has no [providers.{id}] section"),
            })?;
        if provider.api_key().is_none() {
            tracing::warn!(provider = %id, "no API key configured; provider will be skipped");
        }
        failover = failover.with_generator(text_adapter(id, provider));
    }
    Ok(failover)
}

/// Single speech target named by `voice.provider`.
pub fn build_voice_dispatch(config: &Config) -> Result<VoiceDispatch> {
    let timeout = Duration::from_secs(config.voice.timeout_secs);
    let id = config.voice.provider.as_str();
    match id {
        NO_VOICE => Ok(VoiceDispatch::disabled()),
        LOCAL_VOICE => Ok(VoiceDispatch::new(Arc::new(LocalSpeech), timeout)),
        _ => {
            let provider =
                config
                    .providers
                    .get(id)
                    .ok_or_else(|| AuraError::ConfigInvalidValue {
                        key: "voice.provider".to_string(),
                        message: format!("'{id}' is not a configured provider"),
                    })?;
            Ok(VoiceDispatch::new(speech_adapter(id, provider), timeout))
        }
    }
}

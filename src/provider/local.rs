//! Local speech target. Produces delegate items; the sequencer hands their
//! text to the speech command at play time.

use crate::audio::item::AudioItem;
use crate::config::LOCAL_VOICE;
use crate::defaults;
use crate::provider::error::ProviderError;
use crate::provider::voice::SpeechSynthesizer;

#[derive(Debug, Clone, Default)]
pub struct LocalSpeech;

#[async_trait::async_trait]
impl SpeechSynthesizer for LocalSpeech {
    fn id(&self) -> &str {
        LOCAL_VOICE
    }

    /// Cloud voice names mean nothing to the speech command; an empty name
    /// leaves its default voice in place.
    fn resolve_voice(&self, requested: &str) -> String {
        let cloud = defaults::GEMINI_VOICES
            .iter()
            .chain(defaults::OPENAI_VOICES)
            .any(|v| v.eq_ignore_ascii_case(requested));
        if cloud {
            String::new()
        } else {
            requested.to_string()
        }
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<AudioItem, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::empty_result(LOCAL_VOICE));
        }
        Ok(AudioItem::delegate(text).with_voice(voice))
    }
}

//! Speech synthesis capability.

use crate::audio::item::AudioItem;
use crate::defaults;
use crate::provider::error::{ProviderError, ProviderErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One backend able to voice a reply.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn id(&self) -> &str;

    /// Voice name to send for the configured `requested` voice. Backends with
    /// a fixed catalogue substitute their own default for names they lack.
    fn resolve_voice(&self, requested: &str) -> String {
        requested.to_string()
    }

    /// Produce a playable item for `text` using `voice`.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<AudioItem, ProviderError>;
}

#[async_trait::async_trait]
impl<T: SpeechSynthesizer + ?Sized> SpeechSynthesizer for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn resolve_voice(&self, requested: &str) -> String {
        (**self).resolve_voice(requested)
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<AudioItem, ProviderError> {
        (**self).synthesize(text, voice).await
    }
}

/// Synthesizer that returns silent PCM of a fixed length, or a fixed failure.
pub struct MockSynthesizer {
    id: String,
    clip: Duration,
    failure: Option<ProviderErrorKind>,
    calls: Arc<AtomicUsize>,
}

impl MockSynthesizer {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            clip: Duration::from_millis(500),
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_clip(mut self, clip: Duration) -> Self {
        self.clip = clip;
        self
    }

    pub fn with_failure(mut self, kind: ProviderErrorKind) -> Self {
        self.failure = Some(kind);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn synthesize(&self, _text: &str, voice: &str) -> Result<AudioItem, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.failure {
            return Err(ProviderError::new(kind, &self.id, format!("mock {kind}")));
        }
        let rate = defaults::PCM_SAMPLE_RATE;
        let frames = (self.clip.as_secs_f64() * f64::from(rate)).round() as usize;
        Ok(AudioItem::pcm(vec![0u8; frames * 2], rate, 1).with_voice(voice))
    }
}

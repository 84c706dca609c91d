//! Provider failover for text and single-target dispatch for speech.

use crate::audio::item::AudioItem;
use crate::prompt::Prompt;
use crate::provider::error::{ProviderError, ProviderErrorKind};
use crate::provider::ring::ProviderRing;
use crate::provider::text::TextGenerator;
use crate::provider::voice::SpeechSynthesizer;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Terminal outcome of a failed text request.
#[derive(Debug, Clone, PartialEq)]
pub enum FailoverError {
    /// A provider reported throttling; remaining providers were not tried.
    Throttled(ProviderError),
    /// Every provider in the ring failed.
    Exhausted {
        attempts: Vec<String>,
        last: Option<ProviderError>,
    },
    /// A pause gate closed before the next attempt.
    Paused,
}

impl fmt::Display for FailoverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailoverError::Throttled(e) => write!(f, "throttled: {e}"),
            FailoverError::Exhausted { last: Some(e), .. } => {
                write!(f, "all text providers failed, last: {e}")
            }
            FailoverError::Exhausted { last: None, .. } => f.write_str("all text providers failed"),
            FailoverError::Paused => f.write_str("paused"),
        }
    }
}

impl std::error::Error for FailoverError {}

/// Successful text request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSuccess {
    pub text: String,
    pub provider: String,
    /// Providers tried, in order, including the one that answered.
    pub attempts: Vec<String>,
}

/// Walks a [`ProviderRing`] once per request until a provider answers.
pub struct TextFailover {
    ring: ProviderRing,
    generators: HashMap<String, Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl TextFailover {
    pub fn new(ring: ProviderRing, timeout: Duration) -> Self {
        Self {
            ring,
            generators: HashMap::new(),
            timeout,
        }
    }

    /// Register a backend under its own id.
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generators
            .insert(generator.id().to_string(), generator);
        self
    }

    pub fn ring(&self) -> &ProviderRing {
        &self.ring
    }

    async fn attempt(&self, id: &str, prompt: &Prompt) -> Result<String, ProviderError> {
        let Some(generator) = self.generators.get(id) else {
            return Err(ProviderError::new(
                ProviderErrorKind::Other,
                id,
                "provider is not configured",
            ));
        };
        match tokio::time::timeout(self.timeout, generator.generate(prompt)).await {
            Ok(Ok(text)) if text.trim().is_empty() => Err(ProviderError::empty_result(id)),
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(id, self.timeout.as_secs())),
        }
    }

    /// Generate a reply starting at `preferred`.
    ///
    /// `is_paused` is consulted before every attempt; `on_attempt` fires as
    /// soon as a provider is chosen, before its request completes.
    pub async fn generate<P, A>(
        &self,
        prompt: &Prompt,
        preferred: &str,
        is_paused: P,
        mut on_attempt: A,
    ) -> Result<TextSuccess, FailoverError>
    where
        P: Fn() -> bool,
        A: FnMut(&str),
    {
        let mut attempts = Vec::with_capacity(self.ring.len());
        let mut last = None;

        for id in self.ring.rotation_from(preferred) {
            if is_paused() {
                info!(provider = id, "paused before text attempt");
                return Err(FailoverError::Paused);
            }
            on_attempt(id);
            attempts.push(id.to_string());

            match self.attempt(id, prompt).await {
                Ok(text) => {
                    info!(provider = id, attempt = attempts.len(), "reply generated");
                    return Ok(TextSuccess {
                        text,
                        provider: id.to_string(),
                        attempts,
                    });
                }
                Err(e) if e.is_throttled() => {
                    error!(provider = id, "provider throttled: {}", e.message);
                    return Err(FailoverError::Throttled(e));
                }
                Err(e) => {
                    warn!(provider = id, kind = %e.kind, "text attempt failed: {}", e.message);
                    last = Some(e);
                }
            }
        }

        Err(FailoverError::Exhausted { attempts, last })
    }
}

/// Sends speech requests to one configured target. No failover.
pub struct VoiceDispatch {
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    timeout: Duration,
}

impl VoiceDispatch {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, timeout: Duration) -> Self {
        Self {
            synthesizer: Some(synthesizer),
            timeout,
        }
    }

    /// Speech turned off.
    pub fn disabled() -> Self {
        Self {
            synthesizer: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.synthesizer.as_ref().map(|s| s.id())
    }

    /// Voice `text`. Callers must check [`provider_id`](Self::provider_id) first;
    /// a disabled dispatcher reports `Other`.
    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<AudioItem, ProviderError> {
        let Some(synth) = &self.synthesizer else {
            return Err(ProviderError::new(
                ProviderErrorKind::Other,
                "none",
                "speech is disabled",
            ));
        };
        let id = synth.id();
        let voice = synth.resolve_voice(voice);
        match tokio::time::timeout(self.timeout, synth.synthesize(text, &voice)).await {
            Ok(Ok(item)) if item.payload.is_empty() && item.text.is_none() => {
                Err(ProviderError::empty_result(id))
            }
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(id, self.timeout.as_secs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::text::MockTextGenerator;
    use crate::provider::voice::MockSynthesizer;
    use std::sync::Mutex;

    fn prompt() -> Prompt {
        Prompt {
            system: "be brief".to_string(),
            user: "hi".to_string(),
        }
    }

    fn ring() -> ProviderRing {
        ProviderRing::new(["a", "b", "c"]).unwrap()
    }

    fn failover(
        a: MockTextGenerator,
        b: MockTextGenerator,
        c: MockTextGenerator,
    ) -> TextFailover {
        TextFailover::new(ring(), Duration::from_secs(5))
            .with_generator(Arc::new(a))
            .with_generator(Arc::new(b))
            .with_generator(Arc::new(c))
    }

    #[tokio::test]
    async fn preferred_success_stops_immediately() {
        let f = failover(
            MockTextGenerator::new("a").with_failure(ProviderErrorKind::Other),
            MockTextGenerator::new("b").with_reply("from b"),
            MockTextGenerator::new("c").with_failure(ProviderErrorKind::Other),
        );

        let mut seen = Vec::new();
        let ok = f
            .generate(&prompt(), "b", || false, |id| seen.push(id.to_string()))
            .await
            .unwrap();

        assert_eq!(ok.provider, "b");
        assert_eq!(ok.text, "from b");
        assert_eq!(ok.attempts, vec!["b"]);
        assert_eq!(seen, vec!["b"]);
    }

    #[tokio::test]
    async fn rotation_wraps_until_success() {
        let f = failover(
            MockTextGenerator::new("a").with_reply("from a"),
            MockTextGenerator::new("b").with_failure(ProviderErrorKind::Transport),
            MockTextGenerator::new("c").with_failure(ProviderErrorKind::MissingCredential),
        );

        let ok = f.generate(&prompt(), "b", || false, |_| {}).await.unwrap();

        assert_eq!(ok.attempts, vec!["b", "c", "a"]);
        assert_eq!(ok.provider, "a");
    }

    #[tokio::test]
    async fn exhaustion_reports_last_error() {
        let f = failover(
            MockTextGenerator::new("a").with_failure(ProviderErrorKind::Other),
            MockTextGenerator::new("b").with_failure(ProviderErrorKind::Transport),
            MockTextGenerator::new("c").with_failure(ProviderErrorKind::EmptyResult),
        );

        let err = f.generate(&prompt(), "b", || false, |_| {}).await.unwrap_err();

        match err {
            FailoverError::Exhausted { attempts, last } => {
                assert_eq!(attempts, vec!["b", "c", "a"]);
                let last = last.unwrap();
                assert_eq!(last.provider, "a");
                assert_eq!(last.kind, ProviderErrorKind::Other);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn throttling_short_circuits_rotation() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let f = TextFailover::new(ring(), Duration::from_secs(5))
            .with_generator(Arc::new(
                MockTextGenerator::new("a")
                    .with_failure(ProviderErrorKind::Throttled)
                    .with_call_log(Arc::clone(&calls)),
            ))
            .with_generator(Arc::new(
                MockTextGenerator::new("b")
                    .with_failure(ProviderErrorKind::Throttled)
                    .with_call_log(Arc::clone(&calls)),
            ))
            .with_generator(Arc::new(
                MockTextGenerator::new("c")
                    .with_failure(ProviderErrorKind::Throttled)
                    .with_call_log(Arc::clone(&calls)),
            ));

        let err = f.generate(&prompt(), "b", || false, |_| {}).await.unwrap_err();

        assert!(matches!(err, FailoverError::Throttled(ref e) if e.provider == "b"));
        assert_eq!(*calls.lock().unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn blank_reply_counts_as_empty_result() {
        let f = failover(
            MockTextGenerator::new("a").with_reply("   "),
            MockTextGenerator::new("b").with_reply("real"),
            MockTextGenerator::new("c"),
        );

        let ok = f.generate(&prompt(), "a", || false, |_| {}).await.unwrap();
        assert_eq!(ok.provider, "b");
        assert_eq!(ok.attempts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unregistered_provider_is_skipped() {
        let f = TextFailover::new(ring(), Duration::from_secs(5))
            .with_generator(Arc::new(MockTextGenerator::new("c").with_reply("c here")));

        let ok = f.generate(&prompt(), "a", || false, |_| {}).await.unwrap();
        assert_eq!(ok.attempts, vec!["a", "b", "c"]);
        assert_eq!(ok.provider, "c");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_transport_failure() {
        let f = failover(
            MockTextGenerator::new("a").with_delay(Duration::from_secs(60)),
            MockTextGenerator::new("b").with_reply("fast"),
            MockTextGenerator::new("c"),
        );

        let ok = f.generate(&prompt(), "a", || false, |_| {}).await.unwrap();
        assert_eq!(ok.provider, "b");
    }

    #[tokio::test]
    async fn pause_before_next_attempt_stops_rotation() {
        let f = failover(
            MockTextGenerator::new("a").with_failure(ProviderErrorKind::Other),
            MockTextGenerator::new("b"),
            MockTextGenerator::new("c"),
        );

        let attempts = std::cell::Cell::new(0);
        let err = f
            .generate(
                &prompt(),
                "a",
                || attempts.get() >= 1,
                |_| attempts.set(attempts.get() + 1),
            )
            .await
            .unwrap_err();

        assert_eq!(err, FailoverError::Paused);
        assert_eq!(attempts.get(), 1);
    }

    #[tokio::test]
    async fn voice_dispatch_has_no_failover() {
        let synth = Arc::new(MockSynthesizer::new("gemini").with_failure(ProviderErrorKind::Other));
        let dispatch = VoiceDispatch::new(synth.clone(), Duration::from_secs(5));

        let err = dispatch.synthesize("hi", "Puck").await.unwrap_err();
        assert_eq!(err.provider, "gemini");
        assert_eq!(synth.calls(), 1);
    }

    #[tokio::test]
    async fn disabled_voice_dispatch() {
        let dispatch = VoiceDispatch::disabled();
        assert_eq!(dispatch.provider_id(), None);
        assert!(dispatch.synthesize("hi", "Puck").await.is_err());
    }
}

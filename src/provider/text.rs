//! Text generation capability.

use crate::prompt::Prompt;
use crate::provider::error::{ProviderError, ProviderErrorKind};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One backend able to turn a prompt into reply text.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider id as used in the ring.
    fn id(&self) -> &str;

    /// Produce a reply. Blank output must be reported as `EmptyResult`.
    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError>;
}

#[async_trait::async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        (**self).generate(prompt).await
    }
}

/// Scripted generator for tests and offline runs.
///
/// Scripted outcomes are consumed in order; afterwards the default outcome repeats.
pub struct MockTextGenerator {
    id: String,
    script: Mutex<VecDeque<Result<String, ProviderErrorKind>>>,
    default: Result<String, ProviderErrorKind>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    call_log: Option<Arc<Mutex<Vec<String>>>>,
    prompt_log: Option<Arc<Mutex<Vec<Prompt>>>>,
}

impl MockTextGenerator {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            script: Mutex::new(VecDeque::new()),
            default: Ok(format!("reply from {id}")),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            call_log: None,
            prompt_log: None,
        }
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.default = Ok(reply.to_string());
        self
    }

    pub fn with_failure(mut self, kind: ProviderErrorKind) -> Self {
        self.default = Err(kind);
        self
    }

    /// Queue outcomes consumed before the default applies.
    pub fn with_script(self, outcomes: Vec<Result<String, ProviderErrorKind>>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(outcomes);
        }
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Append this generator's id to `log` on every call.
    pub fn with_call_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.call_log = Some(log);
        self
    }

    /// Append every prompt this generator receives to `log`.
    pub fn with_prompt_log(mut self, log: Arc<Mutex<Vec<Prompt>>>) -> Self {
        self.prompt_log = Some(log);
        self
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TextGenerator for MockTextGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.prompt_log
            && let Ok(mut log) = log.lock()
        {
            log.push(prompt.clone());
        }
        if let Some(log) = &self.call_log
            && let Ok(mut log) = log.lock()
        {
            log.push(self.id.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let outcome = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.default.clone());
        outcome.map_err(|kind| ProviderError::new(kind, &self.id, format!("mock {kind}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Prompt {
        Prompt {
            system: String::new(),
            user: "hi".to_string(),
        }
    }

    #[tokio::test]
    async fn mock_returns_default_reply() {
        let generator = MockTextGenerator::new("a").with_reply("hello");
        assert_eq!(generator.generate(&prompt()).await.unwrap(), "hello");
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn mock_consumes_script_then_default() {
        let generator = MockTextGenerator::new("a")
            .with_reply("later")
            .with_script(vec![Err(ProviderErrorKind::Transport), Ok("first".to_string())]);

        let err = generator.generate(&prompt()).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Transport);
        assert_eq!(err.provider, "a");
        assert_eq!(generator.generate(&prompt()).await.unwrap(), "first");
        assert_eq!(generator.generate(&prompt()).await.unwrap(), "later");
    }

    #[tokio::test]
    async fn mock_failure_reports_kind() {
        let generator = MockTextGenerator::new("b").with_failure(ProviderErrorKind::Throttled);
        assert!(generator.generate(&prompt()).await.unwrap_err().is_throttled());
    }
}

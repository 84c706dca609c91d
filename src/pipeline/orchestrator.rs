//! Response worker: dequeues chat events one at a time, generates a reply
//! through the text ring, voices it and hands the audio to the sequencer.

use crate::audio::item::AudioItem;
use crate::chat::event::ChatEvent;
use crate::chat::queue::SharedQueue;
use crate::clock::{Clock, TokioClock};
use crate::config::{Config, LiveSettings, RuntimeSettings, read_settings};
use crate::defaults;
use crate::pipeline::cooldown::{CooldownGovernor, Refusal};
use crate::pipeline::types::{
    EventSink, PipelineControls, PipelineEvent, PipelineSnapshot, ResponseLog, ResponseRecord,
};
use crate::prompt::{ChatterContext, PersonaPrompt, PromptBuilder, clean_reply};
use crate::provider::error::ProviderError;
use crate::provider::failover::{FailoverError, TextFailover, VoiceDispatch};
use crossbeam_channel::TrySendError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long `PipelineHandle::stop` waits for an in-flight attempt.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Timing and sizing for the response worker.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Punitive lockout after throttling.
    pub lockout: Duration,
    /// Re-check interval while paused, cooling down or locked out.
    pub poll_interval: Duration,
    /// Pause after every attempt before the next dequeue check.
    pub next_check_delay: Duration,
    /// Response records kept for observers.
    pub history: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lockout: Duration::from_secs(defaults::LOCKOUT_SECS),
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            next_check_delay: Duration::from_millis(defaults::NEXT_CHECK_DELAY_MS),
            history: defaults::RESPONSE_HISTORY,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lockout: Duration::from_secs(config.timing.lockout_secs),
            poll_interval: Duration::from_millis(config.timing.poll_interval_ms),
            next_check_delay: Duration::from_millis(config.timing.next_check_delay_ms),
            history: config.history.responses,
        }
    }
}

/// Why the worker is not dequeuing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Idle {
    Paused,
    Refused(Refusal),
    Empty,
}

/// Single-flight response worker. Sole consumer of the pending queue and
/// sole owner of the cooldown state and response records.
pub struct ResponsePipeline<C: Clock = TokioClock> {
    config: PipelineConfig,
    text: TextFailover,
    voice: VoiceDispatch,
    prompt: Arc<dyn PromptBuilder>,
    queue: SharedQueue,
    settings: LiveSettings,
    controls: PipelineControls,
    events: EventSink,
    audio_tx: Option<crossbeam_channel::Sender<AudioItem>>,
    governor: CooldownGovernor<C>,
    log: ResponseLog,
    /// Lowercased usernames already answered this session.
    seen_users: HashSet<String>,
    snapshot_tx: watch::Sender<PipelineSnapshot>,
    in_flight: bool,
}

impl ResponsePipeline<TokioClock> {
    pub fn new(
        config: PipelineConfig,
        text: TextFailover,
        voice: VoiceDispatch,
        queue: SharedQueue,
        settings: LiveSettings,
    ) -> Self {
        let governor = CooldownGovernor::with_clock(config.lockout, TokioClock);
        let log = ResponseLog::new(config.history);
        let (snapshot_tx, _) = watch::channel(PipelineSnapshot::default());
        Self {
            config,
            text,
            voice,
            prompt: Arc::new(PersonaPrompt::default()),
            queue,
            settings,
            controls: PipelineControls::new(),
            events: EventSink::none(),
            audio_tx: None,
            governor,
            log,
            seen_users: HashSet::new(),
            snapshot_tx,
            in_flight: false,
        }
    }
}

impl<C: Clock + 'static> ResponsePipeline<C> {
    pub fn with_prompt(mut self, prompt: Arc<dyn PromptBuilder>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_controls(mut self, controls: PipelineControls) -> Self {
        self.controls = controls;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Where synthesized audio goes. Without a sender, voice is still
    /// generated and recorded but nothing plays.
    pub fn with_audio(mut self, tx: crossbeam_channel::Sender<AudioItem>) -> Self {
        self.audio_tx = Some(tx);
        self
    }

    /// Snapshots published after every state change.
    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Run on the current tokio runtime until `stop` is called.
    pub fn spawn(self) -> PipelineHandle
    where
        C: Send,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let snapshot = self.subscribe();
        let task = tokio::spawn(self.run(shutdown_rx));
        PipelineHandle {
            task,
            shutdown: shutdown_tx,
            snapshot,
        }
    }

    /// Worker loop. Returns once `shutdown` turns true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("response pipeline started");
        self.publish();

        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.governor.poll_expiry() {
                info!("lockout cleared");
                self.events.emit(PipelineEvent::LockoutCleared);
            }

            let settings = read_settings(&self.settings);
            match self.next_event(&settings) {
                Ok(event) => {
                    self.respond(event, &settings).await;
                    self.publish();
                    if wait_or_shutdown(self.config.next_check_delay, &mut shutdown).await {
                        break;
                    }
                }
                Err(idle) => {
                    self.publish();
                    let woken = match idle {
                        Idle::Empty => {
                            let queue = self.queue.clone();
                            tokio::select! {
                                _ = queue.notified() => false,
                                stop = wait_or_shutdown(self.config.poll_interval, &mut shutdown) => stop,
                            }
                        }
                        Idle::Paused | Idle::Refused(_) => {
                            debug!(?idle, "not dequeuing");
                            wait_or_shutdown(self.config.poll_interval, &mut shutdown).await
                        }
                    };
                    if woken {
                        break;
                    }
                }
            }
        }

        info!("response pipeline stopped");
    }

    /// Apply the dequeue gates in order: pause, governor, queue.
    fn next_event(&mut self, settings: &RuntimeSettings) -> Result<ChatEvent, Idle> {
        if self.controls.any_paused() {
            return Err(Idle::Paused);
        }
        let cooldown = Duration::from_secs(settings.cooldown_secs);
        self.governor.may_start(cooldown).map_err(Idle::Refused)?;
        self.queue.pop().ok_or(Idle::Empty)
    }

    fn snapshot(&self) -> PipelineSnapshot {
        let cooldown = Duration::from_secs(read_settings(&self.settings).cooldown_secs);
        PipelineSnapshot {
            responses: self.log.to_vec(),
            queue_len: self.queue.len(),
            cooldown: self.governor.view(cooldown),
            in_flight: self.in_flight,
            feed_paused: self.controls.feed_paused(),
            ai_paused: self.controls.ai_paused(),
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        debug_assert!(snapshot.processing_count() <= 1, "more than one reply in flight");
        self.snapshot_tx.send_replace(snapshot);
    }

    /// Emit the current state of one record and publish a snapshot.
    fn publish_record(&self, id: &str) {
        if let Some(record) = self.log.get(id) {
            self.events.emit(PipelineEvent::Response {
                record: record.clone(),
            });
        }
        self.publish();
    }

    fn update<F>(&mut self, id: &str, f: F)
    where
        F: FnOnce(&mut ResponseRecord) -> bool,
    {
        match self.log.get_mut(id) {
            Some(record) => {
                if !f(record) {
                    warn!(record = %id, "ignored out-of-order state transition");
                }
            }
            None => debug!(record = %id, "record evicted before update"),
        }
        self.publish_record(id);
    }

    async fn respond(&mut self, event: ChatEvent, settings: &RuntimeSettings) {
        let mut record = ResponseRecord::from_event(&event);
        record.begin();
        let id = record.id.clone();
        info!(record = %id, user = %event.username, "responding");
        self.log.push(record);
        self.in_flight = true;
        self.publish_record(&id);

        let chatter = ChatterContext {
            streamer: settings.is_streamer(&event.username),
            first_time: self.seen_users.insert(event.username.to_lowercase()),
        };
        let prompt = self.prompt.build(&event, chatter, settings);
        let controls = self.controls.clone();
        let log = &mut self.log;
        let events = &self.events;
        let snapshot_tx = &self.snapshot_tx;
        let outcome = self
            .text
            .generate(
                &prompt,
                &settings.preferred_text,
                || controls.any_paused(),
                |provider| {
                    debug!(record = %id, provider, "attempting text provider");
                    let Some(record) = log.get_mut(&id) else {
                        return;
                    };
                    record.attempting(provider);
                    let record = record.clone();
                    snapshot_tx.send_modify(|s| {
                        if let Some(slot) = s.responses.iter_mut().find(|r| r.id == record.id) {
                            *slot = record.clone();
                        }
                    });
                    events.emit(PipelineEvent::Response { record });
                },
            )
            .await;

        match outcome {
            Ok(success) => {
                let reply = clean_reply(&success.text);
                self.governor.record_success();
                let voice_target = self.voice.provider_id().map(str::to_string);
                let provider = success.provider.clone();
                let text = reply.clone();
                self.update(&id, |r| {
                    let done = r.complete_text(text, &provider);
                    if done && voice_target.is_none() {
                        r.skip_voice();
                    }
                    done
                });
                self.in_flight = false;
                if let Some(target) = voice_target {
                    self.voice_reply(&id, &reply, &settings.voice, &target).await;
                }
            }
            Err(FailoverError::Throttled(err)) => {
                let secs = self.config.lockout.as_secs();
                self.update(&id, |r| {
                    r.fail_text(format!("Quota exhausted. Cooling down for {secs}s…"))
                });
                self.enter_lockout(&err);
            }
            Err(FailoverError::Exhausted { attempts, last }) => {
                let reason = last
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no provider answered".to_string());
                error!(record = %id, ?attempts, "all text providers failed: {reason}");
                self.update(&id, |r| r.fail_text(format!("Generation failed: {reason}")));
            }
            Err(FailoverError::Paused) => {
                self.update(&id, |r| r.fail_text("Paused".to_string()));
            }
        }
        self.in_flight = false;
    }

    async fn voice_reply(&mut self, id: &str, reply: &str, voice: &str, target: &str) {
        match self.voice.synthesize(reply, voice).await {
            Ok(item) => {
                debug!(record = %id, encoding = item.encoding.label(), duration = ?item.pcm_duration(), "speech ready");
                let item = item.with_response_id(id);
                let summary = item.summary();
                match self.enqueue_audio(item) {
                    Ok(()) => self.update(id, |r| r.complete_voice(target, Some(summary))),
                    Err(message) => self.update(id, |r| r.fail_voice(target, message)),
                }
            }
            Err(err) => {
                warn!(record = %id, provider = target, kind = %err.kind, "speech failed: {}", err.message);
                let message = err.to_string();
                self.update(id, |r| r.fail_voice(target, message));
                if err.is_throttled() {
                    self.enter_lockout(&err);
                }
            }
        }
    }

    fn enqueue_audio(&self, item: AudioItem) -> Result<(), String> {
        let Some(tx) = &self.audio_tx else {
            return Ok(());
        };
        match tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("audio queue full; dropping clip");
                Err("audio queue full".to_string())
            }
            Err(TrySendError::Disconnected(_)) => Err("audio output stopped".to_string()),
        }
    }

    fn enter_lockout(&mut self, cause: &ProviderError) {
        self.governor.enter_lockout();
        let dropped = self.queue.clear();
        let secs = self.config.lockout.as_secs();
        error!(provider = %cause.provider, secs, dropped, "throttled; entering lockout");
        self.events.emit(PipelineEvent::LockoutStarted { secs });
        if dropped > 0 {
            self.events.emit(PipelineEvent::QueueDropped {
                dropped,
                reason: "lockout".to_string(),
            });
        }
        self.publish();
    }
}

/// Sleep for `delay`. Returns true if shutdown was requested meanwhile.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Handle to a spawned [`ResponsePipeline`].
pub struct PipelineHandle {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
    snapshot: watch::Receiver<PipelineSnapshot>,
}

impl PipelineHandle {
    /// Latest published state.
    pub fn snapshot(&self) -> PipelineSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the worker to stop and wait for it. An attempt in flight gets a
    /// short grace period before the task is aborted.
    pub async fn stop(self) {
        self.shutdown.send_replace(true);
        let abort = self.task.abort_handle();
        match tokio::time::timeout(STOP_GRACE, self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => error!("response pipeline task failed: {e}"),
            Err(_) => {
                warn!("response pipeline did not stop in time; aborting");
                abort.abort();
            }
        }
    }
}

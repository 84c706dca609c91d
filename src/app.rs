//! Companion application: wires chat ingestion, the response pipeline and
//! audio playback together.
//!
//! chat transport → admission → pending queue → response worker → audio
//! sequencer, with every observable change fanned out as a [`PipelineEvent`].

use crate::audio::output::{AudioOutput, NullOutput};
use crate::audio::sequencer::AudioSequencer;
use crate::audio::speech::{LocalSpeaker, Speaker};
use crate::chat::admission::ChatIntake;
use crate::chat::queue::SharedQueue;
use crate::config::{Config, LiveSettings, live_settings, read_settings, update_settings};
use crate::defaults;
use crate::error::{AuraError, Result};
use crate::ipc::protocol::StatusReport;
use crate::output::render_event;
use crate::pipeline::orchestrator::{PipelineConfig, PipelineHandle, ResponsePipeline};
use crate::pipeline::types::{
    EventSink, PipelineControls, PipelineEvent, PipelineSnapshot, ResponseRecord,
};
use crate::provider::registry::{build_text_failover, build_voice_dispatch};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, broadcast, watch};
use tracing::{debug, error, info, warn};

#[cfg(feature = "cpal-audio")]
use crate::audio::cpal_output::CpalOutput;

/// How long a chat transport gets to close cleanly before it is aborted.
const INGEST_GRACE: Duration = Duration::from_secs(2);

/// Where chat comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatSource {
    /// `user: message` lines on stdin.
    Stdin,
    /// Anonymous Twitch IRC for the named channel.
    Twitch(String),
    /// No transport; events arrive only through [`CompanionControl::deliver`].
    Detached,
}

impl ChatSource {
    /// `--stdin` wins; otherwise a channel from the command line or config
    /// selects Twitch, and without one stdin is read.
    pub fn resolve(config: &Config, channel: Option<String>, stdin: bool) -> Self {
        if stdin {
            return ChatSource::Stdin;
        }
        let channel = channel
            .filter(|c| !c.trim().is_empty())
            .or_else(|| Some(config.chat.channel.clone()).filter(|c| !c.trim().is_empty()));
        match channel {
            Some(channel) => ChatSource::Twitch(channel.trim().trim_start_matches('#').to_string()),
            None => ChatSource::Stdin,
        }
    }
}

/// Startup options not carried by the config file.
#[derive(Debug, Clone)]
pub struct CompanionOptions {
    pub source: ChatSource,
    /// Play nothing; local speech is disabled too.
    pub no_audio: bool,
    /// Print events to stderr.
    pub render: bool,
}

/// Cloneable handle used by the IPC handler to observe and steer a running companion.
#[derive(Clone)]
pub struct CompanionControl {
    settings: LiveSettings,
    controls: PipelineControls,
    intake: ChatIntake,
    snapshot: watch::Receiver<PipelineSnapshot>,
    events: EventSink,
    broadcast: broadcast::Sender<PipelineEvent>,
    ring: Vec<String>,
    voice_provider: Option<String>,
    shutdown: Arc<Notify>,
}

impl CompanionControl {
    pub fn status(&self) -> StatusReport {
        let snapshot = self.snapshot.borrow().clone();
        let settings = read_settings(&self.settings);
        StatusReport {
            connection: self.intake.status(),
            queue_len: self.intake.queue().len(),
            in_flight: snapshot.in_flight,
            locked: snapshot.cooldown.locked,
            lockout_remaining_secs: snapshot.cooldown.lockout_remaining_secs,
            cooldown_remaining_secs: snapshot.cooldown.cooldown_remaining_secs,
            cooldown_secs: settings.cooldown_secs,
            feed_paused: self.controls.feed_paused(),
            ai_paused: self.controls.ai_paused(),
            auto_reply: settings.auto_reply,
            preferred_text: settings.preferred_text,
            voice_provider: self.voice_provider.clone(),
            ignored_users: settings.ignored_users,
            voice: settings.voice,
            personality: settings.personality,
            daemon_version: crate::version_string(),
        }
    }

    /// Recent response records, newest first.
    pub fn responses(&self) -> Vec<ResponseRecord> {
        self.snapshot.borrow().responses.clone()
    }

    /// Display log, oldest first. With `limit`, only the newest `limit` lines.
    pub fn recent_chat(&self, limit: Option<usize>) -> Vec<crate::chat::event::ChatEvent> {
        let mut lines = self.intake.recent();
        if let Some(limit) = limit {
            let skip = lines.len().saturating_sub(limit);
            lines.drain(..skip);
        }
        lines
    }

    /// Hand one chat event to admission, as a transport would.
    pub fn deliver(&self, event: crate::chat::event::ChatEvent) -> crate::chat::Admission {
        self.intake.deliver(event)
    }

    fn notice(&self, message: String) {
        info!("{message}");
        self.events.emit(PipelineEvent::Notice { message });
    }

    pub fn set_feed_paused(&self, paused: bool) {
        self.controls.set_feed_paused(paused);
        self.notice(format!("chat feed {}", if paused { "paused" } else { "resumed" }));
    }

    pub fn set_ai_paused(&self, paused: bool) {
        self.controls.set_ai_paused(paused);
        self.notice(format!("replies {}", if paused { "paused" } else { "resumed" }));
    }

    pub fn set_auto_reply(&self, enabled: bool) {
        update_settings(&self.settings, |s| s.auto_reply = enabled);
        self.notice(format!("auto-reply {}", if enabled { "on" } else { "off" }));
    }

    /// Returns false if the user was already ignored.
    pub fn ignore(&self, user: &str) -> bool {
        let changed = update_settings(&self.settings, |s| s.ignore(user));
        if changed {
            self.notice(format!("ignoring {user}"));
        }
        changed
    }

    /// Returns false if the user was not ignored.
    pub fn unignore(&self, user: &str) -> bool {
        let changed = update_settings(&self.settings, |s| s.unignore(user));
        if changed {
            self.notice(format!("no longer ignoring {user}"));
        }
        changed
    }

    pub fn set_cooldown(&self, secs: u64) -> Result<()> {
        if !(defaults::MIN_COOLDOWN_SECS..=defaults::MAX_COOLDOWN_SECS).contains(&secs) {
            return Err(AuraError::ConfigInvalidValue {
                key: "timing.cooldown_secs".to_string(),
                message: format!(
                    "must be between {} and {} seconds",
                    defaults::MIN_COOLDOWN_SECS,
                    defaults::MAX_COOLDOWN_SECS
                ),
            });
        }
        update_settings(&self.settings, |s| s.cooldown_secs = secs);
        self.notice(format!("cooldown set to {secs}s"));
        Ok(())
    }

    /// Voice used for the next synthesis. Names the speech target does not
    /// offer fall back to its default voice.
    pub fn set_voice(&self, voice: &str) -> Result<()> {
        let voice = voice.trim();
        if voice.is_empty() {
            return Err(AuraError::ConfigInvalidValue {
                key: "voice.voice".to_string(),
                message: "voice name is empty".to_string(),
            });
        }
        update_settings(&self.settings, |s| s.voice = voice.to_string());
        self.notice(format!("voice set to {voice}"));
        Ok(())
    }

    /// Personality used from the next prompt on.
    pub fn set_personality(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AuraError::ConfigInvalidValue {
                key: "persona.personality".to_string(),
                message: "personality is empty".to_string(),
            });
        }
        update_settings(&self.settings, |s| s.personality = text.to_string());
        self.notice("personality updated".to_string());
        Ok(())
    }

    /// Start future rotations at `provider`, which must be in the ring.
    pub fn set_preferred(&self, provider: &str) -> Result<()> {
        if !self.ring.iter().any(|id| id == provider) {
            return Err(AuraError::ConfigInvalidValue {
                key: "text.preferred".to_string(),
                message: format!("'{provider}' is not in the ring ({})", self.ring.join(", ")),
            });
        }
        update_settings(&self.settings, |s| s.preferred_text = provider.to_string());
        self.notice(format!("text rotation starts at {provider}"));
        Ok(())
    }

    /// Live event stream, as rendered in the foreground.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.broadcast.subscribe()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Resolves once [`request_shutdown`](Self::request_shutdown) has been called.
    pub async fn wait_shutdown(&self) {
        self.shutdown.notified().await;
    }
}

/// A running companion. Dropping it without [`shutdown`](Self::shutdown)
/// leaves the worker threads to die with the process.
pub struct Companion {
    control: CompanionControl,
    pipeline: PipelineHandle,
    audio: std::thread::JoinHandle<()>,
    printer: std::thread::JoinHandle<()>,
    printer_stop: Arc<AtomicBool>,
    ingest: Option<tokio::task::JoinHandle<()>>,
    ingest_shutdown: watch::Sender<bool>,
}

impl Companion {
    /// Validate `config`, build providers and start every worker.
    /// Must be called from within a tokio runtime.
    pub fn start(config: Config, options: CompanionOptions) -> Result<Self> {
        config.validate()?;

        let settings = live_settings(&config);
        if let ChatSource::Twitch(channel) = &options.source {
            update_settings(&settings, |s| s.channel = channel.clone());
        }
        let controls = PipelineControls::new();
        let queue = SharedQueue::new();
        let (event_tx, event_rx) = crossbeam_channel::bounded(defaults::EVENT_CHANNEL_CAPACITY);
        let events = EventSink::new(event_tx);
        let (broadcast_tx, _) = broadcast::channel(defaults::EVENT_CHANNEL_CAPACITY);

        let intake = ChatIntake::new(
            queue.clone(),
            settings.clone(),
            controls.clone(),
            config.chat.display_log_size,
            events.clone(),
        );

        let text = build_text_failover(&config)?;
        let voice = build_voice_dispatch(&config)?;
        let ring = text.ring().ids().to_vec();
        let voice_provider = voice.provider_id().map(str::to_string);
        info!(ring = ?ring, voice = ?voice_provider, "providers ready");

        let (audio_tx, audio_rx) = crossbeam_channel::bounded(defaults::AUDIO_QUEUE_CAPACITY);
        let audio = spawn_audio(&config, options.no_audio, events.clone(), audio_rx)?;

        let pipeline = ResponsePipeline::new(
            PipelineConfig::from_config(&config),
            text,
            voice,
            queue,
            settings.clone(),
        )
        .with_controls(controls.clone())
        .with_events(events.clone())
        .with_audio(audio_tx)
        .spawn();

        let printer_stop = Arc::new(AtomicBool::new(false));
        let printer = spawn_printer(
            event_rx,
            broadcast_tx.clone(),
            options.render,
            Arc::clone(&printer_stop),
        )?;

        let (ingest_shutdown, ingest_rx) = watch::channel(false);
        let ingest = spawn_ingest(options.source, intake.clone(), ingest_rx);

        let control = CompanionControl {
            settings,
            controls,
            intake,
            snapshot: pipeline.subscribe(),
            events,
            broadcast: broadcast_tx,
            ring,
            voice_provider,
            shutdown: Arc::new(Notify::new()),
        };

        Ok(Self {
            control,
            pipeline,
            audio,
            printer,
            printer_stop,
            ingest,
            ingest_shutdown,
        })
    }

    pub fn control(&self) -> CompanionControl {
        self.control.clone()
    }

    /// Stop ingestion, let the worker finish its current attempt, then wait
    /// for queued audio to play out.
    pub async fn shutdown(self) {
        self.ingest_shutdown.send_replace(true);
        if let Some(task) = self.ingest {
            let abort = task.abort_handle();
            if tokio::time::timeout(INGEST_GRACE, task).await.is_err() {
                debug!("chat transport did not close in time; aborting");
                abort.abort();
            }
        }

        // Dropping the worker's audio sender lets the sequencer drain and exit
        self.pipeline.stop().await;
        join_thread("audio", self.audio).await;

        self.printer_stop.store(true, Ordering::SeqCst);
        join_thread("event printer", self.printer).await;
        info!("companion stopped");
    }
}

async fn join_thread(name: &'static str, handle: std::thread::JoinHandle<()>) {
    match tokio::task::spawn_blocking(move || handle.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => error!("{name} thread panicked"),
        Err(e) => error!("failed to join {name} thread: {e}"),
    }
}

fn spawn_sequencer<O: AudioOutput + 'static>(
    output: O,
    events: EventSink,
    speaker: Option<Box<dyn Speaker>>,
    rx: Receiver<crate::audio::item::AudioItem>,
) -> Result<std::thread::JoinHandle<()>> {
    let mut sequencer = AudioSequencer::new(output, events);
    if let Some(speaker) = speaker {
        sequencer = sequencer.with_speaker(speaker);
    }
    Ok(sequencer.spawn(rx)?)
}

fn spawn_audio(
    config: &Config,
    no_audio: bool,
    events: EventSink,
    rx: Receiver<crate::audio::item::AudioItem>,
) -> Result<std::thread::JoinHandle<()>> {
    if no_audio || !config.audio.enabled {
        info!("audio disabled");
        return spawn_sequencer(NullOutput::new(defaults::PCM_SAMPLE_RATE), events, None, rx);
    }

    let speaker: Box<dyn Speaker> =
        Box::new(LocalSpeaker::system(config.audio.speech_command.clone()));

    #[cfg(feature = "cpal-audio")]
    match CpalOutput::open(config.audio.output_device.as_deref()) {
        Ok(output) => return spawn_sequencer(output, events, Some(speaker), rx),
        Err(e) => warn!("audio output unavailable, continuing without sound: {e}"),
    }

    spawn_sequencer(
        NullOutput::new(defaults::PCM_SAMPLE_RATE),
        events,
        Some(speaker),
        rx,
    )
}

/// Forward events to the terminal and to IPC followers until stopped.
fn spawn_printer(
    rx: Receiver<PipelineEvent>,
    followers: broadcast::Sender<PipelineEvent>,
    render: bool,
    stop: Arc<AtomicBool>,
) -> Result<std::thread::JoinHandle<()>> {
    let forward = move |event: PipelineEvent| {
        if render {
            render_event(&event);
        }
        // no followers connected is the normal case
        followers.send(event).ok();
    };
    let handle = std::thread::Builder::new()
        .name("aura-events".to_string())
        .spawn(move || {
            loop {
                match rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(event) => forward(event),
                    Err(RecvTimeoutError::Timeout) => {
                        if stop.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            while let Ok(event) = rx.try_recv() {
                forward(event);
            }
        })?;
    Ok(handle)
}

fn spawn_ingest(
    source: ChatSource,
    intake: ChatIntake,
    shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    match source {
        ChatSource::Detached => None,
        ChatSource::Stdin => Some(tokio::spawn(async move {
            info!("reading chat from stdin");
            if let Err(e) = crate::chat::stdin::run_stdin(intake).await {
                error!("stdin chat failed: {e}");
            }
        })),
        #[cfg(feature = "twitch")]
        ChatSource::Twitch(channel) => Some(tokio::spawn(async move {
            let chat = crate::chat::twitch::TwitchChat::new(channel);
            if let Err(e) = chat.run(intake, shutdown).await {
                error!("twitch chat failed: {e}");
            }
        })),
        #[cfg(not(feature = "twitch"))]
        ChatSource::Twitch(channel) => {
            drop(shutdown);
            warn!(%channel, "built without twitch support; no chat will arrive");
            drop(intake);
            None
        }
    }
}

/// Wait for Ctrl-C or SIGTERM.
pub async fn wait_for_signal() {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to wait for Ctrl+C: {e}");
            }
            info!("received SIGINT");
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                error!("Error setting up signal handler: {e}");
            }
            info!("received SIGTERM");
        }
    }
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| AuraError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}

/// Run in the foreground until interrupted.
pub async fn run_foreground(config: Config, options: CompanionOptions) -> Result<()> {
    let render = options.render;
    let companion = Companion::start(config, options)?;
    let control = companion.control();
    if render {
        eprintln!("Aura is listening. Press Ctrl+C to stop.");
    }

    tokio::select! {
        _ = wait_for_signal() => {}
        _ = control.wait_shutdown() => {}
    }

    if render {
        eprintln!("\nShutting down...");
    }
    companion.shutdown().await;
    Ok(())
}

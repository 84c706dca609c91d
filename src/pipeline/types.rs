//! Observable data types for the response pipeline.

use crate::audio::item::AudioRef;
use crate::chat::event::{ChatEvent, ConnectionStatus};
use crate::pipeline::cooldown::CooldownView;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Text generation state of a [`ResponseRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStatus {
    Pending,
    Processing,
    Done,
    Error,
}

/// Speech synthesis state. Only exists once text is `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceStatus {
    Pending,
    Done,
    Error,
}

/// One reply as it moves through generation and synthesis.
///
/// Transition methods return `false` and leave the record untouched when
/// called from the wrong state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: String,
    /// Display name of the chatter.
    pub user: String,
    pub message: String,
    pub reply: String,
    pub text_status: TextStatus,
    pub voice_status: Option<VoiceStatus>,
    /// Provider currently being attempted; after success, the one that answered.
    pub text_provider: Option<String>,
    pub voice_provider: Option<String>,
    /// Text providers in the order they were tried.
    pub attempted: Vec<String>,
    pub audio: Option<AudioRef>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ResponseRecord {
    /// Record for a freshly dequeued event, in `Pending`.
    pub fn from_event(event: &ChatEvent) -> Self {
        Self {
            id: event.id.clone(),
            user: event.display_name.clone(),
            message: event.message.clone(),
            reply: String::new(),
            text_status: TextStatus::Pending,
            voice_status: None,
            text_provider: None,
            voice_provider: None,
            attempted: Vec::new(),
            audio: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn begin(&mut self) -> bool {
        if self.text_status != TextStatus::Pending {
            return false;
        }
        self.text_status = TextStatus::Processing;
        true
    }

    /// Marks `provider` as the one in flight.
    pub fn attempting(&mut self, provider: &str) -> bool {
        if self.text_status != TextStatus::Processing {
            return false;
        }
        self.text_provider = Some(provider.to_string());
        self.attempted.push(provider.to_string());
        true
    }

    pub fn complete_text(&mut self, reply: String, provider: &str) -> bool {
        if self.text_status != TextStatus::Processing {
            return false;
        }
        self.reply = reply;
        self.text_provider = Some(provider.to_string());
        self.text_status = TextStatus::Done;
        self.voice_status = Some(VoiceStatus::Pending);
        true
    }

    /// Terminal text failure; `message` is shown in place of the reply.
    pub fn fail_text(&mut self, message: String) -> bool {
        if self.text_status != TextStatus::Processing {
            return false;
        }
        self.reply = message.clone();
        self.error = Some(message);
        self.text_status = TextStatus::Error;
        true
    }

    pub fn complete_voice(&mut self, provider: &str, audio: Option<AudioRef>) -> bool {
        if self.voice_status != Some(VoiceStatus::Pending) {
            return false;
        }
        self.voice_provider = Some(provider.to_string());
        self.audio = audio;
        self.voice_status = Some(VoiceStatus::Done);
        true
    }

    /// Speech is turned off: the record ends at text `Done` with no voice state.
    pub fn skip_voice(&mut self) -> bool {
        if self.voice_status != Some(VoiceStatus::Pending) {
            return false;
        }
        self.voice_status = None;
        true
    }

    /// Voice failure keeps the text reply intact.
    pub fn fail_voice(&mut self, provider: &str, message: String) -> bool {
        if self.voice_status != Some(VoiceStatus::Pending) {
            return false;
        }
        self.voice_provider = Some(provider.to_string());
        self.error = Some(message);
        self.voice_status = Some(VoiceStatus::Error);
        true
    }
}

/// Most-recent-N ring of records, newest first.
#[derive(Debug, Clone)]
pub struct ResponseLog {
    capacity: usize,
    records: VecDeque<ResponseRecord>,
}

impl ResponseLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Adds a record at the front, evicting the oldest past capacity.
    pub fn push(&mut self, record: ResponseRecord) {
        self.records.push_front(record);
        while self.records.len() > self.capacity {
            self.records.pop_back();
        }
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ResponseRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&ResponseRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ResponseRecord> {
        self.records.iter().cloned().collect()
    }
}

/// Read-only view published by the pipeline after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub responses: Vec<ResponseRecord>,
    pub queue_len: usize,
    pub cooldown: CooldownView,
    pub in_flight: bool,
    pub feed_paused: bool,
    pub ai_paused: bool,
}

impl PipelineSnapshot {
    /// Records whose text is being generated. Never more than one.
    pub fn processing_count(&self) -> usize {
        self.responses
            .iter()
            .filter(|r| r.text_status == TextStatus::Processing)
            .count()
    }
}

/// Events rendered by the terminal and streamed to IPC followers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A chat line reached the display log.
    Chat { event: ChatEvent, queued: bool },
    Connection { status: ConnectionStatus },
    /// Backlog discarded by collapse or lockout.
    QueueDropped { dropped: usize, reason: String },
    Response { record: ResponseRecord },
    LockoutStarted { secs: u64 },
    LockoutCleared,
    AudioStarted { response_id: Option<String> },
    AudioFinished { response_id: Option<String> },
    AudioSkipped {
        response_id: Option<String>,
        reason: String,
    },
    Notice { message: String },
}

/// Non-blocking event sender. Drops events when nobody is listening or the
/// channel is full; the pipeline never waits on presentation.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<crossbeam_channel::Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: crossbeam_channel::Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that discards everything.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx
            && tx.try_send(event).is_err()
        {
            tracing::trace!("event channel full or closed");
        }
    }
}

/// External pause gates. Advisory: checked before work starts, never used to
/// interrupt an attempt already in flight.
#[derive(Debug, Clone, Default)]
pub struct PipelineControls {
    feed_paused: Arc<AtomicBool>,
    ai_paused: Arc<AtomicBool>,
}

impl PipelineControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_feed_paused(&self, paused: bool) {
        self.feed_paused.store(paused, Ordering::SeqCst);
    }

    pub fn set_ai_paused(&self, paused: bool) {
        self.ai_paused.store(paused, Ordering::SeqCst);
    }

    pub fn feed_paused(&self) -> bool {
        self.feed_paused.load(Ordering::SeqCst)
    }

    pub fn ai_paused(&self) -> bool {
        self.ai_paused.load(Ordering::SeqCst)
    }

    /// True if either gate is closed.
    pub fn any_paused(&self) -> bool {
        self.feed_paused() || self.ai_paused()
    }
}

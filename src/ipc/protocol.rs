//! JSON message protocol between the CLI and a running companion.

use crate::chat::event::{ChatEvent, ConnectionStatus};
use crate::pipeline::types::{PipelineEvent, ResponseRecord};
use serde::{Deserialize, Serialize};

/// Commands sent by the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get a summary of the pipeline state
    Status,
    /// Get the recent response records, newest first
    Responses,
    /// Get the recent chat lines, oldest first
    Chat {
        /// Only the newest `limit` lines
        #[serde(default)]
        limit: Option<usize>,
    },
    /// Stop accepting chat and dequeuing
    PauseFeed,
    ResumeFeed,
    /// Stop starting new generations
    PauseAi,
    ResumeAi,
    SetAutoReply { enabled: bool },
    Ignore { user: String },
    Unignore { user: String },
    SetCooldown { secs: u64 },
    /// Voice name handed to the speech target
    SetVoice { voice: String },
    SetPersonality { text: String },
    /// Ring position where rotation starts
    SetPreferred { provider: String },
    /// Stream pipeline events until the connection closes
    Follow,
    /// Shutdown the daemon
    Shutdown,
}

impl Command {
    /// Serialize command to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize command from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Pipeline summary returned by `status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub connection: ConnectionStatus,
    pub queue_len: usize,
    pub in_flight: bool,
    pub locked: bool,
    pub lockout_remaining_secs: u64,
    pub cooldown_remaining_secs: u64,
    pub cooldown_secs: u64,
    pub feed_paused: bool,
    pub ai_paused: bool,
    pub auto_reply: bool,
    pub preferred_text: String,
    pub voice_provider: Option<String>,
    pub ignored_users: Vec<String>,
    #[serde(default)]
    pub voice: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub daemon_version: String,
}

/// Responses sent by the daemon to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Command succeeded
    Ok { message: String },
    Status {
        #[serde(flatten)]
        report: StatusReport,
    },
    Responses { records: Vec<ResponseRecord> },
    Chat { messages: Vec<ChatEvent> },
    /// One streamed event (after `follow`)
    Event { event: PipelineEvent },
    /// Error occurred
    Error { message: String },
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Response::Ok {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    /// Serialize response to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

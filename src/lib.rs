//! aura - Live chat companion
//!
//! Reads stream chat, writes short in-character replies with a rotating set
//! of LLM providers, voices them through TTS and plays them back in order.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod chat;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod defaults;
pub mod error;
pub mod ipc;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod provider;

// Composition root - needs everything
pub mod app;

// Core traits (chat → text → voice → playback)
pub use audio::output::AudioOutput;
pub use audio::speech::Speaker;
pub use clock::Clock;
pub use provider::text::TextGenerator;
pub use provider::voice::SpeechSynthesizer;

// Pipeline
pub use pipeline::orchestrator::{PipelineConfig, PipelineHandle, ResponsePipeline};
pub use pipeline::types::{PipelineEvent, ResponseRecord, TextStatus, VoiceStatus};

// Chat intake
pub use chat::{Admission, ChatEvent, ChatIntake};

// Error handling
pub use error::{AuraError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

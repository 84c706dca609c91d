//! Response pipeline: one worker that turns queued chat into spoken replies.
//!
//! Chat admission pushes onto a collapsing queue; the worker dequeues under
//! the cooldown governor, runs text failover, then voice dispatch, and sends
//! the audio to the sequencer thread over a bounded crossbeam channel.

pub mod cooldown;
pub mod orchestrator;
pub mod types;

pub use cooldown::{CooldownGovernor, CooldownView, Refusal};
pub use orchestrator::{PipelineConfig, PipelineHandle, ResponsePipeline};
pub use types::{
    EventSink, PipelineControls, PipelineEvent, PipelineSnapshot, ResponseLog, ResponseRecord,
    TextStatus, VoiceStatus,
};

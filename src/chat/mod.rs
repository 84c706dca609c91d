//! Chat ingestion: parsed events, the pending queue and the admission filter.
//!
//! Transports (Twitch, stdin) only produce [`ChatEvent`]s and connection
//! statuses; everything after that is transport-agnostic.

pub mod admission;
pub mod event;
pub mod queue;
pub mod stdin;
#[cfg(feature = "twitch")]
pub mod twitch;

pub use admission::{Admission, ChatIntake, ChatLog};
pub use event::{ChatEvent, ConnectionStatus};
pub use queue::{PendingQueue, SharedQueue};

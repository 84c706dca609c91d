//! Audio items, decoding and ordered playback.

#[cfg(feature = "cpal-audio")]
pub mod cpal_output;
pub mod decode;
pub mod item;
pub mod output;
pub mod sequencer;
pub mod speech;

pub use item::{AudioEncoding, AudioItem, AudioRef};
pub use output::{AudioOutput, NullOutput};
pub use sequencer::AudioSequencer;
pub use speech::{CommandExecutor, LocalSpeaker, Speaker, SystemCommandExecutor};

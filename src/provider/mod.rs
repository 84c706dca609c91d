//! Text and speech providers.
//!
//! Adapters classify every failure into a [`ProviderErrorKind`]; the
//! failover layer above them never inspects raw HTTP.

pub mod error;
pub mod failover;
pub mod gemini;
pub mod local;
pub mod openai;
pub mod registry;
pub mod ring;
pub mod text;
pub mod voice;

pub use error::{ProviderError, ProviderErrorKind};
pub use failover::{FailoverError, TextFailover, TextSuccess, VoiceDispatch};
pub use registry::{build_text_failover, build_voice_dispatch};
pub use ring::ProviderRing;
pub use text::{MockTextGenerator, TextGenerator};
pub use voice::{MockSynthesizer, SpeechSynthesizer};

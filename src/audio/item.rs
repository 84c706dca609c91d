//! Playable audio units handed from the pipeline to the sequencer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How an [`AudioItem`]'s payload must be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioEncoding {
    /// Interleaved signed 16-bit little-endian samples.
    Pcm { sample_rate: u32, channels: u16 },
    /// Container or codec bytes (WAV, MP3); `format` is a probe hint such as `"mp3"`.
    Compressed { format: Option<String> },
    /// No payload: the local speech capability speaks `text` itself.
    Delegate,
}

impl AudioEncoding {
    pub fn label(&self) -> &'static str {
        match self {
            AudioEncoding::Pcm { .. } => "pcm",
            AudioEncoding::Compressed { .. } => "compressed",
            AudioEncoding::Delegate => "delegate",
        }
    }
}

/// One playable unit. Ownership moves to the sequencer on enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioItem {
    /// Record this audio belongs to, for observers.
    pub response_id: Option<String>,
    pub encoding: AudioEncoding,
    pub payload: Bytes,
    /// Text for delegate items.
    pub text: Option<String>,
    pub voice: Option<String>,
}

impl AudioItem {
    pub fn pcm(payload: impl Into<Bytes>, sample_rate: u32, channels: u16) -> Self {
        Self {
            response_id: None,
            encoding: AudioEncoding::Pcm {
                sample_rate,
                channels,
            },
            payload: payload.into(),
            text: None,
            voice: None,
        }
    }

    pub fn compressed(payload: impl Into<Bytes>, format: Option<&str>) -> Self {
        Self {
            response_id: None,
            encoding: AudioEncoding::Compressed {
                format: format.map(str::to_string),
            },
            payload: payload.into(),
            text: None,
            voice: None,
        }
    }

    pub fn delegate(text: impl Into<String>) -> Self {
        Self {
            response_id: None,
            encoding: AudioEncoding::Delegate,
            payload: Bytes::new(),
            text: Some(text.into()),
            voice: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_response_id(mut self, id: impl Into<String>) -> Self {
        self.response_id = Some(id.into());
        self
    }

    /// Playback length for raw PCM; `None` for other encodings.
    pub fn pcm_duration(&self) -> Option<Duration> {
        match self.encoding {
            AudioEncoding::Pcm {
                sample_rate,
                channels,
            } if sample_rate > 0 && channels > 0 => {
                let frames = self.payload.len() as u64 / (2 * u64::from(channels));
                Some(Duration::from_secs_f64(frames as f64 / f64::from(sample_rate)))
            }
            _ => None,
        }
    }

    pub fn summary(&self) -> AudioRef {
        AudioRef {
            encoding: self.encoding.clone(),
            bytes: self.payload.len(),
            voice: self.voice.clone(),
        }
    }
}

/// Lightweight description of an item kept on the response record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef {
    pub encoding: AudioEncoding,
    pub bytes: usize,
    pub voice: Option<String>,
}

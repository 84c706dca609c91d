//! Playback capability used by the sequencer.
//!
//! Times are positions on the output clock, measured from when the output
//! was opened.

use crate::audio::decode::DecodedClip;
use crate::error::Result;
#[cfg(test)]
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait AudioOutput: Send {
    /// Output layout; clips must be conformed to it before scheduling.
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;

    /// Current position of the output clock.
    fn now(&self) -> Duration;

    /// Queue `clip` to start at `at`. Returns the clip's end time.
    fn schedule(&mut self, clip: DecodedClip, at: Duration) -> Result<Duration>;

    /// Block until the output clock reaches `at`.
    fn wait_until(&self, at: Duration);
}

/// Clock-only output that discards audio. Used with `--no-audio` and when
/// no device can be opened.
#[derive(Debug)]
pub struct NullOutput {
    origin: Instant,
    sample_rate: u32,
}

impl NullOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            origin: Instant::now(),
            sample_rate,
        }
    }
}

impl AudioOutput for NullOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        1
    }

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn schedule(&mut self, clip: DecodedClip, at: Duration) -> Result<Duration> {
        Ok(at + clip.duration())
    }

    fn wait_until(&self, at: Duration) {
        let now = self.now();
        if at > now {
            std::thread::sleep(at - now);
        }
    }
}

/// One clip as seen by a [`VirtualOutput`].
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledClip {
    pub start: Duration,
    pub end: Duration,
    pub frames: usize,
}

#[cfg(test)]
#[derive(Debug, Default)]
struct VirtualState {
    clock: Duration,
    scheduled: Vec<ScheduledClip>,
}

/// Output with a virtual clock that only moves when waited on.
///
/// Clones share state, so a test can keep one handle while the sequencer owns another.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct VirtualOutput {
    sample_rate: u32,
    channels: u16,
    state: Arc<Mutex<VirtualState>>,
}

#[cfg(test)]
impl VirtualOutput {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            state: Arc::new(Mutex::new(VirtualState::default())),
        }
    }

    /// Move the clock forward, as if the device kept rendering.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.clock += by;
        }
    }

    pub fn scheduled(&self) -> Vec<ScheduledClip> {
        self.state
            .lock()
            .map(|s| s.scheduled.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl AudioOutput for VirtualOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn now(&self) -> Duration {
        self.state.lock().map(|s| s.clock).unwrap_or_default()
    }

    fn schedule(&mut self, clip: DecodedClip, at: Duration) -> Result<Duration> {
        let end = at + clip.duration();
        if let Ok(mut state) = self.state.lock() {
            state.scheduled.push(ScheduledClip {
                start: at,
                end,
                frames: clip.frames(),
            });
        }
        Ok(end)
    }

    fn wait_until(&self, at: Duration) {
        if let Ok(mut state) = self.state.lock()
            && state.clock < at
        {
            state.clock = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(ms: u64) -> DecodedClip {
        DecodedClip {
            samples: vec![0.0; (ms * 48) as usize],
            sample_rate: 48_000,
            channels: 1,
        }
    }

    #[test]
    fn null_output_end_is_start_plus_duration() {
        let mut out = NullOutput::new(48_000);
        let end = out.schedule(clip(250), Duration::from_secs(1)).unwrap();
        assert_eq!(end, Duration::from_millis(1250));
    }

    #[test]
    fn null_output_clock_moves_in_real_time() {
        let out = NullOutput::new(48_000);
        let target = out.now() + Duration::from_millis(20);
        out.wait_until(target);
        assert!(out.now() >= target);
    }

    #[test]
    fn virtual_clock_jumps_on_wait() {
        let mut out = VirtualOutput::new(48_000, 1);
        let observer = out.clone();
        assert_eq!(out.now(), Duration::ZERO);

        let end = out.schedule(clip(500), Duration::ZERO).unwrap();
        out.wait_until(end);
        assert_eq!(observer.now(), Duration::from_millis(500));

        // waiting for the past never rewinds
        out.wait_until(Duration::from_millis(100));
        assert_eq!(out.now(), Duration::from_millis(500));
        assert_eq!(observer.scheduled().len(), 1);
    }
}

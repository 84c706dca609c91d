//! Speaker output using CPAL (Cross-Platform Audio Library).
//!
//! A small mixer renders scheduled clips at frame positions; the output clock
//! is the number of frames the device has pulled.

use crate::audio::decode::DecodedClip;
use crate::audio::output::AudioOutput;
use crate::error::{AuraError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// CPAL backend probing prints harmless ALSA/JACK noise.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` on fd 2. Safe as long as no other thread is
/// concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Keep JACK and PipeWire quiet while CPAL probes backends.
///
/// # Safety
/// Modifies environment variables; call at startup before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: called from main before the runtime starts worker threads
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Sinks that follow the desktop's routing.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Per-speaker ALSA aliases that are not useful as a whole output.
const FILTERED_PATTERNS: &[&str] = &["surround", "front:", "rear:", "center:", "side:"];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

fn device_name(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|d| d.name().to_owned())
}

/// List output devices, marking desktop sinks as "\[recommended\]".
pub fn list_output_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| cpal::default_host().output_devices());
    let devices = devices.map_err(|e| AuraError::AudioOutput {
        message: format!("Failed to enumerate output devices: {e}"),
    })?;

    let mut names = Vec::new();
    for device in devices {
        let Some(name) = device_name(&device) else {
            continue;
        };
        if should_filter_device(&name) {
            continue;
        }
        if is_preferred_device(&name) {
            names.push(format!("{name} [recommended]"));
        } else {
            names.push(name);
        }
    }
    Ok(names)
}

fn find_device(name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        match name.filter(|n| !n.is_empty()) {
            Some(name) => {
                let wanted = name.trim_end_matches(" [recommended]");
                host.output_devices()
                    .map_err(|e| AuraError::AudioOutput {
                        message: format!("Failed to enumerate output devices: {e}"),
                    })?
                    .find(|d| device_name(d).as_deref() == Some(wanted))
                    .ok_or_else(|| AuraError::AudioDeviceNotFound {
                        device: name.to_string(),
                    })
            }
            None => host
                .default_output_device()
                .ok_or_else(|| AuraError::AudioDeviceNotFound {
                    device: "default".to_string(),
                }),
        }
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is created, kept and dropped by the sequencer thread
/// that owns the `CpalOutput`; it is never touched concurrently.
struct SendableStream(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for SendableStream {}

struct MixClip {
    start_frame: u64,
    samples: Vec<f32>,
}

impl MixClip {
    fn end_frame(&self, channels: usize) -> u64 {
        self.start_frame + (self.samples.len() / channels) as u64
    }
}

/// Frame-addressed clip mixer shared with the device callback.
struct Mixer {
    channels: usize,
    clips: VecDeque<MixClip>,
}

impl Mixer {
    /// Fill `data` with frames starting at `first_frame`.
    fn render(&mut self, data: &mut [f32], first_frame: u64) {
        data.fill(0.0);
        let channels = self.channels;
        let frames = (data.len() / channels) as u64;
        let last_frame = first_frame + frames;

        for clip in &self.clips {
            let clip_end = clip.end_frame(channels);
            if clip.start_frame >= last_frame || clip_end <= first_frame {
                continue;
            }
            let from = clip.start_frame.max(first_frame);
            let to = clip_end.min(last_frame);
            for frame in from..to {
                let out = ((frame - first_frame) as usize) * channels;
                let src = ((frame - clip.start_frame) as usize) * channels;
                for ch in 0..channels {
                    data[out + ch] += clip.samples[src + ch];
                }
            }
        }
        for s in data.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }

        self.clips.retain(|c| c.end_frame(channels) > last_frame);
    }
}

/// Output device with a sample-accurate clock.
pub struct CpalOutput {
    _stream: SendableStream,
    mixer: Arc<Mutex<Mixer>>,
    rendered: Arc<AtomicU64>,
    sample_rate: u32,
    channels: u16,
}

impl CpalOutput {
    /// Open `device_name`, or the system default when `None`/empty.
    pub fn open(device_name: Option<&str>) -> Result<Self> {
        let device = find_device(device_name)?;
        let supported = device
            .default_output_config()
            .map_err(|e| AuraError::AudioOutput {
                message: format!("No usable output config: {e}"),
            })?;
        let sample_rate = supported.sample_rate();
        let channels = supported.channels();
        info!(
            device = %device_name(&device).unwrap_or_else(|| "<unknown>".into()),
            sample_rate, channels, "opening audio output"
        );

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let mixer = Arc::new(Mutex::new(Mixer {
            channels: usize::from(channels.max(1)),
            clips: VecDeque::new(),
        }));
        let rendered = Arc::new(AtomicU64::new(0));

        let cb_mixer = Arc::clone(&mixer);
        let cb_rendered = Arc::clone(&rendered);
        let frame_width = usize::from(channels.max(1));
        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let first = cb_rendered.load(Ordering::Acquire);
                    match cb_mixer.lock() {
                        Ok(mut mixer) => mixer.render(data, first),
                        Err(_) => data.fill(0.0),
                    }
                    cb_rendered.fetch_add((data.len() / frame_width) as u64, Ordering::Release);
                },
                move |err| {
                    error!("audio output stream error: {err}");
                },
                None,
            )
            .map_err(|e| AuraError::AudioOutput {
                message: format!("Failed to build output stream: {e}"),
            })?;

        stream.play().map_err(|e| AuraError::AudioOutput {
            message: format!("Failed to start output stream: {e}"),
        })?;

        Ok(Self {
            _stream: SendableStream(stream),
            mixer,
            rendered,
            sample_rate,
            channels,
        })
    }

    fn frame_at(&self, at: Duration) -> u64 {
        (at.as_secs_f64() * f64::from(self.sample_rate)).round() as u64
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn now(&self) -> Duration {
        let frames = self.rendered.load(Ordering::Acquire);
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate.max(1)))
    }

    fn schedule(&mut self, clip: DecodedClip, at: Duration) -> Result<Duration> {
        let clip = clip.conform(self.sample_rate, self.channels);
        let end = at + clip.duration();
        // never schedule behind the playhead; late clips start immediately
        let start_frame = self
            .frame_at(at)
            .max(self.rendered.load(Ordering::Acquire));
        let mut mixer = self.mixer.lock().map_err(|_| AuraError::AudioOutput {
            message: "mixer lock poisoned".to_string(),
        })?;
        mixer.clips.push_back(MixClip {
            start_frame,
            samples: clip.samples,
        });
        Ok(end)
    }

    fn wait_until(&self, at: Duration) {
        while self.now() < at {
            let remaining = at.saturating_sub(self.now());
            std::thread::sleep(remaining.min(Duration::from_millis(10)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51:CARD=PCH"));
        assert!(should_filter_device("front:CARD=PCH,DEV=0"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("default"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PulseAudio Sound Server"));
        assert!(!is_preferred_device("hw:CARD=PCH"));
    }

    fn mixer(channels: usize) -> Mixer {
        Mixer {
            channels,
            clips: VecDeque::new(),
        }
    }

    #[test]
    fn mixer_renders_clip_at_its_frame() {
        let mut m = mixer(1);
        m.clips.push_back(MixClip {
            start_frame: 2,
            samples: vec![0.5, 0.5, 0.5],
        });

        let mut data = [1.0f32; 4];
        m.render(&mut data, 0);
        assert_eq!(data, [0.0, 0.0, 0.5, 0.5]);

        let mut data = [1.0f32; 4];
        m.render(&mut data, 4);
        assert_eq!(data, [0.5, 0.0, 0.0, 0.0]);
        assert!(m.clips.is_empty());
    }

    #[test]
    fn mixer_sums_and_clamps() {
        let mut m = mixer(2);
        m.clips.push_back(MixClip {
            start_frame: 0,
            samples: vec![0.75, -0.75],
        });
        m.clips.push_back(MixClip {
            start_frame: 0,
            samples: vec![0.75, 0.25],
        });

        let mut data = [0.0f32; 2];
        m.render(&mut data, 0);
        assert_eq!(data, [1.0, -0.5]);
    }

    #[test]
    fn mixer_keeps_clips_that_start_later() {
        let mut m = mixer(1);
        m.clips.push_back(MixClip {
            start_frame: 100,
            samples: vec![0.1; 10],
        });
        let mut data = [0.0f32; 8];
        m.render(&mut data, 0);
        assert_eq!(m.clips.len(), 1);
    }
}

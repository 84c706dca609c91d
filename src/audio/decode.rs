//! Turn [`AudioItem`] payloads into float samples in the output layout.

use crate::audio::item::{AudioEncoding, AudioItem};
use crate::error::{AuraError, Result};
use bytes::Bytes;
use std::io::Cursor;
use std::time::Duration;

/// Interleaved f32 samples with their layout.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedClip {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Remix and resample to the given output layout.
    pub fn conform(self, sample_rate: u32, channels: u16) -> Self {
        let remixed = remix(&self.samples, self.channels, channels);
        let samples = resample(&remixed, channels, self.sample_rate, sample_rate);
        Self {
            samples,
            sample_rate,
            channels,
        }
    }
}

fn decode_error(message: impl Into<String>) -> AuraError {
    AuraError::AudioDecode {
        message: message.into(),
    }
}

/// Decode anything with a payload. Delegate items have none and are an error here.
pub fn decode_item(item: &AudioItem) -> Result<DecodedClip> {
    match &item.encoding {
        AudioEncoding::Pcm {
            sample_rate,
            channels,
        } => {
            if *sample_rate == 0 || *channels == 0 {
                return Err(decode_error("PCM item has zero rate or channels"));
            }
            if item.payload.is_empty() {
                return Err(decode_error("PCM item has no samples"));
            }
            Ok(DecodedClip {
                samples: pcm_s16le_to_f32(&item.payload),
                sample_rate: *sample_rate,
                channels: *channels,
            })
        }
        AudioEncoding::Compressed { format } => {
            decode_compressed(item.payload.clone(), format.as_deref())
        }
        AudioEncoding::Delegate => Err(decode_error("delegate items carry no audio")),
    }
}

/// Little-endian signed 16-bit samples to f32 in `[-1, 1)`. A trailing odd byte is ignored.
pub fn pcm_s16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect()
}

/// Decode container or codec bytes. WAV goes through hound, everything else through symphonia.
pub fn decode_compressed(payload: Bytes, hint: Option<&str>) -> Result<DecodedClip> {
    if payload.is_empty() {
        return Err(decode_error("empty audio payload"));
    }
    if payload.starts_with(b"RIFF") {
        return decode_wav(&payload);
    }
    decode_with_symphonia(payload, hint)
}

pub fn decode_wav(bytes: &[u8]) -> Result<DecodedClip> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| decode_error(format!("Failed to parse WAV data: {e}")))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| decode_error(format!("Failed to read WAV samples: {e}")))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| decode_error(format!("Failed to read WAV samples: {e}")))?
        }
    };

    Ok(DecodedClip {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

fn decode_with_symphonia(payload: Bytes, hint_ext: Option<&str>) -> Result<DecodedClip> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let mss = MediaSourceStream::new(Box::new(Cursor::new(payload)), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = hint_ext {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error(format!("failed to probe audio: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| decode_error("no default audio track"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(format!("failed to create decoder: {e}")))?;

    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channels = codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);
    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(decode_error(format!("audio read error: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(decode_error(format!("audio decode error: {e}"))),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;
        let frames = decoded.frames() as u64;
        let required = decoded.frames().saturating_mul(spec.channels.count());

        match sample_buf.as_mut() {
            Some(b) if b.capacity() >= required => b.clear(),
            _ => sample_buf = Some(SampleBuffer::<f32>::new(frames, spec)),
        }
        if let Some(b) = sample_buf.as_mut() {
            b.copy_interleaved_ref(decoded);
            samples.extend_from_slice(b.samples());
        }
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(decode_error("no audio decoded"));
    }
    Ok(DecodedClip {
        samples,
        sample_rate,
        channels,
    })
}

/// Convert interleaved samples between channel counts.
///
/// Downmix averages; upmix from mono copies; other upmixes repeat the last channel.
pub fn remix(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }
    let from = usize::from(from);
    let to = usize::from(to);
    let mut out = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        if to < from && to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for ch in 0..to {
                out.push(frame[ch.min(from - 1)]);
            }
        }
    }
    out
}

/// Linear interpolation resampling of interleaved samples.
pub fn resample(samples: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || channels == 0 {
        return samples.to_vec();
    }
    let channels = usize::from(channels);
    let frames = samples.len() / channels;
    if frames == 0 {
        return Vec::new();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_frames = (frames as f64 / ratio).ceil() as usize;
    let mut out = Vec::with_capacity(output_frames * channels);

    for i in 0..output_frames {
        let source_pos = i as f64 * ratio;
        let idx = (source_pos.floor() as usize).min(frames - 1);
        let fraction = (source_pos - idx as f64) as f32;
        for ch in 0..channels {
            let left = samples[idx * channels + ch];
            let sample = if idx + 1 >= frames {
                left
            } else {
                let right = samples[(idx + 1) * channels + ch];
                left + (right - left) * fraction
            };
            out.push(sample);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn pcm_bytes_to_float() {
        let bytes = [0x00, 0x00, 0x00, 0x40, 0x00, 0x80, 0x7f];
        let samples = pcm_s16le_to_f32(&bytes);
        assert_eq!(samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn pcm_item_decodes_with_layout() {
        let item = AudioItem::pcm(vec![0u8; 48_000], 24_000, 1);
        let clip = decode_item(&item).unwrap();
        assert_eq!(clip.frames(), 24_000);
        assert_eq!(clip.duration(), Duration::from_secs(1));
    }

    #[test]
    fn empty_pcm_is_an_error() {
        let item = AudioItem::pcm(Vec::<u8>::new(), 24_000, 1);
        assert!(decode_item(&item).is_err());
    }

    #[test]
    fn delegate_cannot_be_decoded() {
        assert!(decode_item(&AudioItem::delegate("hi")).is_err());
    }

    #[test]
    fn wav_payload_goes_through_hound() {
        let wav = make_wav_data(16_000, 2, &[16384, -16384, 0, 0]);
        let item = AudioItem::compressed(wav, Some("wav"));
        let clip = decode_item(&item).unwrap();
        assert_eq!(clip.sample_rate, 16_000);
        assert_eq!(clip.channels, 2);
        assert_eq!(clip.samples, vec![0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn garbage_compressed_payload_is_an_error() {
        let item = AudioItem::compressed(vec![1u8, 2, 3, 4, 5, 6, 7, 8], Some("mp3"));
        assert!(decode_item(&item).is_err());
    }

    #[test]
    fn remix_mono_to_stereo_and_back() {
        let stereo = remix(&[0.25, 0.5], 1, 2);
        assert_eq!(stereo, vec![0.25, 0.25, 0.5, 0.5]);
        assert_eq!(remix(&[0.25, 0.75, 1.0, 0.0], 2, 1), vec![0.5, 0.5]);
    }

    #[test]
    fn resample_changes_frame_count() {
        let input = vec![0.0f32; 24_000];
        assert_eq!(resample(&input, 1, 24_000, 48_000).len(), 48_000);
        assert_eq!(resample(&input, 1, 24_000, 12_000).len(), 12_000);
    }

    #[test]
    fn resample_interpolates_per_channel() {
        // two stereo frames: L ramps 0 -> 1, R stays at -1
        let input = [0.0, -1.0, 1.0, -1.0];
        let out = resample(&input, 2, 1, 2);
        assert_eq!(out.len(), 8);
        assert_eq!(&out[..4], &[0.0, -1.0, 0.5, -1.0]);
        assert!(out.chunks_exact(2).all(|f| f[1] == -1.0));
    }

    #[test]
    fn conform_to_output_layout() {
        let clip = DecodedClip {
            samples: vec![0.1; 2_400],
            sample_rate: 24_000,
            channels: 1,
        };
        let out = clip.conform(48_000, 2);
        assert_eq!(out.frames(), 4_800);
        assert_eq!(out.samples.len(), 9_600);
        assert_eq!(out.duration(), Duration::from_millis(100));
    }
}

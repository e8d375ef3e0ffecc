//! PCM16 audio decoding and WAV container encoding.
//!
//! Speech comes back from the service as base64 signed 16-bit little-endian
//! interleaved samples. [`decode_pcm16`] turns those bytes into normalized
//! per-channel samples for playback; [`encode_wav`] wraps the very same bytes
//! in a canonical 44-byte RIFF/WAVE header for download. The two never share
//! buffers.

use crate::{Error, Result};
use base64::Engine as _;
use std::time::Duration;

/// Sample rate of generated speech.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

pub const WAV_HEADER_LEN: usize = 44;

const BYTES_PER_SAMPLE: u16 = 2;
const BITS_PER_SAMPLE: u16 = 16;
const PCM_FORMAT_TAG: u16 = 1;

/// Decoded, playable audio.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableAudio {
    pub sample_rate: u32,
    pub channel_count: u16,
    /// One sample sequence per channel, each in `[-1.0, 1.0)`.
    pub channels: Vec<Vec<f32>>,
}

impl PlayableAudio {
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }
}

/// Playable and downloadable forms of the same audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioArtifact {
    pub playable: PlayableAudio,
    pub container_bytes: Vec<u8>,
}

impl AudioArtifact {
    /// Build both forms from raw PCM16 bytes.
    pub fn from_pcm16(bytes: &[u8], sample_rate: u32, channel_count: u16) -> Result<Self> {
        Ok(Self {
            playable: decode_pcm16(bytes, sample_rate, channel_count)?,
            container_bytes: encode_wav(bytes, sample_rate, channel_count)?,
        })
    }
}

fn check_format(sample_rate: u32, channel_count: u16) -> Result<()> {
    if sample_rate == 0 {
        return Err(Error::AudioGenerationFailed(
            "Sample rate must be positive".to_string(),
        ));
    }
    if !(1..=2).contains(&channel_count) {
        return Err(Error::AudioGenerationFailed(format!(
            "Unsupported channel count: {}",
            channel_count
        )));
    }
    Ok(())
}

/// Interpret `bytes` as interleaved PCM16 LE and split it into channels.
///
/// A trailing incomplete frame is dropped.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channel_count: u16) -> Result<PlayableAudio> {
    check_format(sample_rate, channel_count)?;

    let channel_count_usize = usize::from(channel_count);
    let frame_len = usize::from(BYTES_PER_SAMPLE) * channel_count_usize;
    let remainder = bytes.len() % frame_len;
    if remainder != 0 {
        tracing::warn!(
            "PCM buffer of {} bytes ends with a partial frame; dropping {} bytes",
            bytes.len(),
            remainder
        );
    }

    let frames = bytes.len() / frame_len;
    let mut channels = vec![Vec::with_capacity(frames); channel_count_usize];
    for frame in bytes.chunks_exact(frame_len) {
        for (channel, sample) in channels.iter_mut().zip(frame.chunks_exact(2)) {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            channel.push(f32::from(value) / 32768.0);
        }
    }

    Ok(PlayableAudio {
        sample_rate,
        channel_count,
        channels,
    })
}

/// Wrap raw PCM16 bytes in a canonical 44-byte WAV header.
pub fn encode_wav(bytes: &[u8], sample_rate: u32, channel_count: u16) -> Result<Vec<u8>> {
    check_format(sample_rate, channel_count)?;

    let data_len = u32::try_from(bytes.len()).map_err(|_| {
        Error::AudioGenerationFailed(format!(
            "PCM buffer of {} bytes is too large for a WAV container",
            bytes.len()
        ))
    })?;
    let riff_len = data_len.checked_add(36).ok_or_else(|| {
        Error::AudioGenerationFailed("PCM buffer too large for a WAV container".to_string())
    })?;
    let block_align = channel_count * BYTES_PER_SAMPLE;
    let byte_rate = sample_rate
        .checked_mul(u32::from(block_align))
        .ok_or_else(|| {
            Error::AudioGenerationFailed(format!(
                "Sample rate {} Hz is too high for a WAV container",
                sample_rate
            ))
        })?;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + bytes.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_len.to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&PCM_FORMAT_TAG.to_le_bytes());
    out.extend_from_slice(&channel_count.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(bytes);

    Ok(out)
}

/// Sample rate from a `rate=` MIME parameter such as `audio/L16;codec=pcm;rate=24000`.
pub fn sample_rate_from_mime(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

/// Decode a base64 PCM16 stream into an [`AudioArtifact`].
pub fn decode_base64_pcm16(
    data: &str,
    mime_type: &str,
    channel_count: u16,
) -> Result<AudioArtifact> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| Error::AudioGenerationFailed(format!("Invalid base64 audio: {}", e)))?;
    if bytes.is_empty() {
        return Err(Error::AudioGenerationFailed(
            "Audio payload is empty".to_string(),
        ));
    }

    let sample_rate = sample_rate_from_mime(mime_type).unwrap_or(DEFAULT_SAMPLE_RATE);
    AudioArtifact::from_pcm16(&bytes, sample_rate, channel_count)
}

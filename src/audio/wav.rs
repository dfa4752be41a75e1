//! # WAV Container Synthesis
//!
//! The legacy device uploads bare PCM samples with no container around them,
//! but the inference provider refuses headerless audio. This module builds the
//! standard 44-byte RIFF/WAVE preamble in front of the raw samples so the
//! upload is recognized, and can peel the same preamble back off a synthesis
//! response when the device wants samples it can write straight to its DAC.
//!
//! ## Layout produced by `wrap_pcm`:
//! - **Bytes 0-11**: `RIFF` tag, overall size (36 + data length), `WAVE` tag
//! - **Bytes 12-35**: `fmt ` block (PCM format code, channel count,
//!   sample rate, byte rate, block alignment, bits per sample)
//! - **Bytes 36-43**: `data` tag and data length
//! - **Bytes 44..**: the caller's samples, copied verbatim
//!
//! Every multi-byte field is little-endian. The two length fields are always
//! derived from the payload actually supplied, so they can never disagree
//! with it.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Size of the RIFF/WAVE preamble in bytes.
pub const WAV_HEADER_LEN: usize = 44;

const RIFF_TAG: &[u8; 4] = b"RIFF";
const WAVE_TAG: &[u8; 4] = b"WAVE";
const FMT_TAG: &[u8; 4] = b"fmt ";
const DATA_TAG: &[u8; 4] = b"data";

/// Length of the `fmt ` block for uncompressed PCM.
const FMT_BLOCK_LEN: u32 = 16;

/// Format code for uncompressed linear PCM.
const PCM_FORMAT_CODE: u16 = 1;

/// Out-of-band interpretation parameters for a raw sample buffer.
///
/// A bare PCM buffer carries no self-description at all; the device reports
/// these three values alongside the bytes and they are written into the
/// container header exactly as given. Values outside the plausible range
/// (zero channels, odd bit depths) are encoded as-is; filtering implausible
/// formats is the HTTP layer's job, not this module's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// Samples per second per channel (e.g. 16000)
    pub sample_rate: u32,

    /// Width of one sample in bits (8 or 16 in practice)
    pub bits_per_sample: u16,

    /// Number of interleaved channels (1 = mono)
    pub channels: u16,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, bits_per_sample: u16, channels: u16) -> Self {
        Self {
            sample_rate,
            bits_per_sample,
            channels,
        }
    }

    /// Bytes of audio produced per second of playback.
    ///
    /// Computed in u64 and truncated, so implausible parameter combinations
    /// wrap the same way a 32-bit field write would instead of panicking.
    pub fn byte_rate(&self) -> u32 {
        (u64::from(self.sample_rate) * u64::from(self.channels) * u64::from(self.bits_per_sample) / 8)
            as u32
    }

    /// Bytes occupied by one complete sample frame across all channels.
    pub fn block_align(&self) -> u16 {
        (u32::from(self.channels) * u32::from(self.bits_per_sample) / 8) as u16
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,   // what the device firmware records at
            bits_per_sample: 16,
            channels: 1,
        }
    }
}

/// Wrap raw PCM samples in a 44-byte RIFF/WAVE container header.
///
/// ## Guarantees:
/// - Output length is exactly `44 + payload.len()`, never padded or truncated
/// - The payload is copied verbatim into the tail, never transformed
/// - Pure and deterministic: identical inputs give byte-identical output
///
/// An empty payload is accepted and yields a header-only stream with a data
/// length of zero. Callers that consider empty audio an error (the HTTP
/// handlers do) must reject it before calling this.
pub fn wrap_pcm(payload: &[u8], format: &PcmFormat) -> Vec<u8> {
    let data_len = payload.len() as u32;
    let riff_len = data_len.wrapping_add(36);

    let mut stream = Vec::with_capacity(WAV_HEADER_LEN + payload.len());

    stream.extend_from_slice(RIFF_TAG);
    stream.extend_from_slice(&riff_len.to_le_bytes());
    stream.extend_from_slice(WAVE_TAG);

    stream.extend_from_slice(FMT_TAG);
    stream.extend_from_slice(&FMT_BLOCK_LEN.to_le_bytes());
    stream.extend_from_slice(&PCM_FORMAT_CODE.to_le_bytes());
    stream.extend_from_slice(&format.channels.to_le_bytes());
    stream.extend_from_slice(&format.sample_rate.to_le_bytes());
    stream.extend_from_slice(&format.byte_rate().to_le_bytes());
    stream.extend_from_slice(&format.block_align().to_le_bytes());
    stream.extend_from_slice(&format.bits_per_sample.to_le_bytes());

    stream.extend_from_slice(DATA_TAG);
    stream.extend_from_slice(&data_len.to_le_bytes());

    stream.extend_from_slice(payload);
    stream
}

/// Return the sample bytes behind a canonical 44-byte PCM preamble.
///
/// Recognizes only the exact layout `wrap_pcm` produces (and that the
/// provider's WAV synthesis output uses): `RIFF` at offset 0, `WAVE` at 8,
/// `fmt ` at 12 with block length 16 and format code 1, `data` at 36.
/// Anything else (compressed audio, extra chunks, truncated streams)
/// returns `None` so the caller can pass the stream through untouched
/// instead of mangling it.
pub fn strip_wav_header(stream: &[u8]) -> Option<&[u8]> {
    if stream.len() < WAV_HEADER_LEN {
        return None;
    }

    if &stream[0..4] != RIFF_TAG
        || &stream[8..12] != WAVE_TAG
        || &stream[12..16] != FMT_TAG
        || &stream[36..40] != DATA_TAG
    {
        return None;
    }

    // Reject containers that are WAV-shaped but not plain PCM
    let mut fields = Cursor::new(&stream[16..22]);
    let fmt_block_len = fields.read_u32::<LittleEndian>().ok()?;
    let format_code = fields.read_u16::<LittleEndian>().ok()?;

    if fmt_block_len != FMT_BLOCK_LEN || format_code != PCM_FORMAT_CODE {
        return None;
    }

    Some(&stream[WAV_HEADER_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(stream: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(stream[offset..offset + 2].try_into().unwrap())
    }

    fn u32_at(stream: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(stream[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_output_length_is_header_plus_payload() {
        let format = PcmFormat::default();
        for len in [0usize, 1, 2, 441, 32000] {
            let payload = vec![0xA5u8; len];
            let stream = wrap_pcm(&payload, &format);
            assert_eq!(stream.len(), WAV_HEADER_LEN + len);
        }
    }

    #[test]
    fn test_payload_copied_verbatim() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let stream = wrap_pcm(&payload, &PcmFormat::default());
        assert_eq!(&stream[WAV_HEADER_LEN..], payload.as_slice());
    }

    #[test]
    fn test_length_fields_track_payload() {
        let payload = vec![0u8; 320];
        let stream = wrap_pcm(&payload, &PcmFormat::default());

        // Overall size at offset 4, data length at offset 40
        assert_eq!(u32_at(&stream, 4), 36 + 320);
        assert_eq!(u32_at(&stream, 40), 320);
    }

    #[test]
    fn test_derived_rate_fields() {
        let format = PcmFormat::new(44100, 16, 2);
        let stream = wrap_pcm(&[0u8; 8], &format);

        assert_eq!(u32_at(&stream, 28), 44100 * 2 * 16 / 8);
        assert_eq!(u16_at(&stream, 32), 2 * 16 / 8);

        let mono8 = PcmFormat::new(8000, 8, 1);
        let stream = wrap_pcm(&[0u8; 8], &mono8);
        assert_eq!(u32_at(&stream, 28), 8000);
        assert_eq!(u16_at(&stream, 32), 1);
    }

    #[test]
    fn test_deterministic() {
        let payload = vec![7u8; 123];
        let format = PcmFormat::new(22050, 16, 1);
        assert_eq!(wrap_pcm(&payload, &format), wrap_pcm(&payload, &format));
    }

    #[test]
    fn test_reference_stream_16khz_mono() {
        // Two sample bytes at 16kHz/16-bit/mono: the exact field values the
        // provider's container parser checks
        let stream = wrap_pcm(&[0x01, 0x02], &PcmFormat::new(16000, 16, 1));

        assert_eq!(stream.len(), 46);
        assert_eq!(&stream[0..4], b"RIFF");
        assert_eq!(u32_at(&stream, 4), 38); // 36 + 2
        assert_eq!(&stream[8..12], b"WAVE");
        assert_eq!(&stream[12..16], b"fmt ");
        assert_eq!(u32_at(&stream, 16), 16);
        assert_eq!(u16_at(&stream, 20), 1); // PCM format code
        assert_eq!(u16_at(&stream, 22), 1); // mono
        assert_eq!(u32_at(&stream, 24), 16000);
        assert_eq!(u32_at(&stream, 28), 32000); // byte rate
        assert_eq!(u16_at(&stream, 32), 2); // block align
        assert_eq!(u16_at(&stream, 34), 16);
        assert_eq!(&stream[36..40], b"data");
        assert_eq!(u32_at(&stream, 40), 2);
        assert_eq!(&stream[44..46], [0x01, 0x02]);
    }

    #[test]
    fn test_empty_payload_yields_bare_header() {
        let stream = wrap_pcm(&[], &PcmFormat::default());
        assert_eq!(stream.len(), WAV_HEADER_LEN);
        assert_eq!(u32_at(&stream, 4), 36);
        assert_eq!(u32_at(&stream, 40), 0);
    }

    #[test]
    fn test_implausible_formats_encoded_as_is() {
        // Zero channels and a non-multiple-of-8 bit depth are written
        // verbatim, with derived fields from the same arithmetic
        let stream = wrap_pcm(&[0u8; 4], &PcmFormat::new(16000, 12, 0));
        assert_eq!(u16_at(&stream, 22), 0);
        assert_eq!(u16_at(&stream, 34), 12);
        assert_eq!(u32_at(&stream, 28), 0);
        assert_eq!(u16_at(&stream, 32), 0);
    }

    #[test]
    fn test_strip_recovers_wrapped_payload() {
        let payload = vec![0x10u8, 0x20, 0x30, 0x40];
        let stream = wrap_pcm(&payload, &PcmFormat::new(24000, 16, 1));
        assert_eq!(strip_wav_header(&stream), Some(payload.as_slice()));

        // Header-only stream strips to an empty payload
        let bare = wrap_pcm(&[], &PcmFormat::default());
        assert_eq!(strip_wav_header(&bare), Some(&[][..]));
    }

    #[test]
    fn test_strip_rejects_foreign_streams() {
        // Too short
        assert_eq!(strip_wav_header(&[0u8; 43]), None);

        // Right length, wrong tags
        assert_eq!(strip_wav_header(&[0u8; 64]), None);

        // MP3-style sync bytes
        let mut mp3ish = vec![0xFFu8, 0xFB];
        mp3ish.extend_from_slice(&[0u8; 100]);
        assert_eq!(strip_wav_header(&mp3ish), None);

        // Valid tags but a compressed format code
        let mut stream = wrap_pcm(&[0u8; 8], &PcmFormat::default());
        stream[20] = 3; // IEEE float, not PCM
        assert_eq!(strip_wav_header(&stream), None);
    }
}

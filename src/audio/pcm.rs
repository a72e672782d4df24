//! Raw PCM decoding for the polling backend.

use crate::audio::constants::{PCM16_BYTES, PCM16_SCALE};

/// Decode one signed 16-bit little-endian sample to a float in [-1, 1).
///
/// `high` carries the sign; the value is `(high << 8 | low) / 32768`.
pub fn pcm16_to_float(low: u8, high: u8) -> f32 {
    i16::from_le_bytes([low, high]) as f32 * PCM16_SCALE
}

/// Decode channel `channel` of each interleaved S16_LE frame in `bytes`,
/// appending to `out`. Trailing bytes that do not form a whole frame are
/// ignored. Returns the number of frames decoded.
pub fn decode_channel(bytes: &[u8], channels: usize, channel: usize, out: &mut Vec<f32>) -> usize {
    let frame_bytes = channels.max(1) * PCM16_BYTES;
    let offset = channel * PCM16_BYTES;
    let mut frames = 0;

    for frame in bytes.chunks_exact(frame_bytes) {
        out.push(pcm16_to_float(frame[offset], frame[offset + 1]));
        frames += 1;
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_scale() {
        assert_eq!(pcm16_to_float(0x00, 0x00), 0.0);
        assert_eq!(pcm16_to_float(0x00, 0x80), -1.0);
        assert_eq!(pcm16_to_float(0xff, 0x7f), 32767.0 / 32768.0);
        assert_eq!(pcm16_to_float(0x00, 0x40), 0.5);
        // low byte is unsigned, high byte signed
        assert_eq!(pcm16_to_float(0xff, 0xff), -1.0 / 32768.0);
        assert_eq!(pcm16_to_float(0x80, 0x00), 128.0 / 32768.0);
    }

    #[test]
    fn test_decode_first_channel_of_stereo() {
        // L=0x4000 (0.5), R=0x8000 (-1.0), L=0xC000 (-0.5), R=0, trailing byte
        let bytes = [0x00, 0x40, 0x00, 0x80, 0x00, 0xC0, 0x00, 0x00, 0x12];
        let mut out = Vec::new();
        assert_eq!(decode_channel(&bytes, 2, 0, &mut out), 2);
        assert_eq!(out, vec![0.5, -0.5]);
    }
}

//! 16-bit PCM RIFF/WAVE encoding of rendered buffers.

use std::io::Cursor;

use anyhow::{Context, Result};

use crate::sink::RenderedBuffer;

pub const WAV_HEADER_BYTES: usize = 44;
pub const BITS_PER_SAMPLE: u16 = 16;

/// Clamps to `[-1, 1]`, scales negatives by 32768 and the rest by 32767, and
/// truncates toward zero.
#[must_use]
pub fn quantize_sample(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32_768.0) as i16
    } else {
        (clamped * 32_767.0) as i16
    }
}

/// Encodes `buffer` as a canonical 44-byte-header WAV file held in memory.
/// Stateless: the output depends on the buffer alone.
pub fn encode_wav(buffer: &RenderedBuffer) -> Result<Vec<u8>> {
    let channels = u16::try_from(buffer.channel_count()).context("too many channels")?;
    let spec = hound::WavSpec {
        channels,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let data_bytes = buffer.frame_count() * buffer.channel_count() * 2;
    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_BYTES + data_bytes));
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("failed to write wav header")?;
        for sample in buffer.interleaved() {
            writer
                .write_sample(quantize_sample(sample))
                .context("failed to write wav sample")?;
        }
        writer.finalize().context("failed to finalize wav data")?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantization_is_asymmetric_and_clipped() {
        assert_eq!(quantize_sample(1.5), i16::MAX);
        assert_eq!(quantize_sample(-1.5), i16::MIN);
        assert_eq!(quantize_sample(1.0), 32_767);
        assert_eq!(quantize_sample(-1.0), -32_768);
        assert_eq!(quantize_sample(0.0), 0);
        assert_eq!(quantize_sample(0.5), 16_383);
        assert_eq!(quantize_sample(-0.5), -16_384);
    }

    #[test]
    fn header_fields_follow_the_canonical_layout() {
        let buffer = RenderedBuffer::new(22_050, vec![0.25; 3], vec![-0.25; 3])
            .expect("equal channel lengths");
        let bytes = encode_wav(&buffer).expect("encoding should succeed");
        let total = bytes.len();
        assert_eq!(total, WAV_HEADER_BYTES + 3 * 4);

        let u32_at = |at: usize| u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
        let u16_at = |at: usize| u16::from_le_bytes(bytes[at..at + 2].try_into().unwrap());

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32_at(4) as usize, total - 8);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32_at(16), 16);
        assert_eq!(u16_at(20), 1);
        assert_eq!(u16_at(22), 2);
        assert_eq!(u32_at(24), 22_050);
        assert_eq!(u32_at(28), 22_050 * 4);
        assert_eq!(u16_at(32), 4);
        assert_eq!(u16_at(34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(40) as usize, total - 44);

        let first_left = i16::from_le_bytes([bytes[44], bytes[45]]);
        let first_right = i16::from_le_bytes([bytes[46], bytes[47]]);
        assert_eq!(first_left, 8_191);
        assert_eq!(first_right, -8_192);
    }
}

//! WAV decoding for template enrollment.
//!
//! Enrollment sources are usually short recorded WAV files; this module
//! turns their bytes into the detector's internal PCM (mono, 16-bit LE,
//! detector sample rate) so they can run through the same extraction path
//! as live audio.

use std::io::Cursor;

use hound::WavReader;
use thiserror::Error;

use crate::audio::{AudioError, AudioFmt, Endianness, SampleFormat};

#[derive(Debug, Error)]
pub enum WavError {
    #[error("wav: {0}")]
    Decode(#[from] hound::Error),
    #[error("unsupported wav format: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Decode WAV bytes into internal PCM at `target_rate`.
pub fn decode_wav(bytes: &[u8], target_rate: u32) -> Result<Vec<u8>, WavError> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let sample_format = match spec.sample_format {
        hound::SampleFormat::Float => SampleFormat::float_of_size(spec.bits_per_sample),
        hound::SampleFormat::Int => SampleFormat::int_of_size(spec.bits_per_sample),
    }
    .ok_or_else(|| {
        WavError::Unsupported(format!(
            "{:?} at {} bits",
            spec.sample_format, spec.bits_per_sample
        ))
    })?;

    // Re-encode the interleaved samples as little-endian bytes and hand
    // off to the shared PCM conversion path.
    let mut raw = Vec::new();
    match sample_format {
        SampleFormat::I8 => {
            for s in reader.samples::<i8>() {
                raw.extend_from_slice(&s?.to_le_bytes());
            }
        }
        SampleFormat::I16 => {
            for s in reader.samples::<i16>() {
                raw.extend_from_slice(&s?.to_le_bytes());
            }
        }
        SampleFormat::I32 => {
            for s in reader.samples::<i32>() {
                raw.extend_from_slice(&s?.to_le_bytes());
            }
        }
        SampleFormat::F32 => {
            for s in reader.samples::<f32>() {
                raw.extend_from_slice(&s?.to_le_bytes());
            }
        }
    }

    let fmt = AudioFmt {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        sample_format,
        endianness: Endianness::Little,
    };
    Ok(fmt.convert_to(&raw, target_rate)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone_wav(sample_rate: u32, channels: u16, secs: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("writer");
            let n = (sample_rate as f32 * secs) as usize;
            for i in 0..n {
                let v = ((2.0 * PI * 440.0 * i as f32 / sample_rate as f32).sin() * 8_000.0) as i16;
                for _ in 0..channels {
                    writer.write_sample(v).expect("sample");
                }
            }
            writer.finalize().expect("finalize");
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_mono_16k_unchanged_length() {
        let wav = tone_wav(16_000, 1, 0.1);
        let pcm = decode_wav(&wav, 16_000).expect("decode");
        assert_eq!(pcm.len(), 1_600 * 2);
    }

    #[test]
    fn stereo_is_mixed_down() {
        let wav = tone_wav(16_000, 2, 0.1);
        let pcm = decode_wav(&wav, 16_000).expect("decode");
        assert_eq!(pcm.len(), 1_600 * 2);
    }

    #[test]
    fn resamples_to_target_rate() {
        let wav = tone_wav(48_000, 1, 0.1);
        let pcm = decode_wav(&wav, 16_000).expect("decode");
        assert_eq!(pcm.len(), 1_600 * 2);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(decode_wav(&[0u8; 32], 16_000).is_err());
    }
}

//! PCM sample-format primitives and format conversion.
//
//  • All variants document their size explicitly in the name (`I16`, `F32`, …).
//  • `Sample` trait is blanket-implemented via a macro for every scalar type
//    we support; new types can be added with one extra `with_sample_type!` call.
//  • `AudioFmt::convert_to` mixes down to mono, rescales bit depth and
//    linearly resamples so callers can feed the detector from any source
//    format via `process(chunk, Some(fmt))`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while decoding or converting PCM byte streams.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("byte buffer length {len} is not aligned to {format:?} x {channels} channels")]
    Misaligned {
        len: usize,
        format: SampleFormat,
        channels: u16,
    },
}

/* ─────────────────────────────── enums ─────────────────────────────── */

/// PCM sample encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    /// 8-bit signed integer samples.
    I8,
    /// 16-bit signed integer samples.
    I16,
    /// 32-bit signed integer samples.
    I32,
    /// 32-bit floating point samples.
    F32,
}

impl SampleFormat {
    /// Bits per scalar.
    #[inline]
    pub const fn bits(self) -> u16 {
        match self {
            Self::I8 => 8,
            Self::I16 => 16,
            Self::I32 | Self::F32 => 32,
        }
    }

    /// Bytes per scalar.
    #[inline]
    pub const fn bytes(self) -> u16 {
        self.bits() / 8
    }

    /// Integer format from bit size (`8/16/32`).
    pub const fn int_of_size(bits: u16) -> Option<Self> {
        match bits {
            8 => Some(Self::I8),
            16 => Some(Self::I16),
            32 => Some(Self::I32),
            _ => None,
        }
    }

    /// Float format from bit size (`32`).
    pub const fn float_of_size(bits: u16) -> Option<Self> {
        if bits == 32 { Some(Self::F32) } else { None }
    }
}

/// Endianness of a byte stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    /// Big-endian byte ordering.
    Big,
    /// Little-endian byte ordering.
    #[default]
    Little,
}

/* ──────────────────────────── sample trait ─────────────────────────── */

/// A scalar type accepted by the pipeline. All conversions are inline and
/// panic-free.
pub trait Sample: Copy + Send + 'static {
    const FORMAT: SampleFormat;
    fn zero() -> Self;
    fn from_le(b: &[u8]) -> Self;
    fn from_be(b: &[u8]) -> Self;
    /// Normalized to [-1, 1].
    fn into_f32(self) -> f32;
}

macro_rules! with_sample_type {
    ($ty:ty, $variant:ident, $to_f32:expr, $zero:expr) => {
        impl Sample for $ty {
            const FORMAT: SampleFormat = SampleFormat::$variant;
            #[inline]
            fn zero() -> Self {
                $zero
            }
            #[inline]
            fn from_le(b: &[u8]) -> Self {
                match b.try_into() {
                    Ok(bytes) => <$ty>::from_le_bytes(bytes),
                    Err(_) => Self::zero(),
                }
            }
            #[inline]
            fn from_be(b: &[u8]) -> Self {
                match b.try_into() {
                    Ok(bytes) => <$ty>::from_be_bytes(bytes),
                    Err(_) => Self::zero(),
                }
            }
            #[inline]
            fn into_f32(self) -> f32 {
                $to_f32(self)
            }
        }
    };
}

with_sample_type!(i8, I8, |v: i8| v as f32 / i8::MAX as f32, 0);
with_sample_type!(i16, I16, |v: i16| v as f32 / i16::MAX as f32, 0);
with_sample_type!(i32, I32, |v: i32| v as f32 / i32::MAX as f32, 0);
with_sample_type!(f32, F32, |v: f32| v, 0.0);

/* ───────────────────────────── format ──────────────────────────────── */

/// Shape of a raw PCM byte stream.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioFmt {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    pub endianness: Endianness,
}

impl Default for AudioFmt {
    fn default() -> Self {
        Self {
            sample_rate: crate::constants::DETECTOR_INTERNAL_SAMPLE_RATE,
            channels: 1,
            sample_format: SampleFormat::I16,
            endianness: Endianness::Little,
        }
    }
}

impl AudioFmt {
    /// Bytes occupied by one multi-channel sample frame.
    pub fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes() as usize * self.channels as usize
    }

    /// Decode this format into normalized mono `f32` samples.
    pub fn decode_mono(&self, bytes: &[u8]) -> Result<Vec<f32>, AudioError> {
        match self.sample_format {
            SampleFormat::I8 => self.decode_mono_typed::<i8>(bytes),
            SampleFormat::I16 => self.decode_mono_typed::<i16>(bytes),
            SampleFormat::I32 => self.decode_mono_typed::<i32>(bytes),
            SampleFormat::F32 => self.decode_mono_typed::<f32>(bytes),
        }
    }

    fn decode_mono_typed<S: Sample>(&self, bytes: &[u8]) -> Result<Vec<f32>, AudioError> {
        let stride = self.bytes_per_frame();
        if stride == 0 || bytes.len() % stride != 0 {
            return Err(AudioError::Misaligned {
                len: bytes.len(),
                format: self.sample_format,
                channels: self.channels,
            });
        }
        let width = S::FORMAT.bytes() as usize;
        let channels = self.channels as usize;
        let mut out = Vec::with_capacity(bytes.len() / stride);
        for frame in bytes.chunks_exact(stride) {
            let mut acc = 0.0f32;
            for ch in frame.chunks_exact(width).take(channels) {
                let s = match self.endianness {
                    Endianness::Little => S::from_le(ch),
                    Endianness::Big => S::from_be(ch),
                };
                acc += s.into_f32();
            }
            out.push(acc / channels as f32);
        }
        Ok(out)
    }

    /// Convert a byte stream in this format into mono signed-16-bit
    /// little-endian PCM at `target_rate`. Resampling is linear; good
    /// enough for feature extraction, not for playback.
    pub fn convert_to(&self, bytes: &[u8], target_rate: u32) -> Result<Vec<u8>, AudioError> {
        let mono = self.decode_mono(bytes)?;
        let resampled = if self.sample_rate == target_rate {
            mono
        } else {
            resample_linear(&mono, self.sample_rate, target_rate)
        };
        let mut out = Vec::with_capacity(resampled.len() * 2);
        for s in resampled {
            let v = (s * i16::MAX as f32)
                .round()
                .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            out.extend_from_slice(&v.to_le_bytes());
        }
        Ok(out)
    }
}

/// Linear-interpolation resampler.
fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if samples.is_empty() || from == to {
        return samples.to_vec();
    }
    let ratio = from as f64 / to as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let base = pos.floor() as usize;
        let frac = (pos - base as f64) as f32;
        let a = samples[base];
        let b = samples.get(base + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }
    out
}

/// Reinterpret little-endian 16-bit PCM bytes as `i16` samples. A trailing
/// odd byte is ignored.
pub(crate) fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn decodes_i16_mono() {
        let fmt = AudioFmt::default();
        let bytes: Vec<u8> = [0i16, i16::MAX, i16::MIN + 1]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let mono = fmt.decode_mono(&bytes).expect("decode");
        assert_abs_diff_eq!(mono[0], 0.0);
        assert_abs_diff_eq!(mono[1], 1.0);
        assert_abs_diff_eq!(mono[2], -1.0, epsilon = 1e-4);
    }

    #[test]
    fn mixes_stereo_down() {
        let fmt = AudioFmt {
            channels: 2,
            ..Default::default()
        };
        let bytes: Vec<u8> = [i16::MAX, 0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let mono = fmt.decode_mono(&bytes).expect("decode");
        assert_eq!(mono.len(), 1);
        assert_abs_diff_eq!(mono[0], 0.5, epsilon = 1e-4);
    }

    #[test]
    fn rejects_misaligned_input() {
        let fmt = AudioFmt::default();
        assert!(fmt.decode_mono(&[0u8; 3]).is_err());
    }

    #[test]
    fn convert_halves_sample_count_at_half_rate() {
        let fmt = AudioFmt {
            sample_rate: 32_000,
            ..Default::default()
        };
        let bytes = vec![0u8; 3200 * 2]; // 3200 samples @ 32 kHz
        let out = fmt.convert_to(&bytes, 16_000).expect("convert");
        assert_eq!(out.len(), 1600 * 2);
    }

    #[test]
    fn big_endian_round_trip() {
        let fmt = AudioFmt {
            endianness: Endianness::Big,
            ..Default::default()
        };
        let bytes = 1000i16.to_be_bytes().to_vec();
        let mono = fmt.decode_mono(&bytes).expect("decode");
        assert_abs_diff_eq!(mono[0], 1000.0 / i16::MAX as f32, epsilon = 1e-6);
    }
}

//! Mel-frequency cepstral coefficient computation.
//!
//! The pipeline treats coefficient computation as a pluggable primitive:
//! anything implementing [`FeatureComputer`] can sit behind the streaming
//! extractor. [`Mfcc`] is the built-in implementation — Hamming window →
//! FFT → triangular mel filter bank → log energies → DCT-II. Scratch
//! buffers are allocated once in `new` and re-used per frame.

use rustfft::{FftPlanner, num_complex::Complex32};
use std::f32::consts::PI;

use crate::constants::MFCC_DEFAULT_MEL_BANDS;

/// Returned whenever the coefficient API is mis-used.
#[derive(Debug, thiserror::Error)]
pub enum MfccError {
    /// Frame length does not match the configured frame size.
    #[error("frame length ({given}) must equal configured frame size ({expected})")]
    BadFrame { given: usize, expected: usize },
    /// Construction parameters that cannot produce a filter bank.
    #[error("invalid mfcc configuration: {0}")]
    BadConfig(String),
}

/// A primitive that turns one windowed audio frame into a coefficient
/// vector. Implementations are constructed for a fixed `(frame_size,
/// sample_rate)` pair; the returned vector has a fixed length per instance
/// and includes the 0th (energy) coefficient — callers decide whether to
/// drop it.
pub trait FeatureComputer: Send {
    /// Samples expected per frame.
    fn frame_size(&self) -> usize;

    /// Compute the coefficient vector for `frame` of mono f32 PCM.
    fn compute(&mut self, frame: &[f32]) -> Result<Vec<f32>, MfccError>;
}

/// Built-in mel-cepstral front-end.
pub struct Mfcc {
    frame_size: usize,

    // cached DSP bits
    fft: std::sync::Arc<dyn rustfft::Fft<f32>>,
    fft_buf: Vec<Complex32>,
    hamming: Vec<f32>,
    filter_bank: Vec<Vec<f32>>, // [mel_bin][mag_bin]

    // scratch, reused between calls
    mag_spectrum: Vec<f32>,
    mel_energies: Vec<f32>,
}

impl Mfcc {
    /// Create a front-end producing [`MFCC_DEFAULT_MEL_BANDS`] coefficients.
    pub fn new(frame_size: usize, sample_rate: u32) -> Result<Self, MfccError> {
        Self::with_mel_bands(frame_size, sample_rate, MFCC_DEFAULT_MEL_BANDS)
    }

    /// * `frame_size` – samples per analysis frame (e.g. 480 = 30 ms @ 16 kHz)
    /// * `mel_bands`  – number of triangular mel filters and output coefficients
    pub fn with_mel_bands(
        frame_size: usize,
        sample_rate: u32,
        mel_bands: usize,
    ) -> Result<Self, MfccError> {
        if frame_size < 2 {
            return Err(MfccError::BadConfig(format!(
                "frame_size {frame_size} too small"
            )));
        }
        if mel_bands == 0 {
            return Err(MfccError::BadConfig("mel_bands must be nonzero".into()));
        }
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_size);
        let hamming = (0..frame_size)
            .map(|n| 0.54 - 0.46 * ((2.0 * PI * n as f32) / (frame_size - 1) as f32).cos())
            .collect::<Vec<_>>();
        let mag_bins = frame_size / 2;
        let filter_bank = mel_filter_bank(sample_rate, mag_bins, mel_bands);
        Ok(Self {
            frame_size,
            fft,
            fft_buf: vec![Complex32::ZERO; frame_size],
            hamming,
            filter_bank,
            mag_spectrum: vec![0.0; mag_bins],
            mel_energies: vec![0.0; mel_bands],
        })
    }

    /// Output coefficients per frame.
    #[inline]
    pub fn coefficients(&self) -> usize {
        self.filter_bank.len()
    }
}

impl FeatureComputer for Mfcc {
    #[inline]
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn compute(&mut self, frame: &[f32]) -> Result<Vec<f32>, MfccError> {
        if frame.len() != self.frame_size {
            return Err(MfccError::BadFrame {
                given: frame.len(),
                expected: self.frame_size,
            });
        }

        // 1) Window + FFT
        for (dst, (&x, &w)) in self.fft_buf.iter_mut().zip(frame.iter().zip(&self.hamming)) {
            dst.re = x * w;
            dst.im = 0.0;
        }
        self.fft.process(&mut self.fft_buf);

        // 2) |FFT| → magnitude spectrum
        for (i, m) in self.mag_spectrum.iter_mut().enumerate() {
            let c = self.fft_buf[i];
            *m = (c.re * c.re + c.im * c.im).sqrt();
        }

        // 3) Mel filter bank → log energies
        for (mel_bin, filt) in self.filter_bank.iter().enumerate() {
            let e = filt
                .iter()
                .zip(self.mag_spectrum.iter())
                .map(|(f, &m)| f * m)
                .sum::<f32>()
                + f32::MIN_POSITIVE;
            self.mel_energies[mel_bin] = e.ln();
        }

        // 4) DCT-II over the log energies; coefficient 0 is kept here and
        //    dropped by the extractor stage.
        let bands = self.mel_energies.len();
        let n = bands as f32;
        let mut out = vec![0.0f32; bands];
        for (k, o) in out.iter_mut().enumerate() {
            let mut s = 0.0;
            for (m, &e) in self.mel_energies.iter().enumerate() {
                s += e * ((PI / n) * (m as f32 + 0.5) * k as f32).cos();
            }
            *o = 2.0 * s;
        }
        Ok(out)
    }
}

/* ---------- helpers -------------------------------------------------- */

fn mel_filter_bank(sample_rate: u32, mag_bins: usize, mel_bins: usize) -> Vec<Vec<f32>> {
    let f_max = sample_rate as f32 / 2.0;
    let mel_max = freq_to_mel(f_max);
    let mel_step = mel_max / (mel_bins + 1) as f32;
    let mut bank = vec![vec![0f32; mag_bins]; mel_bins];

    let center_freqs: Vec<f32> = (0..=mel_bins + 1)
        .map(|i| mel_to_freq(i as f32 * mel_step))
        .collect();

    for (i, filt) in bank.iter_mut().enumerate() {
        let f_left = center_freqs[i];
        let f_center = center_freqs[i + 1];
        let f_right = center_freqs[i + 2];

        for (bin, amp) in filt.iter_mut().enumerate() {
            let freq = bin as f32 * f_max / (mag_bins - 1) as f32;
            *amp = if freq < f_left || freq > f_right {
                0.0
            } else if freq <= f_center {
                (freq - f_left) / (f_center - f_left)
            } else {
                (f_right - freq) / (f_right - f_center)
            };
        }
    }
    bank
}

#[inline]
fn freq_to_mel(f: f32) -> f32 {
    1127.0 * (1.0 + f / 700.0).ln()
}

#[inline]
fn mel_to_freq(m: f32) -> f32 {
    700.0 * ((m / 1127.0).exp() - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_fixed_length_vectors() {
        let mut mfcc = Mfcc::new(480, 16_000).expect("construct");
        let frame: Vec<f32> = (0..480).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let coeffs = mfcc.compute(&frame).expect("compute");
        assert_eq!(coeffs.len(), MFCC_DEFAULT_MEL_BANDS);
        assert!(coeffs.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn rejects_wrong_frame_length() {
        let mut mfcc = Mfcc::new(480, 16_000).expect("construct");
        assert!(matches!(
            mfcc.compute(&[0.0; 100]),
            Err(MfccError::BadFrame {
                given: 100,
                expected: 480
            })
        ));
    }

    #[test]
    fn different_tones_yield_different_coefficients() {
        let mut mfcc = Mfcc::new(480, 16_000).expect("construct");
        let low: Vec<f32> = (0..480)
            .map(|i| (2.0 * PI * 200.0 * i as f32 / 16_000.0).sin())
            .collect();
        let high: Vec<f32> = (0..480)
            .map(|i| (2.0 * PI * 3_000.0 * i as f32 / 16_000.0).sin())
            .collect();
        let a = mfcc.compute(&low).expect("low");
        let b = mfcc.compute(&high).expect("high");
        let diff: f32 = a.iter().zip(&b).map(|(x, y)| (x - y).abs()).sum();
        assert!(diff > 1.0, "spectra too similar: {diff}");
    }

    #[test]
    fn rejects_degenerate_construction() {
        assert!(Mfcc::new(1, 16_000).is_err());
        assert!(Mfcc::with_mel_bands(480, 16_000, 0).is_err());
    }
}

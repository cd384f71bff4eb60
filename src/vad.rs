//! Voice-activity gating.
//!
//! The binary voice/silence decision is a pluggable primitive behind the
//! [`VoiceActivity`] trait; [`EnergyVad`] is the built-in implementation.
//! [`VoiceActivityFilter`] wraps whichever primitive is installed with
//! trailing hysteresis so brief decision flicker right after real speech
//! does not chop an utterance apart.

use arrayvec::ArrayVec;

use crate::audio::pcm16_from_le_bytes;
use crate::config::VadMode;

/// Energy frames tracked by the built-in detector's noise-floor window.
const ENERGY_WINDOW: usize = 50;

/// A voice/silence decision primitive. `true` means voice.
pub trait VoiceActivity: Send {
    fn decide(&mut self, pcm: &[i16], sample_rate: u32) -> bool;
}

/// Simple energy-ratio voice detector.
///
/// Tracks mean absolute amplitude over a ring of recent chunks; a chunk is
/// voiced when its energy clears both an absolute floor and the running
/// minimum scaled by the [`VadMode`] ratio.
pub struct EnergyVad {
    mode: VadMode,
    index: usize,
    window: ArrayVec<f32, ENERGY_WINDOW>,
}

impl EnergyVad {
    pub fn new(mode: VadMode) -> Self {
        Self {
            mode,
            index: 0,
            window: ArrayVec::from([f32::NAN; ENERGY_WINDOW]),
        }
    }

    /// Forget the noise-floor history (e.g. when the stream restarts).
    pub fn reset(&mut self) {
        self.window.fill(f32::NAN);
        self.index = 0;
    }
}

impl VoiceActivity for EnergyVad {
    fn decide(&mut self, pcm: &[i16], _sample_rate: u32) -> bool {
        if pcm.is_empty() {
            return false;
        }

        // Energy = mean(|sample|), normalized to [0, 1].
        let e = pcm
            .iter()
            .map(|&v| (v as f32 / i16::MAX as f32).abs())
            .sum::<f32>()
            / pcm.len() as f32;

        self.window[self.index] = e;
        self.index = (self.index + 1) % ENERGY_WINDOW;

        let mut floor = f32::INFINITY;
        for &v in self.window.iter() {
            if !v.is_nan() && v < floor {
                floor = v;
            }
        }

        e > 0.01 && (!floor.is_finite() || e > floor * self.mode.energy_ratio())
    }
}

/// Debouncing wrapper around a [`VoiceActivity`] primitive.
///
/// The counter starts at `debounce`; while it is positive every call
/// reports voice and decrements without consulting the primitive. Once it
/// reaches zero the primitive is consulted directly — a voice decision
/// re-arms the counter, a silence decision passes through. Trailing
/// hysteresis only.
pub struct VoiceActivityFilter {
    vad: Box<dyn VoiceActivity>,
    sample_rate: u32,
    debounce: u32,
    debouncing: u32,
}

impl VoiceActivityFilter {
    pub fn new(vad: Box<dyn VoiceActivity>, sample_rate: u32, debounce: u32) -> Self {
        Self {
            vad,
            sample_rate,
            debounce,
            debouncing: debounce,
        }
    }

    /// Classify one chunk of 16-bit little-endian PCM bytes.
    pub fn process_audio(&mut self, chunk: &[u8]) -> bool {
        if self.debouncing > 0 {
            self.debouncing -= 1;
            return true;
        }
        let samples = pcm16_from_le_bytes(chunk);
        if self.vad.decide(&samples, self.sample_rate) {
            self.debouncing = self.debounce;
            return true;
        }
        false
    }
}

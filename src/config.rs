//! Detector configuration.
//!
//! The whole pipeline is configured through one plain struct with defaulted
//! fields, validated once at construction. Runtime knobs the detector needs
//! afterwards are copied out of it; the struct itself is not retained.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::constants::{
    COMPARATOR_DEFAULT_BAND_SIZE, COMPARATOR_DEFAULT_REFERENCE, DETECTOR_DEFAULT_BIT_DEPTH,
    DETECTOR_DEFAULT_CHANNELS, DETECTOR_DEFAULT_THRESHOLD, DETECTOR_INTERNAL_SAMPLE_RATE,
    EXTRACTOR_FRAME_LENGTH_MS, EXTRACTOR_FRAME_SHIFT_MS, EXTRACTOR_PRE_EMPHASIS,
    VAD_DEFAULT_DEBOUNCE,
};

/// Aggressiveness of the voice-activity decision primitive.
///
/// Higher modes are stricter about what counts as voice, trading recall
/// for fewer false positives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum VadMode {
    #[default]
    Normal,
    LowBitrate,
    Aggressive,
    VeryAggressive,
}

impl VadMode {
    /// Energy ratio a frame must exceed (relative to the running noise
    /// floor) before it is counted as voiced.
    pub(crate) fn energy_ratio(self) -> f32 {
        match self {
            VadMode::Normal => 2.0,
            VadMode::LowBitrate => 2.5,
            VadMode::Aggressive => 3.0,
            VadMode::VeryAggressive => 4.0,
        }
    }
}

/// Options recognized by [`WakewordDetector`](crate::WakewordDetector).
///
/// Every field has a documented default; `..Default::default()` is the
/// intended way to override a few knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Input channel count. The native path expects mono; feed anything
    /// above 1 through `process(chunk, Some(fmt))` so it is mixed down.
    pub channels: u16,
    /// Input PCM bit depth. Only 16-bit is processed natively; other
    /// depths must go through [`AudioFmt`](crate::audio::AudioFmt)
    /// conversion on `process`.
    pub bit_depth: u16,
    /// Sample rate of the audio fed to the detector (Hz).
    pub sample_rate: u32,
    /// Analysis frame length in milliseconds.
    pub frame_length_ms: u32,
    /// Frame shift (hop) in milliseconds.
    pub frame_shift_ms: u32,
    /// Score a keyword must reach before it is considered a match.
    pub threshold: f32,
    /// Gate incoming audio on voice activity.
    pub vad: bool,
    /// Aggressiveness of the voice-activity primitive.
    pub vad_mode: VadMode,
    /// Frames the activity filter keeps reporting voice after a real
    /// voice decision.
    pub vad_debounce: u32,
    /// First-order pre-emphasis coefficient applied per block.
    pub pre_emphasis: f32,
    /// Sakoe–Chiba band size for the DTW comparator.
    pub band_size: u16,
    /// Reference cost mapped to probability 0.5 by the comparator.
    pub score_ref: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            channels: DETECTOR_DEFAULT_CHANNELS,
            bit_depth: DETECTOR_DEFAULT_BIT_DEPTH,
            sample_rate: DETECTOR_INTERNAL_SAMPLE_RATE,
            frame_length_ms: EXTRACTOR_FRAME_LENGTH_MS,
            frame_shift_ms: EXTRACTOR_FRAME_SHIFT_MS,
            threshold: DETECTOR_DEFAULT_THRESHOLD,
            vad: true,
            vad_mode: VadMode::default(),
            vad_debounce: VAD_DEFAULT_DEBOUNCE,
            pre_emphasis: EXTRACTOR_PRE_EMPHASIS,
            band_size: COMPARATOR_DEFAULT_BAND_SIZE,
            score_ref: COMPARATOR_DEFAULT_REFERENCE,
        }
    }
}

impl DetectorConfig {
    /// Samples per analysis frame at the configured rate.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate * self.frame_length_ms / 1_000) as usize
    }

    /// Samples per frame shift at the configured rate.
    pub fn samples_per_shift(&self) -> usize {
        (self.sample_rate * self.frame_shift_ms / 1_000) as usize
    }

    /// Check the configuration once, before any pipeline state is built.
    pub fn validate(&self) -> Result<(), String> {
        if self.channels == 0 {
            return Err("channels must be at least 1".into());
        }
        if self.bit_depth != 16 {
            return Err(format!(
                "native bit depth must be 16, got {} (use AudioFmt conversion)",
                self.bit_depth
            ));
        }
        if self.sample_rate == 0 {
            return Err("sample_rate must be nonzero".into());
        }
        if self.frame_shift_ms == 0 || self.frame_length_ms < self.frame_shift_ms {
            return Err(format!(
                "frame_length_ms ({}) must be >= frame_shift_ms ({}) and shift nonzero",
                self.frame_length_ms, self.frame_shift_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!("threshold {} outside [0, 1]", self.threshold));
        }
        if !(0.0..1.0).contains(&self.pre_emphasis) {
            return Err(format!("pre_emphasis {} outside [0, 1)", self.pre_emphasis));
        }
        if self.score_ref <= 0.0 {
            return Err(format!("score_ref {} must be positive", self.score_ref));
        }
        Ok(())
    }
}

/// Per-keyword enrollment options.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct KeywordOptions {
    /// Keep every enrolled template instead of folding them into a single
    /// DTW-averaged one. More accurate, more work per detection pass.
    pub disable_averaging: bool,
    /// Per-keyword score threshold. Zero means "use the detector's".
    pub threshold: f32,
}

//! perk – streaming wake-word spotting
//! ===================================
//! Template-matching keyword detector: a mel-cepstral front-end feeds a
//! bounded sliding window that is scored against enrolled templates with
//! banded DTW, and a peak-detection state machine decides exactly when a
//! match fires.
//!
//! The library is **self-contained**: enroll one or more recordings per
//! keyword, feed PCM chunks, and consume the returned events.
//!
//! ```no_run
//! use perk::{DetectorConfig, DetectorEvent, KeywordOptions, WakewordDetector};
//!
//! # fn main() -> Result<(), perk::DetectorError> {
//! let mut detector = WakewordDetector::new(DetectorConfig::default())?;
//! let samples: Vec<Vec<u8>> = load_enrollment_wavs();
//! detector.add_keyword_wav("hey perk", &samples, KeywordOptions::default())?;
//!
//! for chunk in capture_audio_chunks() {
//!     for event in detector.process(&chunk, None)? {
//!         if let DetectorEvent::Detection(hit) = event {
//!             println!("{} @ {:.2}", hit.keyword, hit.score);
//!         }
//!     }
//! }
//! # Ok(()) }
//! # fn load_enrollment_wavs() -> Vec<Vec<u8>> { Vec::new() }
//! # fn capture_audio_chunks() -> Vec<Vec<u8>> { Vec::new() }
//! ```
//!
//! The voice-activity and coefficient primitives are pluggable through
//! [`WakewordDetectorBuilder`]; the built-in implementations cover the
//! common case.

#![deny(unsafe_code)]

/* ────────────────────────  sub-modules  ─────────────────────────────── */
pub mod audio;
pub mod config;
pub mod constants;
pub mod detector;
pub mod dsp;
pub mod extractor;
pub mod keyword;
pub mod vad;
pub mod wav;

/* ────────── public façade & re-exports ─────────────── */
pub use audio::{AudioError, AudioFmt, Endianness, Sample, SampleFormat};
pub use config::{DetectorConfig, KeywordOptions, VadMode};
pub use constants::*;
pub use detector::{
    Detection, DetectorError, DetectorEvent, MatchResult, MfccFactory, WakewordDetector,
    WakewordDetectorBuilder,
};
pub use dsp::{AveragerError, FeatureComputer, Mfcc, MfccError, cosine_similarity};
pub use extractor::{ExtractorError, FeatureExtractor, WriteOutcome};
pub use keyword::Keyword;
pub use vad::{EnergyVad, VoiceActivity, VoiceActivityFilter};
pub use wav::{WavError, decode_wav};

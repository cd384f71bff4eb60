//! Core constants for the perk detection pipeline.
//!
//!  * All values are `pub` unless they’re strictly an implementation detail
//!    (then they stay `pub(crate)`).
//!  * “Magic numbers” are grouped logically with doc comments.

/* --------------------------------------------------------------------- */
/*  Audio layout defaults                                                */

/// Internal mono PCM sample-rate (Hz).
pub const DETECTOR_INTERNAL_SAMPLE_RATE: u32 = 16_000;

/// Default number of input channels.
pub const DETECTOR_DEFAULT_CHANNELS: u16 = 1;

/// Default PCM bit depth.
pub const DETECTOR_DEFAULT_BIT_DEPTH: u16 = 16;

/// Analysis frame length (milliseconds).
pub const EXTRACTOR_FRAME_LENGTH_MS: u32 = 30;

/// Frame hop / shift length (milliseconds).
pub const EXTRACTOR_FRAME_SHIFT_MS: u32 = 10;

/// Pre-emphasis coefficient (first-order high-pass).
pub const EXTRACTOR_PRE_EMPHASIS: f32 = 0.97;

/// Bound on the extractor's pending feature queue. Writes are refused
/// (`WriteOutcome::Full`) once this many pairs are waiting to be polled.
pub(crate) const EXTRACTOR_QUEUE_CAPACITY: usize = 64;

/* --------------------------------------------------------------------- */
/*  Dynamic-time-warping comparator defaults                             */

/// Sakoe–Chiba band size used by the DTW comparator.
pub(crate) const COMPARATOR_DEFAULT_BAND_SIZE: u16 = 5;

/// Reference value to map normalized DTW cost → 0-1 probability.
pub(crate) const COMPARATOR_DEFAULT_REFERENCE: f32 = 0.22;

/// Logistic-probability baseline a score must reach to count as a match.
pub(crate) const DETECTOR_DEFAULT_THRESHOLD: f32 = 0.5;

/* --------------------------------------------------------------------- */
/*  Mel front-end                                                        */

/// Triangular mel filters in the default front-end.
pub const MFCC_DEFAULT_MEL_BANDS: usize = 24;

/* --------------------------------------------------------------------- */
/*  Voice-activity filter                                                */

/// Frames the activity filter keeps reporting voice after a real
/// voice decision (trailing hysteresis).
pub(crate) const VAD_DEFAULT_DEBOUNCE: u32 = 20;

/// Multiplier applied to a detection's template frame count when slicing
/// the evidencing audio span out of the chunk window.
pub(crate) const DETECTION_AUDIO_SPAN_FACTOR: f32 = 1.2;

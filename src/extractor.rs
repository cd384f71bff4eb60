//! Streaming feature extraction.
//!
//! Raw PCM bytes come in, `(feature vector, raw block)` pairs come out.
//! Bytes are accumulated into fixed blocks of one shift interval, each
//! block is pre-emphasized and converted to normalized f32, and a rolling
//! sample buffer of one frame length feeds the coefficient primitive.
//!
//! Output goes through a bounded queue: when it saturates, writes are
//! refused with [`WriteOutcome::Full`] until [`FeatureExtractor::poll`]
//! frees space. A trailing partial block is never emitted.

use std::collections::VecDeque;

use log::trace;
use thiserror::Error;

use crate::constants::EXTRACTOR_QUEUE_CAPACITY;
use crate::dsp::{FeatureComputer, MfccError};

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("feature computation: {0}")]
    Mfcc(#[from] MfccError),
    #[error("extractor used after destroy")]
    Destroyed,
}

/// Result of offering bytes to the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Input consumed.
    Accepted,
    /// Output queue saturated; nothing consumed. Poll, then retry.
    Full,
}

/// One pending output: the feature vector and the raw block it came from.
pub type FeaturePair = (Vec<f32>, Vec<u8>);

pub struct FeatureExtractor {
    computer: Option<Box<dyn FeatureComputer>>,
    samples_per_frame: usize,
    samples_per_shift: usize,
    pre_emphasis: f32,

    /// Bytes not yet forming a complete block.
    pending: Vec<u8>,
    /// Rolling sample window, at least one frame once warmed up.
    samples: Vec<f32>,
    queue: VecDeque<FeaturePair>,
    capacity: usize,
    full: bool,
}

impl FeatureExtractor {
    pub fn new(
        computer: Box<dyn FeatureComputer>,
        samples_per_frame: usize,
        samples_per_shift: usize,
        pre_emphasis: f32,
    ) -> Self {
        Self {
            computer: Some(computer),
            samples_per_frame,
            samples_per_shift,
            pre_emphasis,
            pending: Vec::new(),
            samples: Vec::with_capacity(samples_per_frame + samples_per_shift),
            queue: VecDeque::new(),
            capacity: EXTRACTOR_QUEUE_CAPACITY,
            full: false,
        }
    }

    /// Bytes forming one complete block (one shift of 16-bit samples).
    #[inline]
    pub fn block_bytes(&self) -> usize {
        self.samples_per_shift * 2
    }

    /// True while the output queue has no room; writes are refused.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Offer raw 16-bit little-endian PCM bytes.
    pub fn write(&mut self, bytes: &[u8]) -> Result<WriteOutcome, ExtractorError> {
        if self.computer.is_none() {
            return Err(ExtractorError::Destroyed);
        }
        if self.full {
            return Ok(WriteOutcome::Full);
        }
        self.pending.extend_from_slice(bytes);
        self.process_pending()?;
        Ok(WriteOutcome::Accepted)
    }

    /// Take the next `(features, block)` pair, oldest first. Freeing queue
    /// space clears the full flag and resumes processing of buffered
    /// bytes — this is the drain signal.
    pub fn poll(&mut self) -> Option<FeaturePair> {
        let pair = self.queue.pop_front();
        if self.full && self.queue.len() < self.capacity {
            self.full = false;
            trace!("extractor queue drained, resuming");
            // Best effort: buffered blocks that were parked while full.
            // A computation error here will resurface on the next write.
            let _ = self.process_pending();
        }
        pair
    }

    /// Release the block buffer and the computation primitive. Idempotent;
    /// any later write fails with [`ExtractorError::Destroyed`].
    pub fn destroy(&mut self) {
        self.computer = None;
        self.pending = Vec::new();
        self.samples = Vec::new();
        self.queue.clear();
        self.full = false;
    }

    fn process_pending(&mut self) -> Result<(), ExtractorError> {
        let block_bytes = self.block_bytes();
        while self.queue.len() < self.capacity && self.pending.len() >= block_bytes {
            let block: Vec<u8> = self.pending.drain(..block_bytes).collect();
            let new_samples = self.pre_emphasize(&block);

            if self.samples.len() >= self.samples_per_frame {
                // Slide: discard the oldest shift, append the new one.
                self.samples.drain(..new_samples.len());
                self.samples.extend_from_slice(&new_samples);

                let computer = self.computer.as_mut().ok_or(ExtractorError::Destroyed)?;
                let coeffs = computer.compute(&self.samples[..self.samples_per_frame])?;
                // Coefficient 0 carries frame energy, not timbre.
                let features = coeffs.get(1..).map(<[f32]>::to_vec).unwrap_or_default();
                self.queue.push_back((features, block));
                if self.queue.len() >= self.capacity {
                    self.full = true;
                    trace!("extractor queue saturated");
                }
            } else {
                self.samples.extend_from_slice(&new_samples);
            }
        }
        Ok(())
    }

    /// First-order pre-emphasis over one block of 16-bit samples; the
    /// block's first sample uses 0 as its predecessor.
    fn pre_emphasize(&self, block: &[u8]) -> Vec<f32> {
        let coef = self.pre_emphasis;
        let mut prev = 0.0f32;
        block
            .chunks_exact(2)
            .map(|b| {
                let v = i16::from_le_bytes([b[0], b[1]]) as f32;
                let emphasized = v - coef * prev;
                prev = v;
                int16_to_float32(emphasized)
            })
            .collect()
    }
}

/// Scale an i16-domain value into [-1, 1], asymmetric like the integer
/// range itself.
#[inline]
fn int16_to_float32(v: f32) -> f32 {
    let scaled = if v < 0.0 { v / 32_768.0 } else { v / 32_767.0 };
    scaled.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts frames and records what it saw; no real DSP.
    struct Probe {
        frame_size: usize,
        calls: usize,
    }

    impl FeatureComputer for Probe {
        fn frame_size(&self) -> usize {
            self.frame_size
        }
        fn compute(&mut self, frame: &[f32]) -> Result<Vec<f32>, MfccError> {
            self.calls += 1;
            assert_eq!(frame.len(), self.frame_size);
            Ok(vec![frame.iter().sum::<f32>(); 4])
        }
    }

    fn extractor(frame: usize, shift: usize) -> FeatureExtractor {
        FeatureExtractor::new(
            Box::new(Probe {
                frame_size: frame,
                calls: 0,
            }),
            frame,
            shift,
            0.97,
        )
    }

    fn pcm_bytes(samples: usize, value: i16) -> Vec<u8> {
        std::iter::repeat_n(value.to_le_bytes(), samples)
            .flatten()
            .collect()
    }

    #[test]
    fn emits_nothing_until_one_frame_accumulates() {
        let mut ex = extractor(480, 160);
        // three blocks fill the frame buffer exactly; none may emit yet
        for _ in 0..3 {
            assert_eq!(
                ex.write(&pcm_bytes(160, 100)).expect("write"),
                WriteOutcome::Accepted
            );
        }
        assert!(ex.poll().is_none());
        // the fourth block slides the window and emits one pair
        ex.write(&pcm_bytes(160, 100)).expect("write");
        let (features, block) = ex.poll().expect("pair");
        assert_eq!(features.len(), 3); // coefficient 0 dropped
        assert_eq!(block.len(), 320);
        assert!(ex.poll().is_none());
    }

    #[test]
    fn one_pair_per_block_once_warm() {
        let mut ex = extractor(480, 160);
        ex.write(&pcm_bytes(480 + 160 * 5, 50)).expect("write");
        let mut pairs = 0;
        while ex.poll().is_some() {
            pairs += 1;
        }
        assert_eq!(pairs, 5);
    }

    #[test]
    fn partial_blocks_are_held_back() {
        let mut ex = extractor(480, 160);
        ex.write(&pcm_bytes(480, 10)).expect("write");
        ex.write(&pcm_bytes(100, 10)).expect("write"); // not a full block
        assert!(ex.poll().is_none());
        ex.write(&pcm_bytes(60, 10)).expect("write"); // completes the block
        assert!(ex.poll().is_some());
    }

    #[test]
    fn saturation_refuses_writes_until_polled() {
        let mut ex = extractor(480, 160);
        // enough audio to overflow the queue capacity
        let blocks = EXTRACTOR_QUEUE_CAPACITY + 10;
        ex.write(&pcm_bytes(480 + 160 * blocks, 1)).expect("write");
        assert!(ex.is_full());
        assert_eq!(
            ex.write(&pcm_bytes(160, 1)).expect("write"),
            WriteOutcome::Full
        );
        // draining one pair resumes processing of parked bytes
        assert!(ex.poll().is_some());
        let mut total = 1;
        while ex.poll().is_some() {
            total += 1;
        }
        assert_eq!(total, blocks);
        assert!(!ex.is_full());
    }

    #[test]
    fn destroy_is_idempotent_and_fatal_to_writes() {
        let mut ex = extractor(480, 160);
        ex.destroy();
        ex.destroy();
        assert!(matches!(
            ex.write(&[0u8; 320]),
            Err(ExtractorError::Destroyed)
        ));
    }

    #[test]
    fn pre_emphasis_block_start_uses_zero_predecessor() {
        let ex = extractor(480, 160);
        let block = pcm_bytes(2, 1000);
        let out = ex.pre_emphasize(&block);
        // first sample: 1000 - 0.97*0 = 1000; second: 1000 - 0.97*1000 = 30
        assert!((out[0] - 1000.0 / 32_767.0).abs() < 1e-6);
        assert!((out[1] - 30.0 / 32_767.0).abs() < 1e-6);
    }
}

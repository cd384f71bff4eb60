//! Detector orchestration.
//!
//! Wires the pipeline together: voice-activity gate → streaming feature
//! extraction → bounded sliding window → template scoring → peak-detection
//! state machine. One detector instance owns every stage; processing is
//! single-threaded and synchronous, with events returned from `process`
//! in pipeline order.
//!
//! Emission happens only at local maxima of the similarity curve: a
//! detection fires when the best keyword's score first drops below the
//! previous pass's score for the same keyword, which suppresses the
//! chattering a plain threshold crossing would produce across one
//! utterance.

use std::collections::VecDeque;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use log::{debug, trace};
use thiserror::Error;

use crate::audio::{AudioError, AudioFmt};
use crate::config::{DetectorConfig, KeywordOptions};
use crate::constants::DETECTION_AUDIO_SPAN_FACTOR;
use crate::dsp::{
    AveragerError, FeatureComparator, FeatureComputer, FeatureNormalizer, Mfcc, MfccError,
};
use crate::extractor::{ExtractorError, FeatureExtractor, WriteOutcome};
use crate::keyword::Keyword;
use crate::vad::{EnergyVad, VoiceActivity, VoiceActivityFilter};
use crate::wav::{WavError, decode_wav};

/// Errors surfaced by detector operations.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector used after destroy")]
    Destroyed,
    #[error("unknown keyword \"{0}\"")]
    UnknownKeyword(String),
    #[error("template produced no feature frames")]
    EmptyTemplate,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Extraction(#[from] ExtractorError),
    #[error(transparent)]
    Mfcc(#[from] MfccError),
    #[error(transparent)]
    Averaging(#[from] AveragerError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Wav(#[from] WavError),
}

/// Zero-or-more of these come back from every `process` call, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    /// The sliding window first reached the shortest template length.
    /// Fires exactly once per buffering cycle.
    Ready,
    Detection(Detection),
}

/// A recognized keyword occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub keyword: String,
    /// Peak similarity score over the utterance.
    pub score: f32,
    /// Threshold that was in effect for this keyword.
    pub threshold: f32,
    /// Template frame count the match was scored against.
    pub frames: usize,
    /// Evidencing audio span (raw internal PCM).
    pub audio: Vec<u8>,
    /// Unix epoch milliseconds at emission.
    pub timestamp_ms: u64,
}

/// Result of a one-off, non-streaming [`WakewordDetector::match_audio`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub keyword: String,
    pub score: f32,
    pub threshold: f32,
    pub frames: usize,
    pub duration_ms: u64,
}

/// Running best-match state of the peak detector.
#[derive(Debug, Clone)]
struct BestMatch {
    keyword: Option<String>,
    score: f32,
    threshold: f32,
    frames: usize,
}

impl BestMatch {
    fn empty(threshold: f32) -> Self {
        Self {
            keyword: None,
            score: 0.0,
            threshold,
            frames: 0,
        }
    }
}

/// Builds coefficient primitives for `(frame_size, sample_rate)`; the
/// detector needs fresh instances for one-off extraction runs.
pub type MfccFactory = Box<dyn Fn(usize, u32) -> Result<Box<dyn FeatureComputer>, MfccError>>;

/* ─────────────────────────── builder ───────────────────────────────── */

/// Assembles a [`WakewordDetector`], optionally swapping the built-in
/// VAD / MFCC primitives for external ones.
pub struct WakewordDetectorBuilder {
    config: DetectorConfig,
    vad: Option<Box<dyn VoiceActivity>>,
    mfcc_factory: Option<MfccFactory>,
}

impl WakewordDetectorBuilder {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            vad: None,
            mfcc_factory: None,
        }
    }

    /// Install an external voice-activity primitive. Implies VAD gating
    /// regardless of `config.vad`.
    pub fn vad(mut self, vad: Box<dyn VoiceActivity>) -> Self {
        self.vad = Some(vad);
        self
    }

    /// Install an external coefficient-primitive factory.
    pub fn mfcc_factory(mut self, factory: MfccFactory) -> Self {
        self.mfcc_factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<WakewordDetector, DetectorError> {
        let cfg = self.config;
        cfg.validate().map_err(DetectorError::InvalidConfig)?;

        let samples_per_frame = cfg.samples_per_frame();
        let samples_per_shift = cfg.samples_per_shift();

        let mfcc_factory: MfccFactory = self.mfcc_factory.unwrap_or_else(|| {
            Box::new(|frame_size, sample_rate| {
                Ok(Box::new(Mfcc::new(frame_size, sample_rate)?) as Box<dyn FeatureComputer>)
            })
        });

        let use_vad = cfg.vad || self.vad.is_some();
        let vad = if use_vad {
            let primitive = self
                .vad
                .unwrap_or_else(|| Box::new(EnergyVad::new(cfg.vad_mode)));
            Some(VoiceActivityFilter::new(
                primitive,
                cfg.sample_rate,
                cfg.vad_debounce,
            ))
        } else {
            None
        };

        let extractor = FeatureExtractor::new(
            mfcc_factory(samples_per_frame, cfg.sample_rate)?,
            samples_per_frame,
            samples_per_shift,
            cfg.pre_emphasis,
        );

        Ok(WakewordDetector {
            sample_rate: cfg.sample_rate,
            samples_per_frame,
            samples_per_shift,
            pre_emphasis: cfg.pre_emphasis,
            threshold: cfg.threshold,
            use_vad,
            comparator: FeatureComparator::new(cfg.score_ref, cfg.band_size),
            mfcc_factory,
            extractor: Some(extractor),
            vad,
            keywords: IndexMap::new(),
            frames: VecDeque::new(),
            chunks: VecDeque::new(),
            state: BestMatch::empty(cfg.threshold),
            buffering: true,
            min_frames: usize::MAX,
            max_frames: 0,
            destroyed: false,
        })
    }
}

/* ─────────────────────────── detector ──────────────────────────────── */

pub struct WakewordDetector {
    sample_rate: u32,
    samples_per_frame: usize,
    samples_per_shift: usize,
    pre_emphasis: f32,
    threshold: f32,
    use_vad: bool,

    comparator: FeatureComparator,
    mfcc_factory: MfccFactory,
    extractor: Option<FeatureExtractor>,
    vad: Option<VoiceActivityFilter>,

    keywords: IndexMap<String, Keyword>,
    frames: VecDeque<Vec<f32>>,
    chunks: VecDeque<Vec<u8>>,
    state: BestMatch,
    buffering: bool,
    min_frames: usize,
    max_frames: usize,
    destroyed: bool,
}

impl WakewordDetector {
    /// Build with the built-in primitives.
    pub fn new(config: DetectorConfig) -> Result<Self, DetectorError> {
        WakewordDetectorBuilder::new(config).build()
    }

    /// Start a builder for custom primitive injection.
    pub fn builder(config: DetectorConfig) -> WakewordDetectorBuilder {
        WakewordDetectorBuilder::new(config)
    }

    /* ---------------- keyword management ---------------- */

    /// Enroll (or extend) a keyword from raw internal-format PCM template
    /// sources. Creates the keyword on first call for a new name; later
    /// calls append templates and refresh the averaged template.
    pub fn add_keyword<B: AsRef<[u8]>>(
        &mut self,
        name: &str,
        templates: &[B],
        options: KeywordOptions,
    ) -> Result<(), DetectorError> {
        self.ensure_live()?;
        if !self.keywords.contains_key(name) {
            self.keywords
                .insert(name.to_string(), Keyword::new(name, options));
        }
        for template in templates {
            let features = self.extract_features(template.as_ref())?;
            if features.is_empty() {
                return Err(DetectorError::EmptyTemplate);
            }
            self.min_frames = self.min_frames.min(features.len());
            self.max_frames = self.max_frames.max(features.len());
            let kw = self
                .keywords
                .get_mut(name)
                .ok_or_else(|| DetectorError::UnknownKeyword(name.to_string()))?;
            kw.add_features(features)?;
        }
        if let Some(kw) = self.keywords.get(name) {
            debug!(
                "keyword '{}': {} enrollment(s), window bounds {}..{} frames",
                name,
                kw.enrollments(),
                self.min_frames,
                self.max_frames
            );
        }
        Ok(())
    }

    /// Enroll from WAV-encoded template sources (any supported rate,
    /// channel count or sample width; converted internally).
    pub fn add_keyword_wav<B: AsRef<[u8]>>(
        &mut self,
        name: &str,
        wav_templates: &[B],
        options: KeywordOptions,
    ) -> Result<(), DetectorError> {
        self.ensure_live()?;
        let mut pcm = Vec::with_capacity(wav_templates.len());
        for wav in wav_templates {
            pcm.push(decode_wav(wav.as_ref(), self.sample_rate)?);
        }
        self.add_keyword(name, &pcm, options)
    }

    pub fn remove_keyword(&mut self, name: &str) -> Result<(), DetectorError> {
        self.ensure_live()?;
        self.keywords
            .shift_remove(name)
            .map(|_| debug!("keyword '{name}' removed"))
            .ok_or_else(|| DetectorError::UnknownKeyword(name.to_string()))
    }

    pub fn clear_keywords(&mut self) -> Result<(), DetectorError> {
        self.ensure_live()?;
        self.keywords.clear();
        Ok(())
    }

    pub fn enable_keyword(&mut self, name: &str) -> Result<(), DetectorError> {
        self.set_keyword_enabled(name, true)
    }

    pub fn disable_keyword(&mut self, name: &str) -> Result<(), DetectorError> {
        self.set_keyword_enabled(name, false)
    }

    fn set_keyword_enabled(&mut self, name: &str, enabled: bool) -> Result<(), DetectorError> {
        self.ensure_live()?;
        let kw = self
            .keywords
            .get_mut(name)
            .ok_or_else(|| DetectorError::UnknownKeyword(name.to_string()))?;
        kw.enabled = enabled;
        Ok(())
    }

    /* ---------------- streaming API ---------------- */

    /// Feed one chunk of audio. With `resample_from`, the chunk is first
    /// converted from the given format to the detector's internal one
    /// (mono, 16-bit LE, configured rate).
    ///
    /// Chunks are dropped without effect while no keyword is enrolled,
    /// while the extractor signals backpressure, or when the activity
    /// filter classifies them as silence.
    pub fn process(
        &mut self,
        audio: &[u8],
        resample_from: Option<AudioFmt>,
    ) -> Result<Vec<DetectorEvent>, DetectorError> {
        self.ensure_live()?;
        if self.keywords.is_empty() {
            trace!("no keywords enrolled, dropping chunk");
            return Ok(Vec::new());
        }

        let converted;
        let bytes: &[u8] = match resample_from {
            Some(fmt) => {
                converted = fmt.convert_to(audio, self.sample_rate)?;
                &converted
            }
            None => audio,
        };

        if self.is_full() {
            trace!("backpressure, dropping chunk");
            return Ok(Vec::new());
        }

        if self.use_vad {
            let vad = self.vad.as_mut().ok_or(DetectorError::Destroyed)?;
            if !vad.process_audio(bytes) {
                trace!("silence, dropping chunk");
                return Ok(Vec::new());
            }
        }

        let extractor = self.extractor.as_mut().ok_or(DetectorError::Destroyed)?;
        if extractor.write(bytes)? == WriteOutcome::Full {
            trace!("extractor refused chunk");
        }

        let mut events = Vec::new();
        while let Some((features, chunk)) = self.extractor.as_mut().and_then(FeatureExtractor::poll)
        {
            self.process_features(features, chunk, &mut events);
        }
        Ok(events)
    }

    /// One-off, non-streaming match of a complete audio buffer against all
    /// enabled keywords.
    pub fn match_audio(&self, audio: &[u8]) -> Result<Option<MatchResult>, DetectorError> {
        self.ensure_live()?;
        let started = Instant::now();
        let features = self.extract_features(audio)?;
        let result = self.best_keyword(&features);
        Ok(result.keyword.map(|keyword| MatchResult {
            keyword,
            score: result.score,
            threshold: result.threshold,
            frames: result.frames,
            duration_ms: started.elapsed().as_millis() as u64,
        }))
    }

    /// Run a complete buffer of internal-format PCM through a fresh
    /// extraction pipeline and return the mean-normalized frame matrix.
    pub fn extract_features(&self, audio: &[u8]) -> Result<Vec<Vec<f32>>, DetectorError> {
        self.ensure_live()?;
        let computer = (self.mfcc_factory)(self.samples_per_frame, self.sample_rate)?;
        let mut extractor = FeatureExtractor::new(
            computer,
            self.samples_per_frame,
            self.samples_per_shift,
            self.pre_emphasis,
        );

        let mut frames: Vec<Vec<f32>> = Vec::new();
        let block = extractor.block_bytes();
        for piece in audio.chunks(block) {
            loop {
                match extractor.write(piece)? {
                    WriteOutcome::Accepted => break,
                    WriteOutcome::Full => {
                        while let Some((f, _)) = extractor.poll() {
                            frames.push(f);
                        }
                    }
                }
            }
        }
        while let Some((f, _)) = extractor.poll() {
            frames.push(f);
        }

        FeatureNormalizer::normalize(&mut frames);
        Ok(frames)
    }

    /// Drop the sliding window and re-enter buffering. Enrollments are
    /// kept.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.chunks.clear();
        self.state = BestMatch::empty(self.threshold);
        self.buffering = true;
    }

    /// Tear down the pipeline, releasing the activity filter, the
    /// extractor and all enrollments. Idempotent; every later operation
    /// fails with [`DetectorError::Destroyed`].
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.vad = None;
        if let Some(mut extractor) = self.extractor.take() {
            extractor.destroy();
        }
        self.keywords.clear();
        self.reset();
        self.destroyed = true;
        debug!("detector destroyed");
    }

    /* ---------------- introspection ---------------- */

    /// Backpressure flag: true while the extraction queue is saturated.
    pub fn is_full(&self) -> bool {
        self.extractor
            .as_ref()
            .is_some_and(FeatureExtractor::is_full)
    }

    /// True until the sliding window first reaches the shortest template.
    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    /// Shortest enrolled template length, if any template exists.
    pub fn min_frames(&self) -> Option<usize> {
        (self.min_frames != usize::MAX).then_some(self.min_frames)
    }

    /// Longest enrolled template length, if any template exists.
    pub fn max_frames(&self) -> Option<usize> {
        (self.max_frames != 0).then_some(self.max_frames)
    }

    /* ---------------- internals ---------------- */

    fn ensure_live(&self) -> Result<(), DetectorError> {
        if self.destroyed {
            Err(DetectorError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn process_features(
        &mut self,
        features: Vec<f32>,
        chunk: Vec<u8>,
        events: &mut Vec<DetectorEvent>,
    ) {
        self.frames.push_back(features);
        self.chunks.push_back(chunk);
        let n = self.frames.len();
        if n >= self.min_frames {
            if self.buffering {
                self.buffering = false;
                debug!("window warm at {n} frames, detector ready");
                events.push(DetectorEvent::Ready);
            }
            if let Some(detection) = self.run_detection() {
                events.push(DetectorEvent::Detection(detection));
            }
        }
        // After an emission the window is already empty and this is a no-op.
        if n >= self.max_frames {
            self.frames.pop_front();
            self.chunks.pop_front();
        }
    }

    fn run_detection(&mut self) -> Option<Detection> {
        let window: Vec<Vec<f32>> = self.frames.iter().cloned().collect();
        let features = FeatureNormalizer::normalized(&window);
        let result = self.best_keyword(&features);
        self.advance_state(result)
    }

    /// Score the normalized window against every enabled keyword and keep
    /// the best candidate at or above its effective threshold. Ties keep
    /// the earlier-seen candidate.
    fn best_keyword(&self, features: &[Vec<f32>]) -> BestMatch {
        let mut best = BestMatch::empty(self.threshold);
        for kw in self.keywords.values() {
            if !kw.enabled {
                continue;
            }
            let threshold = if kw.threshold() > 0.0 {
                kw.threshold()
            } else {
                self.threshold
            };
            for template in kw.templates() {
                if template.is_empty() {
                    continue;
                }
                let start = features.len().saturating_sub(template.len());
                let score = self.comparator.compare(template, &features[start..]);
                if score < threshold || score <= best.score {
                    continue;
                }
                best = BestMatch {
                    keyword: Some(kw.name().to_string()),
                    score,
                    threshold,
                    frames: template.len(),
                };
            }
        }
        best
    }

    /// Peak-detection rule: emit only when the same keyword's score first
    /// drops below the previous pass's score; otherwise store the new
    /// result and keep listening.
    fn advance_state(&mut self, result: BestMatch) -> Option<Detection> {
        if let Some(keyword) = &result.keyword
            && self.state.keyword.as_deref() == Some(keyword.as_str())
            && result.score < self.state.score
        {
            let span = (DETECTION_AUDIO_SPAN_FACTOR * result.frames as f32).round() as usize;
            let start = self.chunks.len().saturating_sub(span);
            let audio: Vec<u8> = self
                .chunks
                .iter()
                .skip(start)
                .flat_map(|c| c.iter().copied())
                .collect();
            let detection = Detection {
                keyword: keyword.clone(),
                score: self.state.score,
                threshold: result.threshold,
                frames: result.frames,
                audio,
                timestamp_ms: unix_millis(),
            };
            debug!(
                "detected '{}' (score {:.3}, threshold {:.2}, {} frames)",
                detection.keyword, detection.score, detection.threshold, detection.frames
            );
            self.reset();
            return Some(detection);
        }
        self.state = result;
        None
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/* ───────────────────────────── tests ──────────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> WakewordDetector {
        WakewordDetector::new(DetectorConfig::default()).expect("build")
    }

    fn best(keyword: Option<&str>, score: f32) -> BestMatch {
        BestMatch {
            keyword: keyword.map(str::to_string),
            score,
            threshold: 0.5,
            frames: 10,
        }
    }

    /// Load the window with dummy chunks so emission can slice audio.
    fn warm_window(det: &mut WakewordDetector, frames: usize) {
        for i in 0..frames {
            det.frames.push_back(vec![i as f32; 4]);
            det.chunks.push_back(vec![i as u8; 320]);
        }
    }

    #[test]
    fn peak_is_emitted_once_on_first_decline() {
        let mut det = detector();
        warm_window(&mut det, 14);

        // below threshold -> no candidate at all
        assert!(det.advance_state(best(None, 0.0)).is_none());
        // rising scores only move the stored state
        assert!(det.advance_state(best(Some("lumos"), 0.6)).is_none());
        assert!(det.advance_state(best(Some("lumos"), 0.8)).is_none());
        // first decline emits the stored peak
        let detection = det
            .advance_state(best(Some("lumos"), 0.7))
            .expect("peak emission");
        assert_eq!(detection.keyword, "lumos");
        assert!((detection.score - 0.8).abs() < 1e-6);
        assert_eq!(detection.frames, 10);
        // round(1.2 * 10) = 12 chunks of 320 bytes
        assert_eq!(detection.audio.len(), 12 * 320);
        assert!(detection.timestamp_ms > 0);

        // window and state reset: the trailing decline cannot re-emit
        assert!(det.frames.is_empty());
        assert!(det.is_buffering());
        assert!(det.advance_state(best(Some("lumos"), 0.7)).is_none());
    }

    #[test]
    fn keyword_change_replaces_state_without_emitting() {
        let mut det = detector();
        warm_window(&mut det, 14);
        assert!(det.advance_state(best(Some("lumos"), 0.8)).is_none());
        assert!(det.advance_state(best(Some("nox"), 0.6)).is_none());
        assert_eq!(det.state.keyword.as_deref(), Some("nox"));
    }

    #[test]
    fn equal_score_does_not_emit() {
        let mut det = detector();
        warm_window(&mut det, 14);
        assert!(det.advance_state(best(Some("lumos"), 0.8)).is_none());
        assert!(det.advance_state(best(Some("lumos"), 0.8)).is_none());
    }

    #[test]
    fn short_window_clamps_the_audio_span() {
        let mut det = detector();
        warm_window(&mut det, 5); // fewer chunks than round(1.2 * frames)
        assert!(det.advance_state(best(Some("lumos"), 0.9)).is_none());
        let detection = det
            .advance_state(best(Some("lumos"), 0.2))
            .expect("emission");
        assert_eq!(detection.audio.len(), 5 * 320);
    }

    #[test]
    fn destroyed_detector_rejects_every_operation() {
        let mut det = detector();
        det.destroy();
        det.destroy(); // idempotent

        assert!(matches!(
            det.process(&[0u8; 320], None),
            Err(DetectorError::Destroyed)
        ));
        assert!(matches!(
            det.add_keyword("x", &[&[0u8; 320][..]], KeywordOptions::default()),
            Err(DetectorError::Destroyed)
        ));
        assert!(matches!(
            det.enable_keyword("x"),
            Err(DetectorError::Destroyed)
        ));
        assert!(matches!(det.match_audio(&[]), Err(DetectorError::Destroyed)));
    }

    #[test]
    fn unknown_keyword_operations_fail_cleanly() {
        let mut det = detector();
        assert!(matches!(
            det.enable_keyword("missing"),
            Err(DetectorError::UnknownKeyword(_))
        ));
        assert!(matches!(
            det.disable_keyword("missing"),
            Err(DetectorError::UnknownKeyword(_))
        ));
        assert!(matches!(
            det.remove_keyword("missing"),
            Err(DetectorError::UnknownKeyword(_))
        ));
        assert!(det.keywords.is_empty());
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let cfg = DetectorConfig {
            threshold: 2.0,
            ..Default::default()
        };
        assert!(matches!(
            WakewordDetector::new(cfg),
            Err(DetectorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn processing_without_keywords_drops_chunks() {
        let mut det = detector();
        let events = det.process(&[0u8; 320], None).expect("process");
        assert!(events.is_empty());
        assert!(det.frames.is_empty());
    }
}

//! Energy-based utterance segmentation
//!
//! Splits a live sample stream into utterances: speech starts when a chunk's
//! RMS crosses the threshold and ends after enough trailing silence.

use crate::config::CaptureConfig;

/// Segmenter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Waiting for speech
    Idle,
    /// Speech heard, accumulating until trailing silence
    Speaking,
    /// An utterance is ready to be taken
    Complete,
}

/// Accumulates one utterance at a time from pushed audio chunks
#[derive(Debug)]
pub struct UtteranceSegmenter {
    threshold: f32,
    min_speech: usize,
    trailing_silence: usize,
    max_samples: usize,
    state: SegmentState,
    buffer: Vec<f32>,
    voiced: usize,
    silence: usize,
}

impl UtteranceSegmenter {
    /// Create a segmenter for audio at `sample_rate`
    #[must_use]
    pub fn new(config: &CaptureConfig, sample_rate: u32) -> Self {
        let samples = |d: std::time::Duration| {
            usize::try_from(d.as_millis() * u128::from(sample_rate) / 1000).unwrap_or(usize::MAX)
        };

        Self {
            threshold: config.energy_threshold,
            min_speech: samples(config.min_speech),
            trailing_silence: samples(config.trailing_silence),
            max_samples: samples(config.max_utterance).max(1),
            state: SegmentState::Idle,
            buffer: Vec::new(),
            voiced: 0,
            silence: 0,
        }
    }

    /// Feed a chunk of samples
    ///
    /// Returns `true` once an utterance is complete; further chunks are
    /// ignored until it is taken.
    pub fn push(&mut self, chunk: &[f32]) -> bool {
        if chunk.is_empty() {
            return self.state == SegmentState::Complete;
        }

        let level = rms(chunk);
        let is_speech = level > self.threshold;

        match self.state {
            SegmentState::Complete => return true,
            SegmentState::Idle => {
                if !is_speech {
                    return false;
                }
                tracing::trace!(level, "speech started");
                self.state = SegmentState::Speaking;
                self.buffer.clear();
                self.voiced = 0;
                self.silence = 0;
            }
            SegmentState::Speaking => {}
        }

        self.buffer.extend_from_slice(chunk);
        if is_speech {
            self.voiced += chunk.len();
            self.silence = 0;
        } else {
            self.silence += chunk.len();
        }

        if self.silence >= self.trailing_silence {
            if self.voiced >= self.min_speech {
                self.finish("trailing silence");
                return true;
            }
            // A click or cough, not speech
            tracing::trace!(voiced = self.voiced, "discarding short noise");
            self.reset();
            return false;
        }

        if self.buffer.len() >= self.max_samples {
            self.finish("length cap");
            return true;
        }

        false
    }

    fn finish(&mut self, reason: &'static str) {
        tracing::debug!(samples = self.buffer.len(), reason, "utterance complete");
        self.state = SegmentState::Complete;
    }

    /// Take the completed utterance and return to idle
    ///
    /// Returns `None` if no utterance is complete yet.
    pub fn take_utterance(&mut self) -> Option<Vec<f32>> {
        if self.state != SegmentState::Complete {
            return None;
        }
        let utterance = std::mem::take(&mut self.buffer);
        self.reset();
        Some(utterance)
    }

    /// Drop any partial utterance
    pub fn reset(&mut self) {
        self.state = SegmentState::Idle;
        self.buffer.clear();
        self.voiced = 0;
        self.silence = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmentState {
        self.state
    }

    /// Whether speech has started
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state == SegmentState::Speaking
    }
}

/// Root-mean-square level of a chunk
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;

    fn loud(n: usize) -> Vec<f32> {
        vec![0.5; n]
    }

    fn quiet(n: usize) -> Vec<f32> {
        vec![0.0; n]
    }

    #[test]
    fn test_rms() {
        assert!(rms(&quiet(100)) < 0.001);
        assert!(rms(&loud(100)) > 0.4);
        assert!(rms(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_silence_never_starts() {
        let mut seg = UtteranceSegmenter::new(&CaptureConfig::default(), RATE);
        for _ in 0..50 {
            assert!(!seg.push(&quiet(1600)));
        }
        assert_eq!(seg.state(), SegmentState::Idle);
        assert!(seg.take_utterance().is_none());
    }

    #[test]
    fn test_speech_then_silence_completes() {
        let mut seg = UtteranceSegmenter::new(&CaptureConfig::default(), RATE);

        // 0.5s speech, then silence in 0.1s chunks
        assert!(!seg.push(&loud(8000)));
        assert!(seg.is_speaking());
        let mut done = false;
        for _ in 0..10 {
            if seg.push(&quiet(1600)) {
                done = true;
                break;
            }
        }
        assert!(done);

        let utterance = seg.take_utterance().unwrap();
        assert!(utterance.len() >= 8000 + 8000);
        assert_eq!(seg.state(), SegmentState::Idle);
    }

    #[test]
    fn test_short_noise_is_discarded() {
        let mut seg = UtteranceSegmenter::new(&CaptureConfig::default(), RATE);

        // 0.1s blip is below the 0.3s minimum
        seg.push(&loud(1600));
        for _ in 0..10 {
            assert!(!seg.push(&quiet(1600)));
        }
        assert_eq!(seg.state(), SegmentState::Idle);
    }

    #[test]
    fn test_length_cap() {
        let config = CaptureConfig {
            max_utterance: std::time::Duration::from_secs(1),
            ..CaptureConfig::default()
        };
        let mut seg = UtteranceSegmenter::new(&config, RATE);

        let mut chunks = 0;
        while !seg.push(&loud(1600)) {
            chunks += 1;
            assert!(chunks < 20, "cap never reached");
        }
        assert_eq!(seg.take_utterance().unwrap().len(), 16000);
    }

    #[test]
    fn test_complete_holds_until_taken() {
        let config = CaptureConfig {
            max_utterance: std::time::Duration::from_millis(100),
            ..CaptureConfig::default()
        };
        let mut seg = UtteranceSegmenter::new(&config, RATE);
        assert!(seg.push(&loud(1600)));
        assert!(seg.push(&loud(1600)));
        assert_eq!(seg.take_utterance().unwrap().len(), 1600);
    }
}

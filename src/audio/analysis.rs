use rayon::prelude::*;

use super::buffer::AudioBuffer;
use super::features::FeatureSet;
use super::onset::{self, OnsetParams};
use super::pitch::{self, PitchBand};
use super::AnalysisError;
use crate::config::{AnalysisConfig, Config};

/// Turns one finished take into a [`FeatureSet`].
///
/// Extraction is pure and never fails as a whole: an estimator that errors
/// out contributes its "not detected" value instead.
#[derive(Clone, Debug)]
pub struct FeatureExtractor {
    config: AnalysisConfig,
    audible_floor: f32,
}

impl FeatureExtractor {
    /// Settings the estimators cannot work with are replaced by defaults.
    pub fn new(config: AnalysisConfig, audible_floor: f32) -> Self {
        Self {
            config: sanitize(config),
            audible_floor,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.analysis.clone(), config.thresholds.quiet)
    }

    pub fn extract(&self, buffer: &AudioBuffer) -> FeatureSet {
        let duration_seconds = buffer.duration_seconds();
        if buffer.is_empty() {
            log::debug!("Empty take, skipping analysis");
            return FeatureSet::silent(duration_seconds);
        }

        let samples = buffer.normalized();
        let loudness = rms(&samples).min(1.0);

        // Pitch and onsets on an inaudible take only produce spurious hits
        if loudness <= self.audible_floor {
            log::debug!(
                "Loudness {:.4} at or below audible floor {:.4}, skipping pitch/onset",
                loudness,
                self.audible_floor
            );
            return FeatureSet {
                loudness,
                ..FeatureSet::silent(duration_seconds)
            };
        }

        let sample_rate = buffer.sample_rate();
        let (frame_length, hop_length) = self.frame_geometry(sample_rate);
        let frames = frame_grid(&samples, frame_length, hop_length);

        let voiced_ratio = self.voiced_ratio(&frames, sample_rate).unwrap_or_else(|e| {
            log::warn!("Pitch tracking failed, treating take as unvoiced: {}", e);
            0.0
        });

        let onset_params = OnsetParams {
            delta: self.config.onset_delta,
            min_gap_seconds: self.config.onset_min_gap_seconds,
        };
        let onset_count = onset::count_onsets(&frames, sample_rate, hop_length, onset_params)
            .unwrap_or_else(|e| {
                log::warn!("Onset detection failed, reporting no onsets: {}", e);
                0
            });

        let features = FeatureSet {
            loudness,
            voiced_ratio,
            onset_count,
            duration_seconds,
        };
        log::debug!(
            "Features: loudness={:.4}, voiced={:.2} ({} frames), onsets={}, duration={:.2}s",
            features.loudness,
            features.voiced_ratio,
            frames.len(),
            features.onset_count,
            features.duration_seconds
        );
        features
    }

    fn voiced_ratio(&self, frames: &[Vec<f32>], sample_rate: u32) -> Result<f32, AnalysisError> {
        if frames.is_empty() {
            return Err(AnalysisError::EmptyFrame);
        }
        let band = self.band();
        let threshold = self.config.yin_threshold;

        let pitches = frames
            .par_iter()
            .map(|frame| pitch::detect_pitch_yin(frame, sample_rate, band, threshold))
            .collect::<Result<Vec<_>, _>>()?;

        let voiced = pitches.iter().filter(|p| p.is_some()).count();
        Ok(voiced as f32 / pitches.len() as f32)
    }

    fn band(&self) -> PitchBand {
        PitchBand {
            min_hz: self.config.min_pitch_hz,
            max_hz: self.config.max_pitch_hz,
        }
    }

    /// Frame and hop lengths at `sample_rate`. The frame grows to hold two
    /// periods of the lowest pitch and the hop grows with it, keeping the
    /// configured overlap.
    fn frame_geometry(&self, sample_rate: u32) -> (usize, usize) {
        let frame_length = self
            .config
            .frame_length
            .max(self.band().required_frame(sample_rate));
        let hop_length = (self.config.hop_length * frame_length / self.config.frame_length).max(1);
        (frame_length, hop_length)
    }
}

fn sanitize(mut config: AnalysisConfig) -> AnalysisConfig {
    let defaults = AnalysisConfig::default();
    if config.frame_length == 0 {
        log::warn!("Frame length 0 is unusable, using {}", defaults.frame_length);
        config.frame_length = defaults.frame_length;
    }
    if config.hop_length == 0 || config.hop_length > config.frame_length {
        let hop_length = (config.frame_length / 4).max(1);
        log::warn!(
            "Hop length {} does not fit frame length {}, using {}",
            config.hop_length,
            config.frame_length,
            hop_length
        );
        config.hop_length = hop_length;
    }
    if !(config.min_pitch_hz > 0.0 && config.min_pitch_hz < config.max_pitch_hz) {
        log::warn!(
            "Pitch band {} Hz - {} Hz is unusable, using {} Hz - {} Hz",
            config.min_pitch_hz,
            config.max_pitch_hz,
            defaults.min_pitch_hz,
            defaults.max_pitch_hz
        );
        config.min_pitch_hz = defaults.min_pitch_hz;
        config.max_pitch_hz = defaults.max_pitch_hz;
    }
    config
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Split samples into overlapping frames of `frame_length`, `hop_length`
/// apart. A take shorter than one frame becomes a single zero-padded frame;
/// a trailing partial frame is dropped.
fn frame_grid(samples: &[f32], frame_length: usize, hop_length: usize) -> Vec<Vec<f32>> {
    if samples.len() <= frame_length {
        let mut frame = samples.to_vec();
        frame.resize(frame_length, 0.0);
        return vec![frame];
    }
    let count = 1 + (samples.len() - frame_length) / hop_length;
    (0..count)
        .map(|k| samples[k * hop_length..k * hop_length + frame_length].to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{Classifier, PerformanceTier};

    const RATE: u32 = 16000;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::from_config(&Config::default())
    }

    fn tone(freq: f32, amp: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        let len = (sample_rate as f32 * seconds) as usize;
        (0..len)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn all_zero_buffer_yields_zero_features() {
        let buf = AudioBuffer::new(vec![0; RATE as usize], RATE);
        let f = extractor().extract(&buf);
        assert_eq!(f.loudness, 0.0);
        assert_eq!(f.voiced_ratio, 0.0);
        assert_eq!(f.onset_count, 0);
        assert!((f.duration_seconds - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_buffer_yields_zero_features() {
        let f = extractor().extract(&AudioBuffer::empty(RATE));
        assert_eq!(f, FeatureSet::default());
    }

    #[test]
    fn steady_tone_is_voiced_with_single_onset() {
        let buf = AudioBuffer::from_f32(&tone(220.0, 0.5, RATE, 1.0), RATE);
        let f = extractor().extract(&buf);
        assert!((f.loudness - 0.5 / 2f32.sqrt()).abs() < 0.01, "loudness {}", f.loudness);
        assert!(f.voiced_ratio > 0.9, "voiced {}", f.voiced_ratio);
        assert_eq!(f.onset_count, 1);
    }

    #[test]
    fn tone_bursts_produce_onsets() {
        // four 250ms notes, each preceded by 250ms of silence
        let note = tone(330.0, 0.5, RATE, 0.25);
        let gap = vec![0.0f32; note.len()];
        let mut samples = Vec::new();
        for _ in 0..4 {
            samples.extend_from_slice(&gap);
            samples.extend_from_slice(&note);
        }
        let f = extractor().extract(&AudioBuffer::from_f32(&samples, RATE));
        assert_eq!(f.onset_count, 4);
        assert!(f.voiced_ratio > 0.0);
        assert!(f.voiced_ratio < 1.0);
    }

    #[test]
    fn note_releases_are_not_onsets() {
        // three 1s notes, each preceded by 250ms of silence
        let note = tone(262.0, 0.4, RATE, 1.0);
        let gap = vec![0.0f32; RATE as usize / 4];
        let mut samples = Vec::new();
        for _ in 0..3 {
            samples.extend_from_slice(&gap);
            samples.extend_from_slice(&note);
        }
        let f = extractor().extract(&AudioBuffer::from_f32(&samples, RATE));
        assert_eq!(f.onset_count, 3);
    }

    #[test]
    fn inaudible_take_skips_estimators() {
        let buf = AudioBuffer::from_f32(&tone(220.0, 0.004, RATE, 1.0), RATE);
        let f = extractor().extract(&buf);
        assert!(f.loudness > 0.0);
        assert!(f.loudness <= 0.005);
        assert_eq!(f.voiced_ratio, 0.0);
        assert_eq!(f.onset_count, 0);
    }

    #[test]
    fn estimator_failures_fall_back_to_not_detected() {
        let samples = tone(220.0, 0.5, RATE, 1.0);
        let buf = AudioBuffer::from_f32(&samples, 0);
        let f = extractor().extract(&buf);
        assert!(f.loudness > 0.3);
        assert_eq!(f.voiced_ratio, 0.0);
        assert_eq!(f.onset_count, 0);
    }

    #[test]
    fn sung_notes_score_alike_at_common_sample_rates() {
        let classifier = Classifier::default();
        for rate in [16000, 44100, 48000, 88200, 96000] {
            let note = tone(220.0, 0.3, rate, 1.0);
            let gap = vec![0.0f32; rate as usize / 4];
            let mut samples = Vec::new();
            for _ in 0..2 {
                samples.extend_from_slice(&gap);
                samples.extend_from_slice(&note);
            }
            let f = extractor().extract(&AudioBuffer::from_f32(&samples, rate));
            assert!(f.voiced_ratio > 0.6, "{} Hz: voiced {}", rate, f.voiced_ratio);
            assert_eq!(f.onset_count, 2, "{} Hz", rate);
            assert_eq!(classifier.classify(&f).tier, PerformanceTier::Excellent, "{} Hz", rate);
        }
    }

    #[test]
    fn frame_grows_with_sample_rate() {
        let ex = extractor();
        assert_eq!(ex.frame_geometry(16000), (2048, 512));
        let (frame, hop) = ex.frame_geometry(96000);
        assert!(frame >= 2 * (96000.0f32 / 65.41).ceil() as usize);
        assert_eq!(hop, 512 * frame / 2048);
    }

    #[test]
    fn unusable_settings_are_replaced() {
        let config = AnalysisConfig {
            frame_length: 0,
            hop_length: 0,
            min_pitch_hz: 0.0,
            ..AnalysisConfig::default()
        };
        let ex = FeatureExtractor::new(config, 0.005);
        let f = ex.extract(&AudioBuffer::from_f32(&tone(220.0, 0.5, RATE, 0.5), RATE));
        assert!(f.voiced_ratio > 0.9, "voiced {}", f.voiced_ratio);
        assert_eq!(f.onset_count, 1);

        let ex = FeatureExtractor::new(
            AnalysisConfig {
                hop_length: 0,
                ..AnalysisConfig::default()
            },
            0.005,
        );
        assert_eq!(ex.frame_geometry(RATE), (2048, 512));
    }

    #[test]
    fn short_take_is_padded_to_one_frame() {
        let frames = frame_grid(&[0.5; 100], 2048, 512);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 2048);
        assert_eq!(frame_grid(&[0.0; 4096], 2048, 512).len(), 5);
    }

    #[test]
    fn extraction_is_deterministic() {
        let buf = AudioBuffer::from_f32(&tone(440.0, 0.3, RATE, 0.5), RATE);
        let ex = extractor();
        assert_eq!(ex.extract(&buf), ex.extract(&buf));
    }
}

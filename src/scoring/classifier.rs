use serde::Serialize;

use crate::audio::FeatureSet;
use crate::config::Thresholds;

/// Discrete performance grade, ordered from worst to best.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PerformanceTier {
    Silent,
    Poor,
    Ok,
    Good,
    Excellent,
}

impl PerformanceTier {
    pub const ALL: [PerformanceTier; 5] = [
        PerformanceTier::Silent,
        PerformanceTier::Poor,
        PerformanceTier::Ok,
        PerformanceTier::Good,
        PerformanceTier::Excellent,
    ];

    /// Stars awarded for this tier (0-3).
    pub fn reward(self) -> u32 {
        match self {
            PerformanceTier::Silent | PerformanceTier::Poor => 0,
            PerformanceTier::Ok => 1,
            PerformanceTier::Good => 2,
            PerformanceTier::Excellent => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PerformanceTier::Silent => "silent",
            PerformanceTier::Poor => "poor",
            PerformanceTier::Ok => "ok",
            PerformanceTier::Good => "good",
            PerformanceTier::Excellent => "excellent",
        }
    }
}

/// Which threshold tests a take passed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PerformanceFlags {
    pub audible: bool,
    pub loud: bool,
    pub very_loud: bool,
    pub has_pitch: bool,
    pub has_rhythm: bool,
}

impl PerformanceFlags {
    pub fn evaluate(features: &FeatureSet, thresholds: &Thresholds) -> Self {
        Self {
            audible: features.loudness > thresholds.quiet,
            loud: features.loudness > thresholds.medium,
            very_loud: features.loudness > thresholds.loud,
            has_pitch: features.voiced_ratio > thresholds.pitch_ratio,
            has_rhythm: features.onset_count >= min_onsets(features.duration_seconds, thresholds),
        }
    }
}

/// Onsets a take of this length needs before it counts as rhythmic.
pub fn min_onsets(duration_seconds: f32, thresholds: &Thresholds) -> u32 {
    let scaled = (duration_seconds.max(0.0) * thresholds.min_onset_rate).ceil() as u32;
    scaled.max(1)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Classification {
    pub tier: PerformanceTier,
    pub reward: u32,
    pub flags: PerformanceFlags,
}

type Rule = (fn(&PerformanceFlags) -> bool, PerformanceTier);

fn not_audible(f: &PerformanceFlags) -> bool {
    !f.audible
}

fn all_three(f: &PerformanceFlags) -> bool {
    f.loud && f.has_pitch && f.has_rhythm
}

fn any_two(f: &PerformanceFlags) -> bool {
    (f.loud && f.has_pitch)
        || (f.loud && f.has_rhythm)
        || (f.has_pitch && f.has_rhythm && !f.very_loud)
}

fn audible(f: &PerformanceFlags) -> bool {
    f.audible
}

/// Evaluated top-down, first match wins. Excellent is reserved for the full
/// triple, and a quiet but musical take tops out at Good.
pub const TIER_RULES: &[Rule] = &[
    (not_audible, PerformanceTier::Silent),
    (all_three, PerformanceTier::Excellent),
    (any_two, PerformanceTier::Good),
    (audible, PerformanceTier::Ok),
];

/// Tier for a set of flags; `Poor` when no rule matches.
pub fn tier_for(flags: &PerformanceFlags) -> PerformanceTier {
    TIER_RULES
        .iter()
        .find(|(matches, _)| matches(flags))
        .map_or(PerformanceTier::Poor, |&(_, tier)| tier)
}

#[derive(Clone, Debug, Default)]
pub struct Classifier {
    thresholds: Thresholds,
}

impl Classifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn classify(&self, features: &FeatureSet) -> Classification {
        let flags = PerformanceFlags::evaluate(features, &self.thresholds);
        let tier = tier_for(&flags);
        log::debug!("Classified {:?} as {:?}", flags, tier);
        Classification {
            tier,
            reward: tier.reward(),
            flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(loudness: f32, voiced_ratio: f32, onset_count: u32, duration: f32) -> FeatureSet {
        FeatureSet {
            loudness,
            voiced_ratio,
            onset_count,
            duration_seconds: duration,
        }
    }

    fn classify(f: FeatureSet) -> Classification {
        Classifier::default().classify(&f)
    }

    #[test]
    fn below_quiet_threshold_is_silent() {
        for loudness in [0.0, 0.001, 0.004, 0.005] {
            let c = classify(features(loudness, 1.0, 10, 2.0));
            assert_eq!(c.tier, PerformanceTier::Silent);
            assert_eq!(c.reward, 0);
        }
    }

    #[test]
    fn rewards_are_monotonic_in_tier() {
        let rewards: Vec<u32> = PerformanceTier::ALL.iter().map(|t| t.reward()).collect();
        assert_eq!(rewards, vec![0, 0, 1, 2, 3]);
        assert!(rewards.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn loud_pitched_rhythmic_is_excellent() {
        let c = classify(features(0.20, 0.5, 2, 2.0));
        assert_eq!(c.tier, PerformanceTier::Excellent);
        assert_eq!(c.reward, 3);
    }

    #[test]
    fn loud_and_pitched_without_rhythm_is_good() {
        // above medium, below loud; 2s needs 2 onsets
        let c = classify(features(0.20, 0.5, 1, 2.0));
        assert!(c.flags.loud && !c.flags.very_loud);
        assert!(c.flags.has_pitch && !c.flags.has_rhythm);
        assert_eq!(c.tier, PerformanceTier::Good);
        assert_eq!(c.reward, 2);
    }

    #[test]
    fn loud_and_rhythmic_without_pitch_is_good() {
        let c = classify(features(0.10, 0.1, 3, 2.0));
        assert_eq!(c.tier, PerformanceTier::Good);
    }

    #[test]
    fn quiet_musical_take_is_good_not_excellent() {
        let c = classify(features(0.02, 0.6, 3, 2.0));
        assert!(!c.flags.loud);
        assert_eq!(c.tier, PerformanceTier::Good);
    }

    #[test]
    fn audible_only_is_ok() {
        let c = classify(features(0.02, 0.1, 0, 2.0));
        assert_eq!(c.tier, PerformanceTier::Ok);
        assert_eq!(c.reward, 1);
    }

    #[test]
    fn very_loud_single_flag_is_ok() {
        let c = classify(features(0.6, 0.0, 0, 2.0));
        assert!(c.flags.very_loud);
        assert_eq!(c.tier, PerformanceTier::Ok);
    }

    #[test]
    fn rhythm_floor_uses_ceiling_with_minimum_one() {
        let t = Thresholds::default();
        assert_eq!(min_onsets(0.0, &t), 1);
        assert_eq!(min_onsets(1.0, &t), 1);
        assert_eq!(min_onsets(1.3, &t), 2);
        assert_eq!(min_onsets(5.0, &t), 4);
    }

    #[test]
    fn rules_apply_in_precedence_order() {
        let everything = PerformanceFlags {
            audible: true,
            loud: true,
            very_loud: true,
            has_pitch: true,
            has_rhythm: true,
        };
        assert_eq!(tier_for(&everything), PerformanceTier::Excellent);

        // very loud blocks only the quiet pitch+rhythm branch
        let very_loud_musical = PerformanceFlags {
            loud: false,
            ..everything
        };
        assert_eq!(tier_for(&very_loud_musical), PerformanceTier::Ok);

        let silent = PerformanceFlags {
            audible: false,
            ..everything
        };
        assert_eq!(tier_for(&silent), PerformanceTier::Silent);
    }
}

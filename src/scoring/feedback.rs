use serde::Serialize;

use super::classifier::{Classification, PerformanceFlags, PerformanceTier};

/// Character shown next to the feedback sentence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Avatar {
    /// Encouraging, used when there is little to praise yet
    Chase,
    /// Energetic, for loud or rhythmic takes
    Marshall,
    /// Musical, for takes with a clear melody
    Skye,
}

/// Which combination of flags stood out in a take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Emphasis {
    All,
    LoudPitch,
    LoudRhythm,
    PitchRhythm,
    VeryLoud,
    Partial,
    Nothing,
}

impl Emphasis {
    pub fn of(f: &PerformanceFlags) -> Self {
        if f.loud && f.has_pitch && f.has_rhythm {
            Emphasis::All
        } else if f.loud && f.has_pitch {
            Emphasis::LoudPitch
        } else if f.loud && f.has_rhythm {
            Emphasis::LoudRhythm
        } else if f.has_pitch && f.has_rhythm {
            Emphasis::PitchRhythm
        } else if f.very_loud {
            Emphasis::VeryLoud
        } else if f.loud || f.has_pitch || f.has_rhythm {
            Emphasis::Partial
        } else {
            Emphasis::Nothing
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub message_id: &'static str,
    pub avatar: Avatar,
    pub text: &'static str,
}

const GENERIC: Feedback = Feedback {
    message_id: "generic",
    avatar: Avatar::Chase,
    text: "You gave it a try, well done! Shall we sing it again?",
};

const FEEDBACK_TABLE: &[(PerformanceTier, Emphasis, Feedback)] = &[
    (
        PerformanceTier::Silent,
        Emphasis::Nothing,
        Feedback {
            message_id: "silent",
            avatar: Avatar::Chase,
            text: "Oops, I couldn't hear anything. Try singing a little louder, I can't wait to hear you!",
        },
    ),
    (
        PerformanceTier::Excellent,
        Emphasis::All,
        Feedback {
            message_id: "excellent",
            avatar: Avatar::Marshall,
            text: "Wow! Loud, in tune and right on the beat. You're a little star!",
        },
    ),
    (
        PerformanceTier::Good,
        Emphasis::LoudPitch,
        Feedback {
            message_id: "good_loud_melody",
            avatar: Avatar::Skye,
            text: "Nice and loud, and the melody sounds lovely!",
        },
    ),
    (
        PerformanceTier::Good,
        Emphasis::LoudRhythm,
        Feedback {
            message_id: "good_loud_rhythm",
            avatar: Avatar::Marshall,
            text: "Nice and loud, and you kept the rhythm. So cool!",
        },
    ),
    (
        PerformanceTier::Good,
        Emphasis::PitchRhythm,
        Feedback {
            message_id: "good_soft_musical",
            avatar: Avatar::Skye,
            text: "A soft voice, but full of tune and rhythm. Singing gently is great too!",
        },
    ),
    (
        PerformanceTier::Ok,
        Emphasis::VeryLoud,
        Feedback {
            message_id: "ok_powerful",
            avatar: Avatar::Marshall,
            text: "Wow, what a powerful voice! So much energy!",
        },
    ),
    (
        PerformanceTier::Ok,
        Emphasis::Partial,
        Feedback {
            message_id: "ok_heard_you",
            avatar: Avatar::Chase,
            text: "We heard you sing! Great job!",
        },
    ),
    (
        PerformanceTier::Ok,
        Emphasis::Nothing,
        Feedback {
            message_id: "ok_try_more",
            avatar: Avatar::Chase,
            text: "Good try, I heard you! Can you sing a bit louder and more in tune?",
        },
    ),
    (
        PerformanceTier::Poor,
        Emphasis::Nothing,
        Feedback {
            message_id: "poor",
            avatar: Avatar::Chase,
            text: "You gave it a try, well done! Let's go again?",
        },
    ),
];

/// Pick the feedback for a classification: an exact `(tier, emphasis)`
/// entry, else the tier's `Nothing` entry, else a generic encouragement.
pub fn select(classification: &Classification) -> Feedback {
    let tier = classification.tier;
    let emphasis = Emphasis::of(&classification.flags);
    lookup(tier, emphasis)
        .or_else(|| lookup(tier, Emphasis::Nothing))
        .unwrap_or(GENERIC)
}

fn lookup(tier: PerformanceTier, emphasis: Emphasis) -> Option<Feedback> {
    FEEDBACK_TABLE
        .iter()
        .find(|(t, e, _)| *t == tier && *e == emphasis)
        .map(|&(_, _, feedback)| feedback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FeatureSet;
    use crate::scoring::classifier::Classifier;

    fn classify(loudness: f32, voiced_ratio: f32, onset_count: u32) -> Classification {
        Classifier::default().classify(&FeatureSet {
            loudness,
            voiced_ratio,
            onset_count,
            duration_seconds: 2.0,
        })
    }

    #[test]
    fn silent_take_gets_encouragement() {
        let fb = select(&classify(0.0, 0.0, 0));
        assert_eq!(fb.message_id, "silent");
        assert_eq!(fb.avatar, Avatar::Chase);
    }

    #[test]
    fn excellent_take_gets_marshall() {
        let fb = select(&classify(0.2, 0.8, 4));
        assert_eq!(fb.message_id, "excellent");
        assert_eq!(fb.avatar, Avatar::Marshall);
    }

    #[test]
    fn good_variants_follow_satisfied_flags() {
        assert_eq!(select(&classify(0.2, 0.8, 0)).message_id, "good_loud_melody");
        assert_eq!(select(&classify(0.2, 0.0, 4)).message_id, "good_loud_rhythm");
        let soft = select(&classify(0.02, 0.8, 4));
        assert_eq!(soft.message_id, "good_soft_musical");
        assert_eq!(soft.avatar, Avatar::Skye);
    }

    #[test]
    fn ok_variants() {
        assert_eq!(select(&classify(0.5, 0.0, 0)).message_id, "ok_powerful");
        assert_eq!(select(&classify(0.1, 0.0, 0)).message_id, "ok_heard_you");
        assert_eq!(select(&classify(0.02, 0.0, 0)).message_id, "ok_try_more");
    }

    #[test]
    fn unlisted_combination_falls_back_to_tier_default() {
        let mut c = classify(0.0, 0.0, 0);
        c.flags.has_pitch = true;
        assert_eq!(select(&c).message_id, "silent");
    }
}

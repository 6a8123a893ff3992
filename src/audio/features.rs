use serde::Serialize;

/// Features derived from a single take, consumed by the classifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FeatureSet {
    /// RMS of the normalized samples (0.0-1.0)
    pub loudness: f32,
    /// Fraction of analysis frames with a confident pitch (0.0-1.0)
    pub voiced_ratio: f32,
    /// Detected onset events
    pub onset_count: u32,
    /// Take length in seconds
    pub duration_seconds: f32,
}

impl FeatureSet {
    /// Features of a take with nothing audible in it.
    pub fn silent(duration_seconds: f32) -> Self {
        Self {
            duration_seconds,
            ..Self::default()
        }
    }
}

pub mod analysis;
pub mod buffer;
pub mod decode;
pub mod features;
pub mod onset;
pub mod pitch;

pub use analysis::FeatureExtractor;
pub use buffer::AudioBuffer;
pub use features::FeatureSet;

/// Internal failure of a pitch or onset estimator.
///
/// Never escapes the extractor: the affected feature falls back to its
/// "not detected" value.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),
    #[error("analysis frame of {frame} samples is shorter than the {required} required")]
    FrameTooShort { frame: usize, required: usize },
    #[error("no samples to analyze")]
    EmptyFrame,
}

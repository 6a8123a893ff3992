pub mod classifier;
pub mod feedback;

pub use classifier::{Classification, Classifier, PerformanceFlags, PerformanceTier};
pub use feedback::{Avatar, Feedback};

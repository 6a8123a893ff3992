pub mod audio;
pub mod config;
pub mod progress;
pub mod scoring;
pub mod session;

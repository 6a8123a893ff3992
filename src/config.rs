use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Frame grid and estimator settings shared by the pitch and onset passes.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_frame_length")]
    pub frame_length: usize,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
    #[serde(default = "default_min_pitch_hz")]
    pub min_pitch_hz: f32,
    #[serde(default = "default_max_pitch_hz")]
    pub max_pitch_hz: f32,
    #[serde(default = "default_yin_threshold")]
    pub yin_threshold: f32,
    #[serde(default = "default_onset_delta")]
    pub onset_delta: f32,
    #[serde(default = "default_onset_min_gap")]
    pub onset_min_gap_seconds: f32,
}

/// Loudness, pitch and rhythm thresholds used by the classifier.
///
/// `quiet` doubles as the extractor's audible floor: below it the pitch
/// and onset passes are skipped.
#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_quiet")]
    pub quiet: f32,
    #[serde(default = "default_medium")]
    pub medium: f32,
    #[serde(default = "default_loud")]
    pub loud: f32,
    #[serde(default = "default_pitch_ratio")]
    pub pitch_ratio: f32,
    #[serde(default = "default_min_onset_rate")]
    pub min_onset_rate: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_max_record_seconds")]
    pub max_record_seconds: f32,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    #[serde(default)]
    pub progress: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_length: default_frame_length(),
            hop_length: default_hop_length(),
            min_pitch_hz: default_min_pitch_hz(),
            max_pitch_hz: default_max_pitch_hz(),
            yin_threshold: default_yin_threshold(),
            onset_delta: default_onset_delta(),
            onset_min_gap_seconds: default_onset_min_gap(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            quiet: default_quiet(),
            medium: default_medium(),
            loud: default_loud(),
            pitch_ratio: default_pitch_ratio(),
            min_onset_rate: default_min_onset_rate(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_record_seconds: default_max_record_seconds(),
        }
    }
}

fn default_frame_length() -> usize { 2048 }
fn default_hop_length() -> usize { 512 }
fn default_min_pitch_hz() -> f32 { 65.41 }
fn default_max_pitch_hz() -> f32 { 1046.5 }
fn default_yin_threshold() -> f32 { 0.15 }
fn default_onset_delta() -> f32 { 0.05 }
fn default_onset_min_gap() -> f32 { 0.1 }
fn default_quiet() -> f32 { 0.005 }
fn default_medium() -> f32 { 0.05 }
fn default_loud() -> f32 { 0.25 }
fn default_pitch_ratio() -> f32 { 0.30 }
fn default_min_onset_rate() -> f32 { 0.8 }
fn default_max_record_seconds() -> f32 { 15.0 }

impl Config {
    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        if a.frame_length == 0 || a.hop_length == 0 {
            anyhow::bail!("analysis.frame_length and analysis.hop_length must be positive");
        }
        if a.hop_length > a.frame_length {
            anyhow::bail!(
                "analysis.hop_length ({}) must not exceed analysis.frame_length ({})",
                a.hop_length,
                a.frame_length
            );
        }
        if !(a.min_pitch_hz > 0.0 && a.min_pitch_hz < a.max_pitch_hz) {
            anyhow::bail!(
                "Invalid pitch band: {} Hz - {} Hz",
                a.min_pitch_hz,
                a.max_pitch_hz
            );
        }

        let t = &self.thresholds;
        if !(t.quiet <= t.medium && t.medium <= t.loud) {
            anyhow::bail!(
                "Loudness thresholds must satisfy quiet <= medium <= loud (got {} / {} / {})",
                t.quiet,
                t.medium,
                t.loud
            );
        }
        if self.capture.max_record_seconds <= 0.0 {
            anyhow::bail!("capture.max_record_seconds must be positive");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

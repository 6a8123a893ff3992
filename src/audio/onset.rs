use rustfft::{num_complex::Complex, FftPlanner};

use super::AnalysisError;

/// Frames on either side used for the adaptive threshold's local mean.
const LOCAL_WINDOW: usize = 20;
/// Multiplier on the local mean flux before an onset may be declared.
const MEAN_FACTOR: f32 = 1.5;

#[derive(Clone, Copy, Debug)]
pub struct OnsetParams {
    pub delta: f32,
    pub min_gap_seconds: f32,
}

/// Count onset events over a precomputed frame grid.
pub fn count_onsets(
    frames: &[Vec<f32>],
    sample_rate: u32,
    hop_length: usize,
    params: OnsetParams,
) -> Result<u32, AnalysisError> {
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidSampleRate(sample_rate));
    }
    let flux = spectral_flux(frames)?;
    let hop_seconds = hop_length as f32 / sample_rate as f32;
    let onsets = detect_onsets(&flux, hop_seconds, params);
    log::debug!("Onsets at frames {:?}", onsets);
    Ok(onsets.len() as u32)
}

/// Half-wave rectified spectral flux per frame, normalized to the peak.
///
/// The first frame is compared against silence, so a take that starts on a
/// note reports an onset at frame 0. Frames whose energy does not rise over
/// the previous frame contribute no flux: a note release spreads leakage
/// across the spectrum but is not an onset.
pub fn spectral_flux(frames: &[Vec<f32>]) -> Result<Vec<f32>, AnalysisError> {
    let frame_length = match frames.first() {
        Some(f) if !f.is_empty() => f.len(),
        _ => return Err(AnalysisError::EmptyFrame),
    };

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame_length);
    let hann = hann_window(frame_length);
    let half = frame_length / 2;

    let mut prev_magnitudes = vec![0.0f32; half];
    let mut prev_energy = 0.0f32;
    let mut flux_values = Vec::with_capacity(frames.len());

    for frame in frames {
        if frame.len() != frame_length {
            return Err(AnalysisError::FrameTooShort {
                frame: frame.len(),
                required: frame_length,
            });
        }
        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(hann.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut buffer);

        let magnitudes: Vec<f32> = buffer[..half].iter().map(|c| c.norm()).collect();
        let energy: f32 = magnitudes.iter().map(|m| m * m).sum();
        let flux: f32 = if energy > prev_energy {
            magnitudes
                .iter()
                .zip(prev_magnitudes.iter())
                .map(|(cur, prev)| (cur - prev).max(0.0))
                .sum()
        } else {
            0.0
        };

        flux_values.push(flux);
        prev_magnitudes = magnitudes;
        prev_energy = energy;
    }

    let peak = flux_values.iter().copied().fold(0.0f32, f32::max);
    if peak > 1e-10 {
        for f in &mut flux_values {
            *f /= peak;
        }
    }
    Ok(flux_values)
}

/// Peak-pick the flux curve against an adaptive threshold, returning frame
/// indices of accepted onsets.
pub fn detect_onsets(flux: &[f32], hop_seconds: f32, params: OnsetParams) -> Vec<usize> {
    let mut onsets: Vec<usize> = Vec::new();

    for i in 0..flux.len() {
        let start = i.saturating_sub(LOCAL_WINDOW);
        let end = (i + LOCAL_WINDOW + 1).min(flux.len());
        let local_mean = flux[start..end].iter().sum::<f32>() / (end - start) as f32;
        let threshold = local_mean * MEAN_FACTOR + params.delta;

        if flux[i] <= threshold {
            continue;
        }

        let is_peak = (i == 0 || flux[i] >= flux[i - 1])
            && (i == flux.len() - 1 || flux[i] >= flux[i + 1]);
        let far_enough = onsets
            .last()
            .map_or(true, |&last| (i - last) as f32 * hop_seconds > params.min_gap_seconds);

        if is_peak && far_enough {
            onsets.push(i);
        }
    }

    onsets
}

fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

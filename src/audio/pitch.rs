use super::AnalysisError;

/// Frames with less total energy than this are treated as unvoiced without
/// running the difference function.
const MIN_FRAME_ENERGY: f32 = 1e-8;

#[derive(Clone, Copy, Debug)]
pub struct PitchBand {
    pub min_hz: f32,
    pub max_hz: f32,
}

impl PitchBand {
    /// Longest period (in samples) the band allows.
    fn max_lag(&self, sample_rate: u32) -> usize {
        (sample_rate as f32 / self.min_hz).ceil() as usize
    }

    /// Shortest period (in samples) the band allows.
    fn min_lag(&self, sample_rate: u32) -> usize {
        ((sample_rate as f32 / self.max_hz).floor() as usize).max(2)
    }

    /// Minimum frame length able to hold two periods of the lowest pitch.
    pub fn required_frame(&self, sample_rate: u32) -> usize {
        self.max_lag(sample_rate).saturating_mul(2)
    }
}

/// Estimate the fundamental of `frame` with the YIN algorithm.
///
/// Returns `Ok(Some(hz))` for a confident pitch inside `band`, `Ok(None)`
/// for an unvoiced frame, and an error when the frame cannot be analyzed at
/// all at this sample rate. Only lags inside the band are searched, and a
/// frame is voiced when the cumulative mean normalized difference dips
/// below `threshold`.
pub fn detect_pitch_yin(
    frame: &[f32],
    sample_rate: u32,
    band: PitchBand,
    threshold: f32,
) -> Result<Option<f32>, AnalysisError> {
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidSampleRate(sample_rate));
    }
    if frame.is_empty() {
        return Err(AnalysisError::EmptyFrame);
    }

    let required = band.required_frame(sample_rate);
    if frame.len() < required {
        return Err(AnalysisError::FrameTooShort {
            frame: frame.len(),
            required,
        });
    }

    let energy: f32 = frame.iter().map(|s| s * s).sum();
    if energy < MIN_FRAME_ENERGY {
        return Ok(None);
    }

    let max_lag = band.max_lag(sample_rate);
    let min_lag = band.min_lag(sample_rate);
    let window = frame.len() - max_lag;

    // Difference function
    let mut yin = vec![0.0f32; max_lag + 1];
    for tau in 1..=max_lag {
        yin[tau] = (0..window)
            .map(|i| {
                let delta = frame[i] - frame[i + tau];
                delta * delta
            })
            .sum();
    }

    // Cumulative mean normalized difference
    yin[0] = 1.0;
    let mut running_sum = 0.0f32;
    for (tau, value) in yin.iter_mut().enumerate().skip(1) {
        running_sum += *value;
        *value = if running_sum > 0.0 {
            *value * tau as f32 / running_sum
        } else {
            1.0
        };
    }

    // First dip under the threshold, then walk down to its local minimum
    let Some(mut period) = (min_lag..=max_lag).find(|&tau| yin[tau] < threshold) else {
        return Ok(None);
    };
    while period < max_lag && yin[period + 1] < yin[period] {
        period += 1;
    }

    let refined = if period > 1 && period < max_lag {
        let (y1, y2, y3) = (yin[period - 1], yin[period], yin[period + 1]);
        let denom = y1 - 2.0 * y2 + y3;
        if denom.abs() > f32::EPSILON {
            period as f32 + (y1 - y3) / (2.0 * denom)
        } else {
            period as f32
        }
    } else {
        period as f32
    };

    let frequency = sample_rate as f32 / refined;
    if frequency.is_finite() && frequency >= band.min_hz && frequency <= band.max_hz {
        Ok(Some(frequency))
    } else {
        Ok(None)
    }
}

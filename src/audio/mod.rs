pub mod analysis;
pub mod beat;
pub mod features;
pub mod resample;
pub mod spectrum;
pub mod waveform;

use std::collections::TryReserveError;

/// A decoded track held fully in memory.
///
/// `mono` is the analysis buffer and may be decimated by the resampler;
/// `left`/`right` always stay at `stereo_rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub mono_rate: u32,
    pub mono: Vec<f32>,
    pub stereo_rate: u32,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub duration_ms: u32,
}

impl DecodedAudio {
    /// Build from separate channels at one rate, deriving the mono mix.
    pub fn from_channels(sample_rate: u32, left: Vec<f32>, right: Vec<f32>) -> Result<Self, TryReserveError> {
        let mut mono = Vec::new();
        mono.try_reserve_exact(left.len())?;
        mono.extend(left.iter().zip(&right).map(|(l, r)| (l + r) * 0.5));
        Ok(Self {
            mono_rate: sample_rate,
            duration_ms: duration_ms(mono.len(), sample_rate),
            mono,
            stereo_rate: sample_rate,
            left,
            right,
        })
    }
}

/// Whole milliseconds covered by `frames` samples, never less than 1.
pub fn duration_ms(frames: usize, sample_rate: u32) -> u32 {
    if sample_rate == 0 {
        return 1;
    }
    let ms = frames as u64 * 1000 / u64::from(sample_rate);
    ms.clamp(1, u64::from(u32::MAX)) as u32
}

/// Millisecond position of a sample index, truncated.
pub fn position_ms(sample_index: usize, sample_rate: u32) -> u32 {
    (sample_index as u64 * 1000 / u64::from(sample_rate.max(1))).min(u64::from(u32::MAX)) as u32
}

/// Samples per hop for a millisecond stride, at least one.
pub fn hop_samples(sample_rate: u32, hop_ms: u32) -> usize {
    let samples = (f64::from(sample_rate) * (f64::from(hop_ms) / 1000.0)) as usize;
    samples.max(1)
}

/// Allocate a filled buffer, reporting allocation failure instead of aborting.
pub fn try_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>, TryReserveError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, value);
    Ok(buf)
}

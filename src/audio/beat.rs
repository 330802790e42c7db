use super::features::{BeatFrame, BeatResult};
use super::{hop_samples, try_filled, DecodedAudio};
use crate::error::HelperError;
use crate::request::BeatParams;

const MIN_BPM: f64 = 60.0;
const MAX_BPM: f64 = 180.0;
/// Fewer frames than this and no tempo is attempted.
const MIN_TEMPO_FRAMES: usize = 8;
const THRESHOLD_MEAN_FACTOR: f64 = 1.35;
const THRESHOLD_FLOOR: f64 = 0.12;

/// Onset timeline and tempo estimate over the mono buffer.
///
/// Energy is RMS over `2 * hop` windows started every hop. The onset signal
/// is the half-wave rectified energy difference; tempo comes from its
/// autocorrelation over lags covering 60-180 BPM. Beats are the frames on
/// the strongest phase of the winning lag that clear an adaptive threshold.
pub fn analyze_beat(audio: &DecodedAudio, params: &BeatParams) -> Result<BeatResult, HelperError> {
    let samples = &audio.mono;
    let rate = audio.mono_rate;
    if rate == 0 || samples.is_empty() {
        return Err(HelperError::Beat("no mono samples".into()));
    }
    let alloc_err = |e: std::collections::TryReserveError| HelperError::Beat(e.to_string());

    let hop_ms = params.hop_ms;
    let hop = hop_samples(rate, hop_ms);
    let window = hop.saturating_mul(2);

    let mut energies = Vec::new();
    energies.try_reserve_exact(params.max_frames.min(samples.len().div_ceil(hop)))
        .map_err(alloc_err)?;
    let mut start = 0;
    while start < samples.len() && energies.len() < params.max_frames {
        let end = start.saturating_add(window).min(samples.len());
        energies.push(rms(&samples[start..end]));
        start += hop;
    }
    if energies.is_empty() {
        return Err(HelperError::Beat("no energy frames".into()));
    }

    let onsets = onset_signal(&energies).map_err(alloc_err)?;
    let strengths = normalized_strengths(&onsets).map_err(alloc_err)?;

    let fps = 1000.0 / f64::from(hop_ms);
    let best_lag = best_tempo_lag(&onsets, fps);
    let bpm = best_lag.map_or(0.0, |lag| 60.0 * fps / lag as f64);

    let mut beat_flags = try_filled(strengths.len(), false).map_err(alloc_err)?;
    if let Some(lag) = best_lag {
        mark_beats(&strengths, lag, &mut beat_flags).map_err(alloc_err)?;
    }

    let mut frames = Vec::new();
    frames.try_reserve_exact(strengths.len()).map_err(alloc_err)?;
    frames.extend(strengths.iter().zip(&beat_flags).enumerate().map(|(i, (&s, &is_beat))| {
        BeatFrame {
            pos_ms: (i as u64 * u64::from(hop_ms)).min(u64::from(u32::MAX)) as u32,
            strength: (s * 255.0).round().clamp(0.0, 255.0) as u8,
            is_beat,
        }
    }));

    log::info!(
        "Beat: {} frames, bpm={:.1}, beats={}",
        frames.len(),
        bpm,
        frames.iter().filter(|f| f.is_beat).count()
    );

    Ok(BeatResult {
        duration_ms: audio.duration_ms,
        bpm: bpm.max(0.0),
        frames,
    })
}

fn rms(window: &[f32]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let total: f64 = window.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (total / window.len() as f64).sqrt()
}

/// Half-wave rectified first difference; the first frame is 0.
fn onset_signal(energies: &[f64]) -> Result<Vec<f64>, std::collections::TryReserveError> {
    let mut onsets = try_filled(energies.len(), 0.0f64)?;
    for i in 1..energies.len() {
        onsets[i] = (energies[i] - energies[i - 1]).max(0.0);
    }
    Ok(onsets)
}

/// Onsets scaled by the global maximum, all zero when nothing rises.
fn normalized_strengths(onsets: &[f64]) -> Result<Vec<f64>, std::collections::TryReserveError> {
    let max_onset = onsets.iter().copied().fold(0.0f64, f64::max);
    let mut strengths = try_filled(onsets.len(), 0.0f64)?;
    if max_onset > 0.0 {
        for (s, &o) in strengths.iter_mut().zip(onsets) {
            *s = (o / max_onset).clamp(0.0, 1.0);
        }
    }
    Ok(strengths)
}

/// Autocorrelation lag with the highest positive score in the 60-180 BPM
/// range. Ties keep the shorter lag.
fn best_tempo_lag(onsets: &[f64], fps: f64) -> Option<usize> {
    if onsets.len() < MIN_TEMPO_FRAMES || fps <= 0.0 {
        return None;
    }
    let lag_min = ((60.0 * fps / MAX_BPM).round() as usize).max(1);
    let lag_max = ((60.0 * fps / MIN_BPM).round() as usize)
        .max(lag_min + 1)
        .min(onsets.len() - 1);
    if lag_max <= lag_min {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for lag in lag_min..=lag_max {
        let score: f64 = onsets[lag..]
            .iter()
            .zip(onsets)
            .map(|(a, b)| a * b)
            .sum();
        if score > best.map_or(0.0, |(_, s)| s) {
            best = Some((lag, score));
        }
    }
    best.map(|(lag, _)| lag)
}

fn mark_beats(
    strengths: &[f64],
    lag: usize,
    flags: &mut [bool],
) -> Result<(), std::collections::TryReserveError> {
    let mut phase_scores = try_filled(lag, 0.0f64)?;
    for (i, &s) in strengths.iter().enumerate() {
        phase_scores[i % lag] += s;
    }
    let mean = strengths.iter().sum::<f64>() / strengths.len() as f64;

    let mut phase = 0;
    for (i, &score) in phase_scores.iter().enumerate().skip(1) {
        if score > phase_scores[phase] {
            phase = i;
        }
    }

    let threshold = (mean * THRESHOLD_MEAN_FACTOR).max(THRESHOLD_FLOOR);
    for (i, (flag, &s)) in flags.iter_mut().zip(strengths).enumerate() {
        *flag = i % lag == phase && s >= threshold;
    }
    Ok(())
}

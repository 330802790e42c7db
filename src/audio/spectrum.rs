use rayon::prelude::*;

use super::features::{SpectrumFrame, SpectrumResult};
use super::{hop_samples, position_ms, try_filled, DecodedAudio};
use crate::error::HelperError;
use crate::request::SpectrumParams;

const MIN_WINDOW: usize = 256;
const MAX_WINDOW: usize = 2048;
const MIN_FREQ_HZ: f32 = 40.0;
const MAX_FREQ_HZ: f32 = 5000.0;

/// Banded spectrum over the mono buffer.
///
/// Each band is a single Goertzel filter tuned to a log-spaced frequency
/// between 40 Hz and min(nyquist - 1, 5 kHz). Magnitudes are `ln(1 + power)`,
/// normalized against the loudest band of the whole track, and quantized
/// through a square-root curve to 0-255.
pub fn analyze_spectrum(audio: &DecodedAudio, params: &SpectrumParams) -> Result<SpectrumResult, HelperError> {
    let samples = &audio.mono;
    let rate = audio.mono_rate;
    if rate == 0 || samples.is_empty() {
        return Err(HelperError::Spectrum("no mono samples".into()));
    }
    let band_count = params.band_count.max(1);

    let hop = hop_samples(rate, params.hop_ms);
    let window_size = window_size_for(hop);
    let hann = hann_window(window_size);
    let coeffs = band_coefficients(band_count, window_size, rate);

    let hop_count = samples.len().div_ceil(hop);
    let frame_count = hop_count.min(params.max_frames);
    if frame_count == 0 {
        return Err(HelperError::Spectrum("no frames requested".into()));
    }
    log::info!(
        "Spectrum: {} frames ({} hops), hop={} samples, window={}, {} bands",
        frame_count,
        hop_count,
        hop,
        window_size,
        band_count
    );

    let alloc_err = |e: std::collections::TryReserveError| HelperError::Spectrum(e.to_string());
    let mags_len = frame_count
        .checked_mul(band_count)
        .ok_or_else(|| HelperError::Spectrum("frame buffer size overflow".into()))?;
    let mut mags = try_filled(mags_len, 0.0f32).map_err(alloc_err)?;

    let analyze_hop = |window: &mut Vec<f32>, frame_idx: usize, row: &mut [f32]| {
        let start = frame_idx * hop;
        for (i, w) in window.iter_mut().enumerate() {
            let sample = samples.get(start + i).copied().unwrap_or(0.0);
            *w = sample * hann[i];
        }
        for (mag, &coeff) in row.iter_mut().zip(&coeffs) {
            *mag = magnitude(goertzel_power(window, coeff));
        }
    };

    // Frames are independent; normalization happens after all are computed.
    mags.par_chunks_mut(band_count).enumerate().for_each_init(
        || vec![0.0f32; window_size],
        |window, (frame_idx, row)| analyze_hop(window, frame_idx, row),
    );

    // Hops past the frame cap are not emitted but still set the normalization peak.
    let dropped_max = (frame_count..hop_count)
        .into_par_iter()
        .map_init(
            || (vec![0.0f32; window_size], vec![0.0f32; band_count]),
            |(window, row), frame_idx| {
                analyze_hop(window, frame_idx, row);
                row.iter().copied().fold(0.0f32, f32::max)
            },
        )
        .reduce(|| 0.0f32, f32::max);

    let mut max_mag = mags.iter().copied().fold(dropped_max, f32::max);
    if max_mag <= 0.0 {
        max_mag = 1.0;
    }

    let mut frames = Vec::new();
    frames.try_reserve_exact(frame_count).map_err(alloc_err)?;
    for (frame_idx, row) in mags.chunks(band_count).enumerate() {
        let mut bands = Vec::new();
        bands.try_reserve_exact(band_count).map_err(alloc_err)?;
        bands.extend(row.iter().map(|&mag| quantize_level(mag / max_mag)));
        frames.push(SpectrumFrame {
            pos_ms: position_ms(frame_idx * hop, rate),
            bands,
        });
    }

    Ok(SpectrumResult {
        duration_ms: audio.duration_ms,
        frames,
    })
}

/// Smallest power of two covering two hops, clamped to [256, 2048].
fn window_size_for(hop: usize) -> usize {
    hop.saturating_mul(2)
        .checked_next_power_of_two()
        .unwrap_or(MAX_WINDOW)
        .clamp(MIN_WINDOW, MAX_WINDOW)
}

fn hann_window(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()
        })
        .collect()
}

/// Goertzel coefficient `2cos(2πk/N)` per band, `k` being the window bin
/// nearest to the band's target frequency.
fn band_coefficients(band_count: usize, window_size: usize, rate: u32) -> Vec<f32> {
    if band_count <= 1 {
        return vec![2.0; band_count];
    }
    let nyquist = (rate as f32 * 0.5 - 1.0).max(100.0);
    let mut max_freq = nyquist.min(MAX_FREQ_HZ);
    if max_freq <= MIN_FREQ_HZ {
        max_freq = MIN_FREQ_HZ + 1.0;
    }
    let ratio = (max_freq / MIN_FREQ_HZ).powf(1.0 / (band_count - 1) as f32);
    (0..band_count)
        .map(|b| {
            let freq = MIN_FREQ_HZ * ratio.powf(b as f32);
            let k = (0.5 + (window_size as f32 * freq) / rate as f32) as i32;
            let omega = 2.0 * std::f32::consts::PI * k as f32 / window_size as f32;
            2.0 * omega.cos()
        })
        .collect()
}

fn goertzel_power(window: &[f32], coeff: f32) -> f32 {
    let mut s_prev = 0.0f32;
    let mut s_prev2 = 0.0f32;
    for &x in window {
        let s = x + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }
    s_prev2 * s_prev2 + s_prev * s_prev - coeff * s_prev * s_prev2
}

fn magnitude(power: f32) -> f32 {
    if power > 0.0 {
        power.ln_1p()
    } else {
        0.0
    }
}

/// Map a normalized magnitude to 0-255 through a square-root curve.
pub fn quantize_level(normalized: f32) -> u8 {
    let curved = normalized.clamp(0.0, 1.0).sqrt();
    (curved * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(hop_ms: u32, band_count: usize, max_frames: usize) -> SpectrumParams {
        SpectrumParams {
            mono_target_rate_hz: 11_025,
            hop_ms,
            band_count,
            max_frames,
        }
    }

    fn mono(samples: Vec<f32>, rate: u32) -> DecodedAudio {
        DecodedAudio::from_channels(rate, samples.clone(), samples).unwrap()
    }

    fn sine(freq: f32, rate: u32, len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn quantization_curve() {
        assert_eq!(quantize_level(0.0), 0);
        assert_eq!(quantize_level(1.0), 255);
        assert_eq!(quantize_level(0.25), 128);
        assert_eq!(quantize_level(-3.0), 0);
        assert_eq!(quantize_level(7.0), 255);
    }

    #[test]
    fn window_size_is_clamped_power_of_two() {
        assert_eq!(window_size_for(1), 256);
        assert_eq!(window_size_for(400), 1024);
        assert_eq!(window_size_for(441), 1024);
        assert_eq!(window_size_for(512), 1024);
        assert_eq!(window_size_for(1764), 2048);
    }

    #[test]
    fn hann_endpoints_are_zero() {
        let w = hann_window(256);
        assert!(w[0].abs() < 1e-6);
        assert!(w[255].abs() < 1e-6);
        assert!(w[127] > 0.99);
        assert_eq!(hann_window(1), vec![1.0]);
    }

    #[test]
    fn frame_count_and_positions() {
        let audio = mono(sine(440.0, 8000, 8000 * 3 + 7, 0.5), 8000);
        let result = analyze_spectrum(&audio, &params(40, 8, 12_000)).unwrap();
        // hop = 320 samples, ceil(24007 / 320) = 76
        assert_eq!(result.frames.len(), 76);
        assert_eq!(result.duration_ms, 3000);
        for (i, frame) in result.frames.iter().enumerate() {
            assert_eq!(frame.bands.len(), 8);
            assert_eq!(frame.pos_ms, (i * 40) as u32);
        }
    }

    #[test]
    fn max_frames_caps_output() {
        let audio = mono(sine(440.0, 8000, 8000, 0.5), 8000);
        let result = analyze_spectrum(&audio, &params(10, 8, 5)).unwrap();
        assert_eq!(result.frames.len(), 5);
    }

    #[test]
    fn capped_frames_normalize_against_every_hop() {
        // quiet first half, loud second half
        let mut samples = sine(500.0, 8000, 4000, 0.001);
        samples.extend(sine(500.0, 8000, 4000, 0.9));
        let audio = mono(samples, 8000);

        let full = analyze_spectrum(&audio, &params(10, 8, 12_000)).unwrap();
        let capped = analyze_spectrum(&audio, &params(10, 8, 5)).unwrap();
        assert_eq!(full.frames.len(), 100);
        assert_eq!(capped.frames, full.frames[..5].to_vec());
        // the loud hops were cut, yet they still set the scale
        assert!(capped.frames.iter().all(|f| f.bands.iter().all(|b| *b < 64)));
    }

    #[test]
    fn loudest_band_reaches_full_scale() {
        let audio = mono(sine(700.0, 11_025, 11_025, 0.01), 11_025);
        let result = analyze_spectrum(&audio, &params(40, 16, 12_000)).unwrap();
        let peak = result
            .frames
            .iter()
            .flat_map(|f| f.bands.iter().copied())
            .max();
        assert_eq!(peak, Some(255));
    }

    #[test]
    fn silence_quantizes_to_zero() {
        let audio = mono(vec![0.0; 4000], 8000);
        let result = analyze_spectrum(&audio, &params(40, 12, 12_000)).unwrap();
        assert!(result.frames.iter().all(|f| f.bands.iter().all(|b| *b == 0)));
    }

    #[test]
    fn tone_lands_in_its_band() {
        // Band 5 of 8 at 8 kHz sits on bin 137 of a 1024-sample window.
        let freq = 137.0 * 8000.0 / 1024.0;
        let audio = mono(sine(freq, 8000, 8000 * 2, 0.5), 8000);
        let result = analyze_spectrum(&audio, &params(50, 8, 1000)).unwrap();
        assert_eq!(result.frames.len(), 40);
        for frame in &result.frames {
            for (b, level) in frame.bands.iter().enumerate() {
                if b != 5 {
                    assert!(frame.bands[5] > *level, "{:?}", frame.bands);
                }
            }
        }
    }

    #[test]
    fn rejects_empty_buffer() {
        let audio = mono(vec![], 8000);
        assert!(matches!(
            analyze_spectrum(&audio, &params(40, 8, 10)),
            Err(HelperError::Spectrum(_))
        ));
    }
}

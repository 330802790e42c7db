use super::features::{WaveformProxyFrame, WaveformProxyResult};
use super::{hop_samples, position_ms, DecodedAudio};
use crate::error::HelperError;
use crate::request::WaveformProxyParams;

/// Per-hop min/max envelope of both stereo channels at the original rate.
pub fn analyze_waveform_proxy(
    audio: &DecodedAudio,
    params: &WaveformProxyParams,
) -> Result<WaveformProxyResult, HelperError> {
    let rate = audio.stereo_rate;
    let len = audio.left.len().min(audio.right.len());
    if rate == 0 || len == 0 {
        return Err(HelperError::WaveformProxy("no stereo samples".into()));
    }

    let hop = hop_samples(rate, params.hop_ms);
    let frame_count = len.div_ceil(hop).min(params.max_frames);

    let mut frames = Vec::new();
    frames
        .try_reserve_exact(frame_count)
        .map_err(|e| HelperError::WaveformProxy(e.to_string()))?;

    let left = audio.left[..len].chunks(hop);
    let right = audio.right[..len].chunks(hop);
    for (i, (l, r)) in left.zip(right).take(frame_count).enumerate() {
        let (left_min, left_max) = extrema(l);
        let (right_min, right_max) = extrema(r);
        frames.push(WaveformProxyFrame {
            pos_ms: position_ms(i * hop, rate),
            left_min: to_i8(left_min),
            left_max: to_i8(left_max),
            right_min: to_i8(right_min),
            right_max: to_i8(right_max),
        });
    }

    log::info!("Waveform proxy: {} frames, hop={} samples", frames.len(), hop);

    Ok(WaveformProxyResult {
        duration_ms: audio.duration_ms,
        frames,
    })
}

fn extrema(window: &[f32]) -> (f32, f32) {
    window
        .iter()
        .fold((1.0f32, -1.0f32), |(lo, hi), &s| (lo.min(s), hi.max(s)))
}

/// Scale to a symmetric signed byte; -128 is never produced.
fn to_i8(value: f32) -> i8 {
    (value.clamp(-1.0, 1.0) * 127.0).round().clamp(-127.0, 127.0) as i8
}

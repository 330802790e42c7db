use super::{duration_ms, DecodedAudio};
use crate::error::HelperError;

/// Decimate the mono buffer to `target_rate_hz` by nearest-neighbour pick.
///
/// No anti-aliasing filter is applied. A target at or above the current
/// rate leaves the audio untouched. Stereo buffers are never resampled.
pub fn resample_mono(audio: &mut DecodedAudio, target_rate_hz: i64) -> Result<(), HelperError> {
    if target_rate_hz <= 0 {
        return Err(HelperError::Resample(format!("invalid target rate {}", target_rate_hz)));
    }
    if audio.mono_rate == 0 || audio.mono.is_empty() {
        return Err(HelperError::Resample("no mono samples to resample".into()));
    }
    if i64::from(audio.mono_rate) <= target_rate_hz {
        return Ok(());
    }
    // target < mono_rate <= u32::MAX here
    let target_rate = target_rate_hz as u32;

    let step = f64::from(audio.mono_rate) / f64::from(target_rate);
    let source_len = audio.mono.len();
    let capacity = (source_len as f64 / step) as usize + 2;

    let mut out = Vec::new();
    out.try_reserve_exact(capacity)
        .map_err(|e| HelperError::Resample(e.to_string()))?;
    let mut index = 0.0f64;
    while (index as usize) < source_len && out.len() < capacity {
        out.push(audio.mono[index as usize]);
        index += step;
    }

    log::debug!(
        "Resampled mono {}Hz -> {}Hz ({} -> {} samples)",
        audio.mono_rate,
        target_rate,
        source_len,
        out.len()
    );
    audio.mono = out;
    audio.mono_rate = target_rate;
    audio.duration_ms = duration_ms(audio.mono.len(), target_rate);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, rate: u32) -> DecodedAudio {
        let left: Vec<f32> = (0..len).map(|i| i as f32 / len as f32).collect();
        DecodedAudio::from_channels(rate, left.clone(), left).unwrap()
    }

    #[test]
    fn higher_target_is_a_noop() {
        let mut audio = ramp(1000, 8000);
        let before = audio.clone();
        resample_mono(&mut audio, 11_025).unwrap();
        assert_eq!(audio, before);
        resample_mono(&mut audio, 8000).unwrap();
        assert_eq!(audio, before);
    }

    #[test]
    fn integer_step_picks_every_nth_sample() {
        let mut audio = ramp(1000, 44_100);
        let source = audio.mono.clone();
        resample_mono(&mut audio, 11_025).unwrap();
        assert_eq!(audio.mono_rate, 11_025);
        assert_eq!(audio.mono.len(), 250);
        for (i, s) in audio.mono.iter().enumerate() {
            assert_eq!(*s, source[i * 4]);
        }
    }

    #[test]
    fn fractional_step_shrinks_within_bound() {
        let source_len = 44_100;
        let mut audio = ramp(source_len, 44_100);
        resample_mono(&mut audio, 16_000).unwrap();
        let step = 44_100.0 / 16_000.0;
        assert!(audio.mono.len() < source_len);
        assert!(audio.mono.len() <= (source_len as f64 / step) as usize + 2);
        assert_eq!(audio.duration_ms, 1000);
    }

    #[test]
    fn stereo_buffers_untouched() {
        let mut audio = ramp(4410, 44_100);
        let left = audio.left.clone();
        resample_mono(&mut audio, 11_025).unwrap();
        assert_eq!(audio.left, left);
        assert_eq!(audio.stereo_rate, 44_100);
        assert_eq!(audio.duration_ms, 100);
    }

    #[test]
    fn rejects_invalid_inputs() {
        let mut audio = ramp(100, 44_100);
        assert!(resample_mono(&mut audio, 0).is_err());
        assert!(resample_mono(&mut audio, -5).is_err());
        let mut empty = DecodedAudio::from_channels(44_100, vec![], vec![]).unwrap();
        assert!(resample_mono(&mut empty, 11_025).is_err());
    }
}

pub mod ffmpeg;
pub mod wav;

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::audio::DecodedAudio;
use ffmpeg::FfmpegDecoder;

/// Extensions that promise the native container. A parse failure on one of
/// these is final.
const NATIVE_EXTENSIONS: [&str; 2] = ["wav", "wave"];

#[derive(Debug, Clone)]
pub struct DecoderSettings {
    /// Program used for fallback decoding.
    pub ffmpeg: String,
    pub allow_fallback: bool,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg: crate::config::default_ffmpeg(),
            allow_fallback: true,
        }
    }
}

/// Decode a track, trying the native WAV parser first and falling back to
/// the external decoder for anything that is not supposed to be a WAV file.
pub fn decode_track(path: &Path, settings: &DecoderSettings) -> Result<DecodedAudio> {
    let native_err = match wav::decode_wav(path) {
        Ok(audio) => {
            log::info!(
                "Decoded WAV: {} frames, {}Hz, {}ms",
                audio.left.len(),
                audio.stereo_rate,
                audio.duration_ms
            );
            return Ok(audio);
        }
        Err(err) => err,
    };

    if is_native_container(path) {
        return Err(native_err)
            .with_context(|| format!("Cannot decode {} as PCM WAV", path.display()));
    }
    if !settings.allow_fallback {
        return Err(native_err).with_context(|| {
            format!("Cannot decode {} natively and fallback is disabled", path.display())
        });
    }

    log::debug!("Native parser rejected {}: {:#}", path.display(), native_err);
    log::info!("Decoding {} via {}", path.display(), settings.ffmpeg);
    let audio = FfmpegDecoder::new(&settings.ffmpeg).decode(path)?;
    log::info!(
        "Decoded via {}: {} frames, {}Hz, {}ms",
        settings.ffmpeg,
        audio.left.len(),
        audio.stereo_rate,
        audio.duration_ms
    );
    Ok(audio)
}

pub fn is_native_container(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| {
            NATIVE_EXTENSIONS.iter().any(|native| ext.eq_ignore_ascii_case(native))
        })
}

/// Convert interleaved little-endian PCM16 (one or two channels) into
/// float channels scaled by 1/32768. Mono input is duplicated into both
/// channels; trailing bytes short of a full frame are dropped.
pub fn pcm16_to_audio(data: &[u8], channels: usize, sample_rate: u32) -> Result<DecodedAudio> {
    if channels != 1 && channels != 2 {
        bail!("Unsupported channel count: {}", channels);
    }
    let bytes_per_frame = channels * 2;
    let frame_count = data.len() / bytes_per_frame;
    if frame_count == 0 {
        bail!("No complete PCM frames ({} bytes)", data.len());
    }

    let mut left = Vec::new();
    let mut right = Vec::new();
    left.try_reserve_exact(frame_count)
        .context("Failed to allocate left channel")?;
    right.try_reserve_exact(frame_count)
        .context("Failed to allocate right channel")?;

    for frame in data.chunks_exact(bytes_per_frame) {
        let l = i16::from_le_bytes([frame[0], frame[1]]) as f32 / 32768.0;
        let r = if channels == 2 {
            i16::from_le_bytes([frame[2], frame[3]]) as f32 / 32768.0
        } else {
            l
        };
        left.push(l);
        right.push(r);
    }

    DecodedAudio::from_channels(sample_rate, left, right).context("Failed to allocate mono buffer")
}

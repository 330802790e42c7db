use serde::Serialize;
use std::io::Write;

use crate::audio::features::{AnalysisOutput, BeatResult, StageTimings, WaveformProxyResult};

pub const RESPONSE_SCHEMA: &str = "tz_player.native_spectrum_helper_response.v1";
pub const HELPER_VERSION: &str = concat!("rust-ffmpeg-v", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
pub struct Response<'a> {
    schema: &'static str,
    helper_version: &'static str,
    duration_ms: u32,
    /// `[pos_ms, [band levels...]]`
    frames: Vec<(u32, &'a [u8])>,
    #[serde(skip_serializing_if = "Option::is_none")]
    beat: Option<BeatPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    waveform_proxy: Option<WaveformProxyPayload>,
    timings: TimingsPayload,
}

#[derive(Debug, Serialize)]
struct BeatPayload {
    duration_ms: u32,
    bpm: f64,
    /// `[pos_ms, strength, is_beat]`
    frames: Vec<(u32, u8, bool)>,
}

#[derive(Debug, Serialize)]
struct WaveformProxyPayload {
    duration_ms: u32,
    /// `[pos_ms, left_min, left_max, right_min, right_max]`
    frames: Vec<(u32, i8, i8, i8, i8)>,
}

#[derive(Debug, Serialize)]
struct TimingsPayload {
    decode_ms: f64,
    spectrum_ms: f64,
    beat_ms: f64,
    waveform_proxy_ms: f64,
    total_ms: f64,
}

impl<'a> Response<'a> {
    /// Build the response document. Each spectrum frame contributes exactly
    /// `band_count` levels.
    pub fn new(output: &'a AnalysisOutput, band_count: usize) -> Self {
        Self {
            schema: RESPONSE_SCHEMA,
            helper_version: HELPER_VERSION,
            duration_ms: output.duration_ms,
            frames: output
                .spectrum
                .frames
                .iter()
                .map(|f| (f.pos_ms, &f.bands[..band_count.min(f.bands.len())]))
                .collect(),
            beat: output.beat.as_ref().and_then(BeatPayload::from_result),
            waveform_proxy: output
                .waveform_proxy
                .as_ref()
                .and_then(WaveformProxyPayload::from_result),
            timings: TimingsPayload::from(&output.timings),
        }
    }

    pub fn write_to<W: Write>(&self, mut writer: W, pretty: bool) -> std::io::Result<()> {
        if pretty {
            serde_json::to_writer_pretty(&mut writer, self)?;
        } else {
            serde_json::to_writer(&mut writer, self)?;
        }
        writer.flush()
    }
}

impl BeatPayload {
    fn from_result(beat: &BeatResult) -> Option<Self> {
        if beat.frames.is_empty() {
            return None;
        }
        Some(Self {
            duration_ms: beat.duration_ms,
            bpm: round3(beat.bpm),
            frames: beat
                .frames
                .iter()
                .map(|f| (f.pos_ms, f.strength, f.is_beat))
                .collect(),
        })
    }
}

impl WaveformProxyPayload {
    fn from_result(waveform: &WaveformProxyResult) -> Option<Self> {
        if waveform.frames.is_empty() {
            return None;
        }
        Some(Self {
            duration_ms: waveform.duration_ms,
            frames: waveform
                .frames
                .iter()
                .map(|f| (f.pos_ms, f.left_min, f.left_max, f.right_min, f.right_max))
                .collect(),
        })
    }
}

impl From<&StageTimings> for TimingsPayload {
    fn from(t: &StageTimings) -> Self {
        Self {
            decode_ms: round3(t.decode_ms),
            spectrum_ms: round3(t.spectrum_ms),
            beat_ms: round3(t.beat_ms),
            waveform_proxy_ms: round3(t.waveform_proxy_ms),
            total_ms: round3(t.total_ms),
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

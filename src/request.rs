use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::HelperError;

pub const REQUEST_SCHEMA: &str = "tz_player.native_spectrum_helper_request.v1";

const DEFAULT_TARGET_RATE_HZ: i64 = 11_025;
const DEFAULT_HOP_MS: i64 = 40;
const DEFAULT_BAND_COUNT: i64 = 48;
const DEFAULT_MAX_FRAMES: i64 = 12_000;
const DEFAULT_BEAT_HOP_MS: i64 = 40;
const DEFAULT_BEAT_MAX_FRAMES: i64 = 12_000;
const DEFAULT_WAVEFORM_HOP_MS: i64 = 20;
const DEFAULT_WAVEFORM_MAX_FRAMES: i64 = 30_000;

const MIN_HOP_MS: i64 = 10;
const MIN_BAND_COUNT: i64 = 8;

/// Validated parameters for one helper run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub track_path: PathBuf,
    pub spectrum: SpectrumParams,
    /// Present only when a beat hop was supplied.
    pub beat: Option<BeatParams>,
    /// Present only when a waveform proxy hop was supplied.
    pub waveform_proxy: Option<WaveformProxyParams>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumParams {
    /// Not validated here; a non-positive rate fails the resample stage.
    pub mono_target_rate_hz: i64,
    pub hop_ms: u32,
    pub band_count: usize,
    pub max_frames: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatParams {
    pub hop_ms: u32,
    pub max_frames: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformProxyParams {
    pub hop_ms: u32,
    pub max_frames: usize,
}

/// Parse a request document.
///
/// Nested groups (`spectrum`, `beat`, `waveform_proxy`) take precedence over
/// the flat top-level keys, which take precedence over the built-in defaults.
/// Unknown fields are ignored.
pub fn parse_request(text: &str) -> Result<AnalysisRequest, HelperError> {
    if text.trim().is_empty() {
        return Err(HelperError::InvalidRequest("empty request".into()));
    }
    let document: Value = serde_json::from_str(text)
        .map_err(|e| HelperError::InvalidRequest(format!("malformed json: {}", e)))?;
    let root = document
        .as_object()
        .ok_or_else(|| HelperError::InvalidRequest("request is not a json object".into()))?;

    match root.get("schema").and_then(Value::as_str) {
        Some(REQUEST_SCHEMA) => {}
        Some(other) => {
            return Err(HelperError::InvalidRequest(format!("unsupported schema {:?}", other)))
        }
        None => return Err(HelperError::InvalidRequest("missing schema".into())),
    }
    let track_path = root
        .get("track_path")
        .and_then(Value::as_str)
        .ok_or_else(|| HelperError::InvalidRequest("missing track_path".into()))?;

    let spectrum_group = group(root, "spectrum");
    let spectrum = SpectrumParams {
        mono_target_rate_hz: resolve(
            spectrum_group,
            root,
            "mono_target_rate_hz",
            "mono_target_rate_hz",
            DEFAULT_TARGET_RATE_HZ,
        ),
        hop_ms: to_hop(resolve(spectrum_group, root, "hop_ms", "hop_ms", DEFAULT_HOP_MS).max(MIN_HOP_MS)),
        band_count: to_count(
            resolve(spectrum_group, root, "band_count", "band_count", DEFAULT_BAND_COUNT)
                .max(MIN_BAND_COUNT),
        ),
        max_frames: to_count(resolve(
            spectrum_group,
            root,
            "max_frames",
            "max_frames",
            DEFAULT_MAX_FRAMES,
        )),
    };

    let beat_group = group(root, "beat");
    let beat = enabling_hop(beat_group, root, "beat_timeline_hop_ms").map(|hop_ms| BeatParams {
        hop_ms: to_hop(if hop_ms < MIN_HOP_MS { DEFAULT_BEAT_HOP_MS } else { hop_ms }),
        max_frames: to_count(resolve(
            beat_group,
            root,
            "max_frames",
            "beat_timeline_max_frames",
            DEFAULT_BEAT_MAX_FRAMES,
        )),
    });

    let waveform_group = group(root, "waveform_proxy");
    let waveform_proxy =
        enabling_hop(waveform_group, root, "waveform_proxy_hop_ms").map(|hop_ms| {
            WaveformProxyParams {
                hop_ms: to_hop(if hop_ms < MIN_HOP_MS { DEFAULT_WAVEFORM_HOP_MS } else { hop_ms }),
                max_frames: to_count(resolve(
                    waveform_group,
                    root,
                    "max_frames",
                    "waveform_proxy_max_frames",
                    DEFAULT_WAVEFORM_MAX_FRAMES,
                )),
            }
        });

    Ok(AnalysisRequest {
        track_path: PathBuf::from(track_path),
        spectrum,
        beat,
        waveform_proxy,
    })
}

fn group<'a>(root: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    root.get(key).and_then(Value::as_object)
}

fn int_field(object: &Map<String, Value>, key: &str) -> Option<i64> {
    match object.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}

/// A zero in the nested group counts as unset, so the flat key still applies.
fn resolve(
    nested: Option<&Map<String, Value>>,
    root: &Map<String, Value>,
    key: &str,
    flat_key: &str,
    default: i64,
) -> i64 {
    nested
        .and_then(|g| int_field(g, key))
        .filter(|v| *v != 0)
        .or_else(|| int_field(root, flat_key))
        .unwrap_or(default)
}

/// The presence of a hop value, nested or flat, is what enables a stage.
fn enabling_hop(
    nested: Option<&Map<String, Value>>,
    root: &Map<String, Value>,
    flat_key: &str,
) -> Option<i64> {
    nested
        .and_then(|g| int_field(g, "hop_ms"))
        .or_else(|| int_field(root, flat_key))
}

fn to_hop(value: i64) -> u32 {
    value.clamp(1, u32::MAX as i64) as u32
}

fn to_count(value: i64) -> usize {
    value.clamp(1, i64::from(u32::MAX)) as usize
}

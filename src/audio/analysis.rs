use std::time::Instant;

use super::beat::analyze_beat;
use super::features::{AnalysisOutput, StageTimings};
use super::resample::resample_mono;
use super::spectrum::analyze_spectrum;
use super::waveform::analyze_waveform_proxy;
use crate::decode::{decode_track, DecoderSettings};
use crate::error::HelperError;
use crate::request::AnalysisRequest;

/// Run the full pipeline for one request: decode, resample, spectrum, then
/// beat and waveform proxy when requested. Stages run strictly in order and
/// the first failure ends the run with nothing emitted.
pub fn analyze(request: &AnalysisRequest, decoder: &DecoderSettings) -> Result<AnalysisOutput, HelperError> {
    let total_start = Instant::now();

    log::info!("Stage 1: Decoding {}...", request.track_path.display());
    let mut audio = decode_track(&request.track_path, decoder).map_err(HelperError::Decode)?;
    resample_mono(&mut audio, request.spectrum.mono_target_rate_hz)?;
    let decode_ms = elapsed_ms(total_start);

    log::info!("Stage 2: Spectrum ({} bands)...", request.spectrum.band_count);
    let stage_start = Instant::now();
    let spectrum = analyze_spectrum(&audio, &request.spectrum)?;
    let spectrum_ms = elapsed_ms(stage_start);

    let (beat, beat_ms) = match &request.beat {
        Some(params) => {
            log::info!("Stage 3: Beat timeline (hop={}ms)...", params.hop_ms);
            let stage_start = Instant::now();
            let beat = analyze_beat(&audio, params)?;
            (Some(beat), elapsed_ms(stage_start))
        }
        None => (None, 0.0),
    };

    let (waveform_proxy, waveform_proxy_ms) = match &request.waveform_proxy {
        Some(params) => {
            log::info!("Stage 4: Waveform proxy (hop={}ms)...", params.hop_ms);
            let stage_start = Instant::now();
            let waveform = analyze_waveform_proxy(&audio, params)?;
            (Some(waveform), elapsed_ms(stage_start))
        }
        None => (None, 0.0),
    };

    let timings = StageTimings {
        decode_ms,
        spectrum_ms,
        beat_ms,
        waveform_proxy_ms,
        total_ms: elapsed_ms(total_start),
    };
    log::debug!("Timings: {:?}", timings);

    Ok(AnalysisOutput {
        duration_ms: spectrum.duration_ms,
        spectrum,
        beat,
        waveform_proxy,
        timings,
    })
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{BeatParams, SpectrumParams, WaveformProxyParams};
    use std::path::Path;

    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn request(path: &Path) -> AnalysisRequest {
        AnalysisRequest {
            track_path: path.to_path_buf(),
            spectrum: SpectrumParams {
                mono_target_rate_hz: 11_025,
                hop_ms: 40,
                band_count: 8,
                max_frames: 12_000,
            },
            beat: None,
            waveform_proxy: None,
        }
    }

    #[test]
    fn resamples_before_spectrum_but_keeps_stereo_rate() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..44_100 * 2).map(|i| ((i % 100) * 200) as i16).collect();
        write_wav(&path, 44_100, 2, &samples);

        let mut req = request(&path);
        req.waveform_proxy = Some(WaveformProxyParams { hop_ms: 20, max_frames: 30_000 });
        let out = analyze(&req, &DecoderSettings::default()).unwrap();

        // 44.1 kHz -> 11.025 kHz, 441 samples per 40 ms hop
        assert_eq!(out.spectrum.frames.len(), 25);
        assert_eq!(out.duration_ms, 1000);
        // waveform proxy runs at 44.1 kHz: 882 samples per 20 ms hop
        assert_eq!(out.waveform_proxy.unwrap().frames.len(), 50);
        assert!(out.beat.is_none());
        assert_eq!(out.timings.beat_ms, 0.0);
    }

    #[test]
    fn optional_stages_run_when_requested() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 8000, 1, &vec![0i16; 8000]);

        let mut req = request(&path);
        req.beat = Some(BeatParams { hop_ms: 40, max_frames: 12_000 });
        let out = analyze(&req, &DecoderSettings::default()).unwrap();
        let beat = out.beat.unwrap();
        assert_eq!(beat.frames.len(), 25);
        assert_eq!(beat.bpm, 0.0);
        assert!(out.timings.total_ms >= out.timings.decode_ms);
    }

    #[test]
    fn decode_failure_is_reported_as_decode() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing.wav");
        let err = analyze(&request(&path), &DecoderSettings::default()).unwrap_err();
        assert!(matches!(err, HelperError::Decode(_)));
    }

    #[test]
    fn bad_target_rate_is_reported_as_resample() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 8000, 1, &vec![100i16; 800]);
        let mut req = request(&path);
        req.spectrum.mono_target_rate_hz = -1;
        let err = analyze(&req, &DecoderSettings::default()).unwrap_err();
        assert!(matches!(err, HelperError::Resample(_)));
    }
}

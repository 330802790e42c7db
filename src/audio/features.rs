/// One hop of the banded spectrum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpectrumFrame {
    /// Hop start in milliseconds
    pub pos_ms: u32,
    /// Quantized band levels, low to high frequency
    pub bands: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpectrumResult {
    pub duration_ms: u32,
    pub frames: Vec<SpectrumFrame>,
}

/// One hop of the onset timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeatFrame {
    pub pos_ms: u32,
    /// Normalized onset strength (0-255)
    pub strength: u8,
    pub is_beat: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BeatResult {
    pub duration_ms: u32,
    /// Estimated tempo, 0.0 when undetermined
    pub bpm: f64,
    pub frames: Vec<BeatFrame>,
}

/// Per-hop stereo envelope, each extremum scaled to [-127, 127].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaveformProxyFrame {
    pub pos_ms: u32,
    pub left_min: i8,
    pub left_max: i8,
    pub right_min: i8,
    pub right_max: i8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WaveformProxyResult {
    pub duration_ms: u32,
    pub frames: Vec<WaveformProxyFrame>,
}

/// Wall-clock time spent per stage, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageTimings {
    /// Decode plus resample
    pub decode_ms: f64,
    pub spectrum_ms: f64,
    pub beat_ms: f64,
    pub waveform_proxy_ms: f64,
    pub total_ms: f64,
}

/// Everything a successful run produces.
#[derive(Clone, Debug)]
pub struct AnalysisOutput {
    pub duration_ms: u32,
    pub spectrum: SpectrumResult,
    pub beat: Option<BeatResult>,
    pub waveform_proxy: Option<WaveformProxyResult>,
    pub timings: StageTimings,
}

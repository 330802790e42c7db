use thiserror::Error;

/// Every way a helper run can fail. The variant names the failing stage.
#[derive(Error, Debug)]
pub enum HelperError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("analysis failed (decode): {0:#}")]
    Decode(anyhow::Error),
    #[error("analysis failed (resample): {0}")]
    Resample(String),
    #[error("analysis failed (spectrum): {0}")]
    Spectrum(String),
    #[error("analysis failed (beat): {0}")]
    Beat(String),
    #[error("analysis failed (waveform_proxy): {0}")]
    WaveformProxy(String),
    #[error("failed to write response: {0}")]
    Output(#[from] std::io::Error),
}

impl HelperError {
    /// Process exit status: 2 for a rejected request, 1 for anything that
    /// failed after the request was accepted.
    pub fn exit_code(&self) -> u8 {
        match self {
            HelperError::InvalidRequest(_) => 2,
            _ => 1,
        }
    }
}

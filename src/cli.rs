use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "spectral-helper",
    version,
    about = "Extracts a quantized spectrum, beat timeline and waveform proxy from an audio file"
)]
pub struct Cli {
    /// Request document (JSON). Reads stdin when omitted or "-"
    #[arg(short, long)]
    pub request: Option<PathBuf>,

    /// Response file. Writes stdout when omitted or "-"
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Program used to decode formats other than PCM WAV
    #[arg(long, default_value_t = crate::config::default_ffmpeg())]
    pub ffmpeg: String,

    /// Never fall back to the external decoder
    #[arg(long)]
    pub no_fallback: bool,

    /// Pretty-print the response
    #[arg(long)]
    pub pretty: bool,
}

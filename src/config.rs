use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "spectral-helper";
const LOCAL_CONFIG: &str = "spectral-helper.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct DecoderConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_fallback")]
    pub fallback: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub pretty: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            fallback: default_fallback(),
        }
    }
}

pub fn default_ffmpeg() -> String { "ffmpeg".into() }
fn default_fallback() -> bool { true }

/// Explicit path, else `./spectral-helper.toml`, else the per-user config.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join(APP_DIR).join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join(APP_DIR).join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Option<Config> {
    toml::from_str(content).ok()
}

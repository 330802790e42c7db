mod audio;
mod cli;
mod config;
mod decode;
mod error;
mod request;
mod response;

use clap::Parser;
use std::io::{Read, Write};
use std::path::Path;
use std::process::ExitCode;

use cli::Cli;
use decode::DecoderSettings;
use error::HelperError;
use response::Response;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    if let Some(path) = config::find_config(cli.config.as_deref()) {
        if let Some(cfg) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            // Config values apply only when the CLI is at its default
            if cli.ffmpeg == config::default_ffmpeg() { cli.ffmpeg = cfg.decoder.ffmpeg; }
            if !cli.no_fallback { cli.no_fallback = !cfg.decoder.fallback; }
            if !cli.pretty { cli.pretty = cfg.output.pretty; }
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<(), HelperError> {
    let text = read_request(cli.request.as_deref())?;
    let request = request::parse_request(&text)?;
    log::info!("Track: {}", request.track_path.display());

    let settings = DecoderSettings {
        ffmpeg: cli.ffmpeg.clone(),
        allow_fallback: !cli.no_fallback,
    };
    let output = audio::analysis::analyze(&request, &settings)?;

    // A failed run must leave no partial output.
    let mut buf = Vec::new();
    Response::new(&output, request.spectrum.band_count).write_to(&mut buf, cli.pretty)?;

    match cli.output.as_deref() {
        Some(path) if !is_stdio(path) => std::fs::write(path, &buf)?,
        _ => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&buf)?;
            stdout.flush()?;
        }
    }

    log::info!(
        "Done: {} spectrum frames in {:.1}ms",
        output.spectrum.frames.len(),
        output.timings.total_ms
    );
    Ok(())
}

fn read_request(path: Option<&Path>) -> Result<String, HelperError> {
    match path {
        Some(path) if !is_stdio(path) => std::fs::read_to_string(path).map_err(|e| {
            HelperError::InvalidRequest(format!("cannot read {}: {}", path.display(), e))
        }),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| HelperError::InvalidRequest(format!("cannot read stdin: {}", e)))?;
            Ok(text)
        }
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

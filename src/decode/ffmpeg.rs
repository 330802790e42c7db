use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use crate::audio::DecodedAudio;
use super::pcm16_to_audio;

/// Rate the external decoder is asked to resample to.
pub const DECODE_RATE_HZ: u32 = 44_100;

const READ_CHUNK: usize = 64 * 1024;

/// Decodes arbitrary formats by streaming raw PCM16 stereo out of ffmpeg.
pub struct FfmpegDecoder<'a> {
    program: &'a str,
}

impl<'a> FfmpegDecoder<'a> {
    pub fn new(program: &'a str) -> Self {
        Self { program }
    }

    fn args(path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-v".into(), "error".into(), "-i".into()];
        args.push(path.as_os_str().to_os_string());
        args.extend(
            [
                "-vn", "-sn", "-dn",
                "-f", "s16le",
                "-acodec", "pcm_s16le",
                "-ac", "2",
                "-ar", "44100",
                "pipe:1",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args
    }

    pub fn decode(&self, path: &Path) -> Result<DecodedAudio> {
        let mut child = Command::new(self.program)
            .args(Self::args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn {}. Is it installed?", self.program))?;

        let mut stdout = child
            .stdout
            .take()
            .context("Decoder stdout not available")?;

        // Drain while waiting: the child stalls once the pipe fills.
        let reader = thread::spawn(move || read_pcm(&mut stdout));

        let status = child
            .wait()
            .with_context(|| format!("Failed to wait for {}", self.program))?;
        let raw = match reader.join() {
            Ok(result) => result.context("Failed to read decoder output")?,
            Err(_) => bail!("Decoder output reader panicked"),
        };

        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        if raw.len() < 4 {
            bail!("{} produced no usable PCM ({} bytes)", self.program, raw.len());
        }
        log::debug!("{} produced {} PCM bytes", self.program, raw.len());

        pcm16_to_audio(&raw, 2, DECODE_RATE_HZ)
    }
}

/// Collect a PCM stream, reporting allocation failure as an I/O error.
fn read_pcm<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut raw = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        raw.try_reserve(n)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
        raw.extend_from_slice(&chunk[..n]);
    }
    Ok(raw)
}

#[cfg(test)]
mod read_tests {
    use super::*;

    /// Hands out at most `step` bytes per read, with an interruption up front.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
        interrupted: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
            }
            let n = buf.len().min(self.step).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn collects_stream_across_chunks() {
        let data: Vec<u8> = (0..3 * READ_CHUNK + 17).map(|i| (i % 251) as u8).collect();
        let mut reader = Trickle { data: data.clone(), pos: 0, step: 5000, interrupted: false };
        assert_eq!(read_pcm(&mut reader).unwrap(), data);
    }

    #[test]
    fn read_errors_propagate() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
        }
        let err = read_pcm(&mut Broken).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}

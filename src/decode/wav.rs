use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::audio::DecodedAudio;
use super::pcm16_to_audio;

const WAVE_FORMAT_PCM: u16 = 1;
const MIN_FILE_SIZE: usize = 45;
const HEADER_SIZE: usize = 12;

/// Format fields pulled from a `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WavFormat {
    audio_format: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Read and parse a WAV file. Anything without the RIFF/WAVE magic is
/// rejected after reading only the 12-byte header.
pub fn decode_wav(path: &Path) -> Result<DecodedAudio> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let file_len = file
        .metadata()
        .with_context(|| format!("Failed to stat audio file: {}", path.display()))?
        .len();
    let file_len = usize::try_from(file_len).context("File too large to load")?;
    if file_len < MIN_FILE_SIZE {
        bail!("File too small for a WAV header ({} bytes)", file_len);
    }

    let header = read_header(&mut file)?;
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(file_len)
        .with_context(|| format!("Failed to allocate {} bytes for {}", file_len, path.display()))?;
    bytes.extend_from_slice(&header);
    file.read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read audio file: {}", path.display()))?;
    parse_wav(&bytes)
}

/// Read the RIFF header and check its magic.
fn read_header<R: Read>(reader: &mut R) -> Result<[u8; HEADER_SIZE]> {
    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .context("Failed to read WAV header")?;
    check_magic(&header)?;
    Ok(header)
}

fn check_magic(header: &[u8]) -> Result<()> {
    if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        bail!("Missing RIFF/WAVE magic");
    }
    Ok(())
}

/// Parse a RIFF/WAVE image holding 16-bit linear PCM, mono or stereo.
pub fn parse_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    if bytes.len() < MIN_FILE_SIZE {
        bail!("File too small for a WAV header ({} bytes)", bytes.len());
    }
    check_magic(bytes)?;

    let mut format: Option<WavFormat> = None;
    let mut data: Option<&[u8]> = None;

    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32_le(&bytes[offset + 4..offset + 8]) as usize;
        let body_start = offset + 8;
        // Chunks are padded to an even length.
        let next = body_start + size + (size & 1);
        if next > bytes.len() {
            break;
        }
        let body = &bytes[body_start..body_start + size];
        match id {
            b"fmt " if size >= 16 => {
                format = Some(WavFormat {
                    audio_format: read_u16_le(&body[0..2]),
                    channels: read_u16_le(&body[2..4]),
                    sample_rate: read_u32_le(&body[4..8]),
                    bits_per_sample: read_u16_le(&body[14..16]),
                });
            }
            b"data" => data = Some(body),
            _ => {}
        }
        offset = next;
    }

    let format = format.context("Missing fmt chunk")?;
    let data = data.context("Missing data chunk")?;
    if format.sample_rate == 0 || format.channels == 0 {
        bail!("Invalid format: {}Hz, {} channels", format.sample_rate, format.channels);
    }
    if format.audio_format != WAVE_FORMAT_PCM {
        bail!("Unsupported WAV encoding (format code {})", format.audio_format);
    }
    if format.bits_per_sample != 16 {
        bail!("Unsupported bit depth: {}", format.bits_per_sample);
    }
    if format.channels > 2 {
        bail!("Unsupported channel count: {}", format.channels);
    }

    pcm16_to_audio(data, usize::from(format.channels), format.sample_rate)
}

fn read_u32_le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u16_le(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

use std::io::{Read, Write};
use std::str::FromStr;

use crate::{Error, Result};

pub const EXPORT_FILE_NAME: &str = "decoded.wav";
pub const EXPORT_MIME_TYPE: &str = "audio/wav";

const HEADER_LEN: usize = 44;
const FMT_CHUNK_LEN: u32 = 16;
const FORMAT_PCM: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum ExportFormat {
    #[default]
    Wav,
}

impl ExportFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            ExportFormat::Wav => EXPORT_FILE_NAME,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Wav => EXPORT_MIME_TYPE,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "wav" => Ok(ExportFormat::Wav),
            other => Err(Error::UnsupportedFormat(other.into())),
        }
    }
}

/// Write interleaved samples as a 16-bit PCM wave file.
///
/// Each sample is clamped to `[-1, 1]` before scaling by 32767.
pub fn write_wav<W: Write>(
    writer: &mut W,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<()> {
    let data_size = samples
        .len()
        .checked_mul(usize::from(BYTES_PER_SAMPLE))
        .and_then(|size| u32::try_from(size).ok())
        .filter(|size| size.checked_add(36).is_some())
        .ok_or(Error::ExportTooLarge(samples.len()))?;

    let block_align = channels.wrapping_mul(BYTES_PER_SAMPLE);
    let byte_rate = sample_rate.wrapping_mul(u32::from(block_align));

    writer.write_all(b"RIFF")?;
    writer.write_all(&(36 + data_size).to_le_bytes())?;
    writer.write_all(b"WAVE")?;

    writer.write_all(b"fmt ")?;
    writer.write_all(&FMT_CHUNK_LEN.to_le_bytes())?;
    writer.write_all(&FORMAT_PCM.to_le_bytes())?;
    writer.write_all(&channels.to_le_bytes())?;
    writer.write_all(&sample_rate.to_le_bytes())?;
    writer.write_all(&byte_rate.to_le_bytes())?;
    writer.write_all(&block_align.to_le_bytes())?;
    writer.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;

    writer.write_all(b"data")?;
    writer.write_all(&data_size.to_le_bytes())?;

    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_all(&value.to_le_bytes())?;
    }

    Ok(())
}

/// Encode interleaved samples into an in-memory wave file of exactly
/// `44 + 2 * samples.len()` bytes
pub fn encode(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + samples.len() * 2);
    write_wav(&mut bytes, samples, sample_rate, channels)?;

    tracing::info!(
        samples = samples.len(),
        bytes = bytes.len(),
        "Encoded wave file"
    );

    Ok(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub frame_count: u32,
    pub duration: f64,
}

pub fn read_info<R: Read>(reader: R) -> Result<WavInfo> {
    let reader = hound::WavReader::new(reader)?;
    let spec = reader.spec();
    let frame_count = reader.duration();

    Ok(WavInfo {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        frame_count,
        duration: f64::from(frame_count) / f64::from(spec.sample_rate),
    })
}

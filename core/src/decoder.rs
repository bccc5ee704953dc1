use crate::{Error, Result};

const FULL_SCALE: f32 = 32768.0;
const BYTE_MIDPOINT: f32 = 128.0;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BitDepth {
    Eight,
    Sixteen,
}

impl BitDepth {
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }

    /// Bytes occupied by one sample
    pub fn step(self) -> usize {
        usize::from(self.bits() / 8)
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = Error;

    fn try_from(bits: u16) -> Result<Self> {
        match bits {
            8 => Ok(BitDepth::Eight),
            16 => Ok(BitDepth::Sixteen),
            other => Err(Error::UnsupportedBitDepth(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PcmFormat {
    pub bit_depth: BitDepth,
    pub signed: bool,
    pub endianness: Endianness,
}

impl Default for PcmFormat {
    fn default() -> Self {
        PcmFormat {
            bit_depth: BitDepth::Sixteen,
            signed: true,
            endianness: Endianness::Little,
        }
    }
}

/// Fixed-width integer samples read straight out of a byte slice.
///
/// Trailing bytes that cannot fill a whole sample are not part of the
/// stream.
#[derive(Debug, Clone, Copy)]
pub struct RawSampleStream<'a> {
    bytes: &'a [u8],
    format: PcmFormat,
}

impl<'a> RawSampleStream<'a> {
    pub fn new(bytes: &'a [u8], format: PcmFormat) -> Self {
        RawSampleStream { bytes, format }
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.format.bit_depth.step()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Integer sample values, sign-extended according to the format
    pub fn raw_values(&self) -> impl Iterator<Item = i32> + 'a {
        let format = self.format;

        self.bytes
            .chunks_exact(format.bit_depth.step())
            .map(move |chunk| read_raw(chunk, format))
    }

    pub fn decode(&self) -> Vec<f32> {
        let bit_depth = self.format.bit_depth;

        self.raw_values()
            .map(|raw| match bit_depth {
                BitDepth::Sixteen => raw as f32 / FULL_SCALE,
                // Signed bytes go through the same offset as unsigned ones
                BitDepth::Eight => (raw as f32 - BYTE_MIDPOINT) / BYTE_MIDPOINT,
            })
            .collect()
    }
}

fn read_raw(chunk: &[u8], format: PcmFormat) -> i32 {
    match format.bit_depth {
        BitDepth::Eight => {
            if format.signed {
                i32::from(chunk[0] as i8)
            } else {
                i32::from(chunk[0])
            }
        }
        BitDepth::Sixteen => {
            let pair = [chunk[0], chunk[1]];

            match (format.signed, format.endianness) {
                (true, Endianness::Little) => i16::from_le_bytes(pair).into(),
                (true, Endianness::Big) => i16::from_be_bytes(pair).into(),
                (false, Endianness::Little) => u16::from_le_bytes(pair).into(),
                (false, Endianness::Big) => u16::from_be_bytes(pair).into(),
            }
        }
    }
}

/// Decode raw PCM bytes into normalized float samples, one per whole
/// sample in `bytes`
pub fn decode(bytes: &[u8], format: PcmFormat) -> Vec<f32> {
    let samples = RawSampleStream::new(bytes, format).decode();

    tracing::debug!(
        bytes = bytes.len(),
        samples = samples.len(),
        bits = format.bit_depth.bits(),
        "Decoded PCM"
    );

    samples
}

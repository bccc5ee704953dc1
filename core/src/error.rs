use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Channel count must be non-zero")]
    InvalidChannelCount,

    #[error("Sample rate must be non-zero")]
    InvalidSampleRate,

    #[error("Playback rate must be positive and finite, got {0}")]
    InvalidPlaybackRate(f64),

    #[error("Samples must be 8- or 16-bits, got {0}")]
    UnsupportedBitDepth(u16),

    #[error("Select a PCM file")]
    NoFileSelected,

    #[error("Export format \"{0}\" is not supported")]
    UnsupportedFormat(String),

    #[error("Unknown waveform mode \"{0}\"")]
    UnknownReductionMode(String),

    #[error("No audio buffer loaded")]
    NoBuffer,

    #[error("{0} samples do not fit in a wave file")]
    ExportTooLarge(usize),

    #[error("Audio output: {0}")]
    Output(String),

    #[error(transparent)]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

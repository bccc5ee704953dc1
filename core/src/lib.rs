mod error;
pub use error::*;

mod decoder;
pub use decoder::*;

mod buffer;
pub use buffer::*;

mod waveform;
pub use waveform::*;

mod clock;
pub use clock::*;

mod player;
pub use player::*;

mod wav;
pub use wav::*;

mod session;
pub use session::*;

/// Session that plays through the default output device
pub fn setup_session(config: SessionConfig) -> PlayerSession<CpalSink> {
    PlayerSession::new(CpalSink::new(), SystemClock::new(), config)
}

/// Session for decoding, rendering and export without audio output
pub fn offline_session(config: SessionConfig) -> PlayerSession<SilentSink> {
    PlayerSession::new(SilentSink, SystemClock::new(), config)
}

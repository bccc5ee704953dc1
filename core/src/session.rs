use std::path::Path;
use std::sync::Arc;

use crate::{
    decode, encode, ruler_ticks, AudioBuffer, AudioSink, Clock, Envelope,
    Error, ExportFormat, PcmFormat, PlaybackState, Progress, ReductionMode,
    Result, SystemClock, Tick, TransportState, Viewport, WaveformCache,
};

/// Everything needed to interpret a headerless PCM byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: PcmFormat,
}

impl Default for DecodeParams {
    fn default() -> Self {
        DecodeParams {
            sample_rate: 44100,
            channels: 1,
            format: PcmFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionConfig {
    pub reduction: ReductionMode,
}

/// A loaded buffer plus its transport, view and output.
///
/// Operations are not reentrant; every mutation goes through `&mut self`.
pub struct PlayerSession<S: AudioSink, C: Clock = SystemClock> {
    sink: S,
    clock: C,
    config: SessionConfig,
    buffer: Option<Arc<AudioBuffer>>,
    samples: Vec<f32>,
    generation: u64,
    state: PlaybackState,
    viewport: Viewport,
    cache: WaveformCache,
}

impl<S: AudioSink, C: Clock> PlayerSession<S, C> {
    pub fn new(sink: S, clock: C, config: SessionConfig) -> Self {
        PlayerSession {
            sink,
            clock,
            config,
            buffer: None,
            samples: Vec::new(),
            generation: 0,
            state: PlaybackState::default(),
            viewport: Viewport::default(),
            cache: WaveformCache::new(),
        }
    }

    /// Decode `bytes` and replace the current buffer.
    ///
    /// On error the previous buffer stays loaded.
    pub fn load(&mut self, bytes: &[u8], params: &DecodeParams) -> Result<()> {
        let samples = decode(bytes, params.format);
        let buffer =
            AudioBuffer::build(&samples, params.sample_rate, params.channels)?;

        self.sink.stop();
        self.state.reset();
        self.cache.clear();
        self.generation += 1;

        tracing::info!(
            channels = buffer.channels(),
            sample_rate = buffer.sample_rate(),
            duration = buffer.duration(),
            "Loaded PCM buffer"
        );

        self.buffer = Some(Arc::new(buffer));
        self.samples = samples;

        Ok(())
    }

    pub fn load_file(
        &mut self,
        path: Option<&Path>,
        params: &DecodeParams,
    ) -> Result<()> {
        let path = path.ok_or(Error::NoFileSelected)?;
        let bytes = std::fs::read(path)?;
        self.load(&bytes, params)
    }

    pub fn buffer(&self) -> Option<&AudioBuffer> {
        self.buffer.as_deref()
    }

    /// Flat decoded samples, as exported
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn transport(&self) -> TransportState {
        self.state.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map(|b| b.duration()).unwrap_or(0.0)
    }

    fn loaded(&self) -> Result<Arc<AudioBuffer>> {
        self.buffer.as_ref().map(Arc::clone).ok_or(Error::NoBuffer)
    }

    fn start_instance(&mut self, buffer: Arc<AudioBuffer>) -> Result<()> {
        let now = self.clock.now();

        self.sink
            .start(buffer, self.state.pause_offset, self.state.playback_rate)?;
        self.state.start(now);

        tracing::debug!(
            offset = self.state.pause_offset,
            rate = self.state.active_rate,
            "Playing"
        );

        Ok(())
    }

    pub fn play(&mut self) -> Result<()> {
        let buffer = self.loaded()?;

        if self.state.is_playing() {
            self.state.checkpoint(self.clock.now());
            self.sink.stop();
        }

        self.start_instance(buffer)
    }

    pub fn pause(&mut self) {
        if !self.state.is_playing() {
            return;
        }

        self.sink.stop();
        self.state.pause(self.clock.now());

        tracing::debug!(offset = self.state.pause_offset, "Paused");
    }

    pub fn toggle(&mut self) -> Result<()> {
        if self.state.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Jump to `ratio` of the way through the buffer
    pub fn seek(&mut self, ratio: f64) -> Result<()> {
        let buffer = self.loaded()?;
        let ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };

        self.state.pause_offset = ratio * buffer.duration();
        self.state.displayed_position = self.state.pause_offset;

        if self.state.is_playing() {
            self.sink.stop();
            self.start_instance(buffer)?;
        }

        Ok(())
    }

    /// Advance the displayed position; call once per rendered frame.
    ///
    /// Returns `None` unless playing. Reaching the end stops playback and
    /// reports the final position once.
    pub fn tick(&mut self) -> Option<Progress> {
        if !self.state.is_playing() {
            return None;
        }

        let duration = self.duration();
        let position = self.state.position(self.clock.now());

        if position >= duration || self.sink.finished() {
            self.sink.stop();
            self.state.finish(duration);

            tracing::debug!(duration, "Reached end of buffer");

            return Some(Progress {
                position: duration,
                duration,
            });
        }

        self.state.displayed_position = position;

        Some(Progress { position, duration })
    }

    pub fn progress(&self) -> Progress {
        Progress {
            position: self.state.displayed_position,
            duration: self.duration(),
        }
    }

    pub fn playback_rate(&self) -> f64 {
        self.state.playback_rate
    }

    /// Takes effect from the next `play`
    pub fn set_playback_rate(&mut self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::InvalidPlaybackRate(rate));
        }

        self.state.playback_rate = rate;

        Ok(())
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.viewport.set_zoom(zoom);
    }

    pub fn set_pan(&mut self, offset: f64) {
        self.viewport.set_offset(offset);
    }

    fn render_viewport(&self) -> Viewport {
        match self.config.reduction {
            ReductionMode::Rms => Viewport::default(),
            ReductionMode::MinMax => self.viewport,
        }
    }

    /// Envelope of the first channel at `width` columns
    pub fn envelope(&mut self, width: usize) -> Result<&Envelope> {
        let viewport = self.render_viewport();
        let buffer = self.buffer.as_ref().ok_or(Error::NoBuffer)?;
        let channel = buffer.channel(0).unwrap_or(&[]);

        Ok(self.cache.envelope(
            self.generation,
            channel,
            width,
            &viewport,
            self.config.reduction,
        ))
    }

    pub fn ruler(&self, width: usize) -> Result<Vec<Tick>> {
        let buffer = self.buffer.as_ref().ok_or(Error::NoBuffer)?;
        Ok(ruler_ticks(buffer.duration(), width, &self.render_viewport()))
    }

    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>> {
        let buffer = self.buffer.as_ref().ok_or(Error::NoBuffer)?;

        match format {
            ExportFormat::Wav => {
                encode(&self.samples, buffer.sample_rate(), buffer.channels())
            }
        }
    }
}

impl<S: AudioSink, C: Clock> Drop for PlayerSession<S, C> {
    fn drop(&mut self) {
        self.sink.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BitDepth, Column, Endianness};
    use std::cell::Cell;

    #[derive(Debug, Default)]
    struct ManualClock {
        now: Cell<f64>,
    }

    impl ManualClock {
        fn set(&self, now: f64) {
            self.now.set(now);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> f64 {
            self.now.get()
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Event {
        Start { offset: f64, rate: f64 },
        Stop,
    }

    #[derive(Debug, Default)]
    struct RecordingSink {
        events: Vec<Event>,
        active: usize,
        finished: bool,
    }

    impl RecordingSink {
        fn starts(&self) -> Vec<(f64, f64)> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Start { offset, rate } => Some((*offset, *rate)),
                    Event::Stop => None,
                })
                .collect()
        }
    }

    impl AudioSink for RecordingSink {
        fn start(
            &mut self,
            _: Arc<AudioBuffer>,
            offset: f64,
            rate: f64,
        ) -> Result<()> {
            assert_eq!(self.active, 0, "Two instances playing at once");
            self.active += 1;
            self.events.push(Event::Start { offset, rate });
            Ok(())
        }

        fn stop(&mut self) {
            self.active = 0;
            self.events.push(Event::Stop);
        }

        fn finished(&self) -> bool {
            self.finished
        }
    }

    type TestSession = PlayerSession<RecordingSink, ManualClock>;

    fn session() -> TestSession {
        PlayerSession::new(
            RecordingSink::default(),
            ManualClock::default(),
            SessionConfig::default(),
        )
    }

    fn mono_8k() -> DecodeParams {
        DecodeParams {
            sample_rate: 8000,
            channels: 1,
            format: PcmFormat::default(),
        }
    }

    // `seconds` of 16-bit mono at 8 kHz
    fn loaded(seconds: usize) -> TestSession {
        let mut session = session();
        let bytes = vec![0u8; seconds * 8000 * 2];
        session.load(&bytes, &mono_8k()).unwrap();
        session
    }

    #[test]
    fn transport_needs_buffer() {
        let mut session = session();
        assert!(matches!(session.play(), Err(Error::NoBuffer)));
        assert!(matches!(session.seek(0.5), Err(Error::NoBuffer)));
        assert!(matches!(session.envelope(10), Err(Error::NoBuffer)));
        assert!(matches!(
            session.export(ExportFormat::Wav),
            Err(Error::NoBuffer)
        ));
        assert_eq!(session.transport(), TransportState::Stopped);
        session.pause();
        assert_eq!(session.tick(), None);
    }

    #[test]
    fn invalid_params_keep_previous_buffer() {
        let mut session = loaded(2);
        let params = DecodeParams {
            channels: 0,
            ..mono_8k()
        };

        assert!(matches!(
            session.load(&[0, 0], &params),
            Err(Error::InvalidChannelCount)
        ));
        assert_eq!(session.duration(), 2.0);

        let params = DecodeParams {
            sample_rate: 0,
            ..mono_8k()
        };
        assert!(matches!(
            session.load(&[0, 0], &params),
            Err(Error::InvalidSampleRate)
        ));
    }

    #[test]
    fn no_file_selected() {
        let mut session = session();
        assert!(matches!(
            session.load_file(None, &mono_8k()),
            Err(Error::NoFileSelected)
        ));
    }

    #[test]
    fn pause_and_resume() {
        let mut session = loaded(10);
        session.clock().set(1.0);
        session.play().unwrap();
        assert_eq!(session.transport(), TransportState::Playing);

        session.clock().set(4.0);
        session.pause();
        assert_eq!(session.transport(), TransportState::Paused);
        assert_eq!(session.state().pause_offset, 3.0);
        assert_eq!(session.progress().position, 3.0);

        session.clock().set(20.0);
        session.play().unwrap();
        assert_eq!(session.sink().starts(), vec![(0.0, 1.0), (3.0, 1.0)]);
    }

    #[test]
    fn toggle_flips_transport() {
        let mut session = loaded(10);
        session.toggle().unwrap();
        assert_eq!(session.transport(), TransportState::Playing);
        session.toggle().unwrap();
        assert_eq!(session.transport(), TransportState::Paused);
    }

    #[test]
    fn seek_while_playing_restarts() {
        let mut session = loaded(10);
        session.play().unwrap();
        session.clock().set(2.0);
        session.seek(0.5).unwrap();

        assert_eq!(session.state().pause_offset, 5.0);
        assert_eq!(session.transport(), TransportState::Playing);
        assert_eq!(session.sink().starts(), vec![(0.0, 1.0), (5.0, 1.0)]);
        assert_eq!(
            session.sink().events[2..],
            [Event::Stop, Event::Start { offset: 5.0, rate: 1.0 }]
        );

        session.clock().set(3.0);
        assert_eq!(session.tick().map(|p| p.position), Some(6.0));
    }

    #[test]
    fn seek_while_paused_only_moves_display() {
        let mut session = loaded(10);
        session.seek(0.25).unwrap();
        assert_eq!(session.transport(), TransportState::Stopped);
        assert_eq!(session.progress().position, 2.5);
        assert!(session.sink().starts().is_empty());

        session.seek(7.0).unwrap();
        assert_eq!(session.state().pause_offset, 10.0);
        session.seek(f64::NAN).unwrap();
        assert_eq!(session.state().pause_offset, 0.0);
    }

    #[test]
    fn play_while_playing_replaces_instance() {
        let mut session = loaded(10);
        session.play().unwrap();
        session.clock().set(2.0);
        session.play().unwrap();
        assert_eq!(session.sink().starts(), vec![(0.0, 1.0), (2.0, 1.0)]);
    }

    #[test]
    fn end_of_buffer_stops_once() {
        let mut session = loaded(10);
        session.play().unwrap();

        session.clock().set(9.5);
        assert_eq!(
            session.tick(),
            Some(Progress {
                position: 9.5,
                duration: 10.0
            })
        );

        session.clock().set(10.0);
        assert_eq!(
            session.tick(),
            Some(Progress {
                position: 10.0,
                duration: 10.0
            })
        );
        assert_eq!(session.transport(), TransportState::Stopped);
        assert_eq!(session.state().pause_offset, 0.0);
        assert_eq!(session.progress().position, 10.0);

        session.clock().set(11.0);
        assert_eq!(session.tick(), None);
        assert_eq!(session.progress().position, 10.0);

        session.play().unwrap();
        assert_eq!(session.sink().starts().last(), Some(&(0.0, 1.0)));
    }

    #[test]
    fn sink_completion_stops() {
        let mut session = loaded(10);
        session.play().unwrap();
        session.sink.finished = true;
        session.clock().set(1.0);

        assert_eq!(session.tick().map(|p| p.position), Some(10.0));
        assert_eq!(session.transport(), TransportState::Stopped);
    }

    #[test]
    fn rate_applies_on_next_play() {
        let mut session = loaded(10);
        session.play().unwrap();
        session.set_playback_rate(2.0).unwrap();

        session.clock().set(1.0);
        assert_eq!(session.tick().map(|p| p.position), Some(1.0));

        session.pause();
        session.play().unwrap();
        assert_eq!(session.sink().starts().last(), Some(&(1.0, 2.0)));

        session.clock().set(3.0);
        session.pause();
        assert_eq!(session.state().pause_offset, 5.0);
    }

    #[test]
    fn reject_bad_rates() {
        let mut session = loaded(1);
        assert!(matches!(
            session.set_playback_rate(0.0),
            Err(Error::InvalidPlaybackRate(_))
        ));
        assert!(session.set_playback_rate(f64::INFINITY).is_err());
        assert_eq!(session.playback_rate(), 1.0);
    }

    #[test]
    fn reload_resets_transport() {
        let mut session = loaded(10);
        session.play().unwrap();
        session.clock().set(3.0);

        session.load(&[0u8; 8000], &mono_8k()).unwrap();
        assert_eq!(session.transport(), TransportState::Stopped);
        assert_eq!(session.state().pause_offset, 0.0);
        assert_eq!(session.duration(), 0.5);
        assert_eq!(session.sink().events.last(), Some(&Event::Stop));
    }

    #[test]
    fn envelope_follows_mode_and_zoom() {
        let mut session = PlayerSession::new(
            RecordingSink::default(),
            ManualClock::default(),
            SessionConfig {
                reduction: ReductionMode::MinMax,
            },
        );

        let params = DecodeParams {
            sample_rate: 4,
            channels: 2,
            format: PcmFormat {
                bit_depth: BitDepth::Eight,
                signed: false,
                endianness: Endianness::Little,
            },
        };

        // left channel ramps up, right channel stays silent
        let bytes = [0u8, 128, 64, 128, 192, 128, 255, 128];
        session.load(&bytes, &params).unwrap();

        let columns = session.envelope(2).unwrap().columns().to_vec();
        assert_eq!(
            columns,
            vec![
                Column::Span {
                    min: -1.0,
                    max: -0.5
                },
                Column::Span {
                    min: 0.5,
                    max: 127.0 / 128.0
                },
            ]
        );

        session.set_zoom(2.0);
        let columns = session.envelope(2).unwrap().columns().to_vec();
        assert_eq!(
            columns,
            vec![
                Column::Span {
                    min: -1.0,
                    max: -1.0
                },
                Column::Span {
                    min: -0.5,
                    max: -0.5
                },
            ]
        );

        // one second at zoom 2 puts the 1s tick off the canvas
        assert_eq!(session.ruler(100).unwrap().len(), 1);

        session.set_zoom(1.0);
        let ticks = session.ruler(100).unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[1].x, 100.0);
    }

    #[test]
    fn export_uses_all_decoded_samples() {
        let mut session = session();
        let params = DecodeParams {
            channels: 2,
            ..mono_8k()
        };
        session.load(&[0, 0x40, 0, 0xC0, 0, 0x20], &params).unwrap();
        assert_eq!(session.buffer().map(|b| b.frame_count()), Some(1));

        let bytes = session.export(ExportFormat::Wav).unwrap();
        assert_eq!(bytes.len(), 44 + 6);
    }
}

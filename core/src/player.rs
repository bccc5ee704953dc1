use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SampleRate, SupportedStreamConfig};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use crate::{AudioBuffer, Error, Result};

const CD_SAMPLE_RATE: u32 = 44100;
const DVD_SAMPLE_RATE: u32 = 48000;
const DVD_DIVISOR: u32 = 8000;
const NO_OUTPUT: &str = "No output device found";
const SINC_LEN: usize = 256;

/// Audio output driven by the transport.
///
/// `start` plays `buffer` from `offset_seconds` at `rate` times normal
/// speed. Starting again replaces whatever was playing.
pub trait AudioSink {
    fn start(
        &mut self,
        buffer: Arc<AudioBuffer>,
        offset_seconds: f64,
        rate: f64,
    ) -> Result<()>;

    fn stop(&mut self);

    /// True once the active instance has run out of samples
    fn finished(&self) -> bool {
        false
    }
}

/// Sink that discards everything, for sessions that never play
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl AudioSink for SilentSink {
    fn start(&mut self, _: Arc<AudioBuffer>, _: f64, _: f64) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Plays through the default output device
#[derive(Debug, Default)]
pub struct CpalSink {
    state: SinkState,
    prepared: Option<Prepared>,
    playhead: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
}

// Resampled copy of a buffer for one device rate and playback speed
#[derive(Debug)]
struct Prepared {
    source: Arc<AudioBuffer>,
    rate: f64,
    device_rate: u32,
    frames: Arc<Vec<Vec<f32>>>,
}

impl CpalSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output frames written so far by the active instance
    pub fn playhead(&self) -> usize {
        self.playhead.load(Ordering::Relaxed)
    }

    fn prepare(
        &mut self,
        buffer: &Arc<AudioBuffer>,
        rate: f64,
        device_rate: u32,
    ) -> Result<Arc<Vec<Vec<f32>>>> {
        if let Some(prepared) = &self.prepared {
            if Arc::ptr_eq(&prepared.source, buffer)
                && prepared.rate == rate
                && prepared.device_rate == device_rate
            {
                return Ok(Arc::clone(&prepared.frames));
            }
        }

        let ratio = resample_ratio(buffer.sample_rate(), device_rate, rate);
        let frames = Arc::new(resample(ratio, buffer.channel_data())?);

        tracing::debug!(
            ratio,
            device_rate,
            frames = frames.first().map(Vec::len).unwrap_or(0),
            "Resampled buffer for output"
        );

        self.prepared = Some(Prepared {
            source: Arc::clone(buffer),
            rate,
            device_rate,
            frames: Arc::clone(&frames),
        });

        Ok(frames)
    }
}

impl AudioSink for CpalSink {
    fn start(
        &mut self,
        buffer: Arc<AudioBuffer>,
        offset_seconds: f64,
        rate: f64,
    ) -> Result<()> {
        self.stop();

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Output(NO_OUTPUT.into()))?;

        let stream_config =
            stream_config(&device, buffer.sample_rate(), buffer.channels())?;
        let device_rate = stream_config.sample_rate().0;
        let channels = stream_config.channels();

        let frames = self.prepare(&buffer, rate, device_rate)?;
        let frame_count = frames.first().map(Vec::len).unwrap_or(0);

        let ratio = resample_ratio(buffer.sample_rate(), device_rate, rate);
        let start_frame = output_frame(&buffer, offset_seconds, ratio);

        self.playhead.store(start_frame, Ordering::Relaxed);
        self.finished
            .store(start_frame >= frame_count, Ordering::Relaxed);

        let stream = device
            .build_output_stream(
                &stream_config.into(),
                stream_callback(
                    frames,
                    Arc::clone(&self.playhead),
                    Arc::clone(&self.finished),
                    channels,
                ),
                move |e| tracing::warn!("Output stream error: {}", e),
                None,
            )
            .map_err(|e| Error::Output(e.to_string()))?;

        stream.play().map_err(|e| Error::Output(e.to_string()))?;

        tracing::debug!(offset_seconds, rate, device_rate, "Started output");
        self.state = SinkState::Playing(Box::new(stream));

        Ok(())
    }

    fn stop(&mut self) {
        // Stream gets dropped if state was previously Playing
        self.state = SinkState::Idle;
    }

    fn finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Output frames per input frame when playing `rate` times faster
fn resample_ratio(inrate: u32, outrate: u32, rate: f64) -> f64 {
    f64::from(outrate) / (f64::from(inrate) * rate)
}

/// Index into the resampled frames that lines up with `offset_seconds`
fn output_frame(
    buffer: &AudioBuffer,
    offset_seconds: f64,
    ratio: f64,
) -> usize {
    (buffer.frame_at(offset_seconds) as f64 * ratio).floor() as usize
}

fn resample(ratio: f64, channels: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
    let frame_count = channels.first().map(Vec::len).unwrap_or(0);

    if frame_count == 0 || ratio == 1.0 {
        return Ok(channels.to_vec());
    }

    let config = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Cubic,
        window: WindowFunction::Blackman,
    };

    // Last frame is held while the filter delay drains
    let padded: Vec<Vec<f32>> = channels
        .iter()
        .map(|channel| {
            let last = channel.last().copied().unwrap_or_default();
            let mut padded = Vec::with_capacity(frame_count + SINC_LEN);
            padded.extend_from_slice(channel);
            padded.resize(frame_count + SINC_LEN, last);
            padded
        })
        .collect();

    let mut interpolator = SincFixedIn::<f32>::new(
        ratio,
        1.0,
        config,
        frame_count + SINC_LEN,
        channels.len(),
    )
    .map_err(|e| Error::Output(e.to_string()))?;

    let expected = (frame_count as f64 * ratio).round() as usize;
    let mut out = interpolator
        .process(&padded, None)
        .map_err(|e| Error::Output(e.to_string()))?;

    while out.first().map(Vec::len).unwrap_or(0) < expected {
        let tail = interpolator
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| Error::Output(e.to_string()))?;

        if tail.first().map_or(true, Vec::is_empty) {
            break;
        }

        for (channel, more) in out.iter_mut().zip(tail) {
            channel.extend(more);
        }
    }

    for channel in &mut out {
        channel.resize(expected, f32::EQUILIBRIUM);
    }

    Ok(out)
}

fn stream_config(
    device: &cpal::Device,
    inrate: u32,
    in_channels: u16,
) -> Result<SupportedStreamConfig> {
    let preferred_rate = if inrate % DVD_DIVISOR == 0 {
        DVD_SAMPLE_RATE
    } else {
        CD_SAMPLE_RATE
    };

    let fallback_rate = if preferred_rate == DVD_SAMPLE_RATE {
        CD_SAMPLE_RATE
    } else {
        DVD_SAMPLE_RATE
    };

    let mut configs = device
        .supported_output_configs()
        .map_err(|e| Error::Output(e.to_string()))?
        .filter(|cfg| cfg.sample_format() == SampleFormat::F32)
        .collect::<Vec<_>>();

    let configs_matching = configs
        .iter()
        .filter(|cfg| cfg.channels() == in_channels)
        .copied()
        .collect::<Vec<_>>();
    let configs_2_ch = configs
        .iter()
        .filter(|cfg| cfg.channels() == 2)
        .copied()
        .collect::<Vec<_>>();

    configs = if !configs_matching.is_empty() {
        configs_matching
    } else if !configs_2_ch.is_empty() {
        configs_2_ch
    } else {
        configs
    };

    configs
        .iter()
        .flat_map(|range| {
            range
                .try_with_sample_rate(SampleRate(inrate))
                .or_else(|| range.try_with_sample_rate(SampleRate(preferred_rate)))
                .or_else(|| range.try_with_sample_rate(SampleRate(fallback_rate)))
        })
        .next()
        .ok_or_else(|| {
            Error::Output("Could not find appropriate stream configuration".into())
        })
}

fn stream_callback<T>(
    frames: Arc<Vec<Vec<f32>>>,
    playhead: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
    channels: u16,
) -> impl FnMut(&mut [f32], &'_ T) {
    let mut offset = playhead.load(Ordering::Relaxed);
    let out_channels = usize::from(channels).max(1);
    let last_channel = frames.len().saturating_sub(1);
    let end = frames.first().map(Vec::len).unwrap_or(0);

    move |buf: &mut [f32], _: &'_ _| {
        for frame in buf.chunks_mut(out_channels) {
            if offset < end {
                // extra device channels repeat the last buffer channel
                for (ch, out) in frame.iter_mut().enumerate() {
                    *out = frames[ch.min(last_channel)][offset];
                }

                offset += 1;
            } else {
                frame.fill(f32::EQUILIBRIUM);
            }
        }

        playhead.store(offset, Ordering::Relaxed);

        if offset >= end {
            finished.store(true, Ordering::Relaxed);
        }
    }
}

#[derive(Default)]
enum SinkState {
    #[default]
    Idle,

    // Allow for drop
    #[allow(unused)]
    Playing(Box<dyn StreamTrait>),
}

impl std::fmt::Debug for SinkState {
    fn fmt(
        &self,
        formatter: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            SinkState::Idle => write!(formatter, "SinkState::Idle"),
            SinkState::Playing(_) => {
                write!(formatter, "SinkState::Playing(<stream>)")
            }
        }
    }
}

use crate::{Error, Result};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum ReductionMode {
    /// Root-mean-square bar per column over the whole buffer
    #[default]
    Rms,
    /// Min/max segment per column over the zoomed window
    MinMax,
}

impl FromStr for ReductionMode {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "rms" => Ok(ReductionMode::Rms),
            "minmax" | "min-max" => Ok(ReductionMode::MinMax),
            other => Err(Error::UnknownReductionMode(other.into())),
        }
    }
}

/// Zoom and pan applied to min/max reduction and the ruler.
///
/// `zoom` is the ratio of buffer length to visible length, `offset` picks
/// where the visible window sits inside the buffer (0 = start, 1 = end).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    zoom: f64,
    offset: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            zoom: 1.0,
            offset: 0.0,
        }
    }
}

impl Viewport {
    pub fn new(zoom: f64, offset: f64) -> Self {
        let mut viewport = Viewport::default();
        viewport.set_zoom(zoom);
        viewport.set_offset(offset);
        viewport
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = if zoom.is_finite() { zoom.max(1.0) } else { 1.0 };
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: f64) {
        self.offset = if offset.is_finite() {
            offset.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    pub fn visible_samples(&self, len: usize) -> usize {
        (len as f64 / self.zoom).floor() as usize
    }

    pub fn start_sample(&self, len: usize) -> usize {
        let slack = len - self.visible_samples(len);
        (self.offset * slack as f64).floor() as usize
    }

    /// Time of the left edge of the window
    pub fn start_seconds(&self, duration: f64) -> f64 {
        self.offset * (duration - duration / self.zoom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Column {
    Rms(f32),
    Span { min: f32, max: f32 },
}

impl Column {
    /// Vertical pixel extent `(top, bottom)` for a column on a canvas
    /// `height` pixels tall
    pub fn extent(&self, height: f64) -> (f64, f64) {
        let amp = height / 2.0;

        match *self {
            Column::Rms(rms) => {
                let half = f64::from(rms) * amp;
                (amp - half, amp + half)
            }
            Column::Span { min, max } => {
                ((1.0 + f64::from(min)) * amp, (1.0 + f64::from(max)) * amp)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    mode: ReductionMode,
    columns: Vec<Column>,
}

impl Envelope {
    pub fn mode(&self) -> ReductionMode {
        self.mode
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bin {
    min: f32,
    max: f32,
    mean_square: f64,
    sample_count: usize,
}

impl Bin {
    pub fn from_samples(samples: &[f32]) -> Option<Self> {
        let first = *samples.first()?;
        let mut min = first;
        let mut max = first;
        let mut sum_squares = 0f64;

        for &sample in samples {
            min = min.min(sample);
            max = max.max(sample);
            sum_squares += f64::from(sample) * f64::from(sample);
        }

        Some(Bin {
            min,
            max,
            mean_square: sum_squares / samples.len() as f64,
            sample_count: samples.len(),
        })
    }

    /// Widen the range to include a run of silent padding samples
    pub fn with_silence(mut self, count: usize) -> Self {
        if count > 0 {
            self.min = self.min.min(0.0);
            self.max = self.max.max(0.0);
            self.mean_square = self.mean_square * self.sample_count as f64
                / (self.sample_count + count) as f64;
            self.sample_count += count;
        }

        self
    }

    pub fn silence(count: usize) -> Self {
        Bin {
            min: 0.0,
            max: 0.0,
            mean_square: 0.0,
            sample_count: count,
        }
    }

    pub fn rms(&self) -> f32 {
        self.mean_square.sqrt() as f32
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}

/// Reduce one channel to exactly `target_width` columns.
///
/// RMS reduction always spans the whole channel; min/max reduction spans
/// the window selected by `viewport`.
pub fn reduce(
    samples: &[f32],
    target_width: usize,
    viewport: &Viewport,
    mode: ReductionMode,
) -> Envelope {
    let columns = match mode {
        ReductionMode::Rms => rms_columns(samples, target_width),
        ReductionMode::MinMax => span_columns(samples, target_width, viewport),
    };

    Envelope { mode, columns }
}

fn rms_columns(samples: &[f32], width: usize) -> Vec<Column> {
    let len = samples.len();
    let samples_per_pixel = (len / width.max(1)).max(1);

    (0..width)
        .map(|x| {
            let start = x.saturating_mul(samples_per_pixel).min(len);
            let end = start.saturating_add(samples_per_pixel).min(len);

            let rms = Bin::from_samples(&samples[start..end])
                .map(|bin| bin.rms())
                .unwrap_or(0.0);

            Column::Rms(rms)
        })
        .collect()
}

fn span_columns(
    samples: &[f32],
    width: usize,
    viewport: &Viewport,
) -> Vec<Column> {
    let len = samples.len();
    let visible = viewport.visible_samples(len);
    let step = visible.div_ceil(width.max(1)).max(1);
    let first = viewport.start_sample(len);

    (0..width)
        .map(|x| {
            let start = first.saturating_add(x.saturating_mul(step));
            let end = start.saturating_add(step);
            let available = &samples[start.min(len)..end.min(len)];
            let padding = step - available.len();

            let bin = Bin::from_samples(available)
                .map(|bin| bin.with_silence(padding))
                .unwrap_or_else(|| Bin::silence(padding));

            Column::Span {
                min: bin.min(),
                max: bin.max(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub second: u32,
    pub x: f64,
}

impl Tick {
    pub fn label(&self) -> String {
        format!("{}s", self.second)
    }
}

/// One tick per whole second of `duration`, positioned for a canvas
/// `width` pixels wide.
///
/// Ticks that land outside the canvas are left out.
pub fn ruler_ticks(duration: f64, width: usize, viewport: &Viewport) -> Vec<Tick> {
    if !duration.is_finite() || duration <= 0.0 || width == 0 {
        return Vec::new();
    }

    let width = width as f64;
    let pixels_per_second = width * viewport.zoom() / duration;
    let start = viewport.start_seconds(duration);
    let last = duration.floor() as u32;

    (0..=last)
        .map(|second| Tick {
            second,
            x: (f64::from(second) - start) * pixels_per_second,
        })
        .filter(|tick| tick.x >= 0.0 && tick.x <= width)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CacheKey {
    generation: u64,
    width: usize,
    viewport: Viewport,
    mode: ReductionMode,
}

/// Keeps the last envelope until any of its inputs change
#[derive(Debug, Default)]
pub struct WaveformCache {
    entry: Option<(CacheKey, Envelope)>,
}

impl WaveformCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `generation` identifies the buffer `samples` belongs to
    pub fn envelope(
        &mut self,
        generation: u64,
        samples: &[f32],
        width: usize,
        viewport: &Viewport,
        mode: ReductionMode,
    ) -> &Envelope {
        let key = CacheKey {
            generation,
            width,
            viewport: *viewport,
            mode,
        };

        if !matches!(&self.entry, Some((cached, _)) if *cached == key) {
            self.entry = None;
        }

        let (_, envelope) = self.entry.get_or_insert_with(|| {
            tracing::trace!(width, ?mode, "Reducing waveform");
            (key, reduce(samples, width, viewport, mode))
        });

        envelope
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

use std::fmt;
use std::time::Instant;

/// Source of wall-clock time in seconds
pub trait Clock {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

/// Transport bookkeeping.
///
/// `pause_offset` is measured in buffer seconds: time spent playing at
/// `active_rate` advances it by `elapsed * active_rate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub transport: TransportState,
    pub pause_offset: f64,
    pub start_wall_clock: f64,
    pub playback_rate: f64,
    pub active_rate: f64,
    pub displayed_position: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState {
            transport: TransportState::Stopped,
            pause_offset: 0.0,
            start_wall_clock: 0.0,
            playback_rate: 1.0,
            active_rate: 1.0,
            displayed_position: 0.0,
        }
    }
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.transport == TransportState::Playing
    }

    /// Buffer seconds played by the active instance
    pub fn elapsed(&self, now: f64) -> f64 {
        if self.is_playing() {
            (now - self.start_wall_clock).max(0.0) * self.active_rate
        } else {
            0.0
        }
    }

    pub fn position(&self, now: f64) -> f64 {
        self.pause_offset + self.elapsed(now)
    }

    pub fn start(&mut self, now: f64) {
        self.start_wall_clock = now;
        self.active_rate = self.playback_rate;
        self.transport = TransportState::Playing;
        self.displayed_position = self.pause_offset;
    }

    /// Fold the active instance's progress into the offset
    pub fn checkpoint(&mut self, now: f64) {
        self.pause_offset += self.elapsed(now);
        self.start_wall_clock = now;
        self.displayed_position = self.pause_offset;
    }

    pub fn pause(&mut self, now: f64) {
        self.checkpoint(now);
        self.transport = TransportState::Paused;
    }

    /// Terminal stop at the end of the buffer
    pub fn finish(&mut self, duration: f64) {
        self.transport = TransportState::Stopped;
        self.pause_offset = 0.0;
        self.displayed_position = duration;
    }

    pub fn reset(&mut self) {
        *self = PlaybackState {
            playback_rate: self.playback_rate,
            ..PlaybackState::default()
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub position: f64,
    pub duration: f64,
}

impl Progress {
    /// Fraction of the buffer played, 0 for an empty buffer
    pub fn ratio(&self) -> f64 {
        if self.duration > 0.0 {
            (self.position / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} / {}",
            format_time(self.position),
            format_time(self.duration)
        )
    }
}

/// `mm:ss`, truncating fractional seconds
pub fn format_time(seconds: f64) -> String {
    let seconds = if seconds.is_finite() {
        seconds.max(0.0) as u64
    } else {
        0
    };

    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

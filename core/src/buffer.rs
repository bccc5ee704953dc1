use crate::{Error, Result};

/// Deinterleaved, normalized audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: u16,
    sample_rate: u32,
    data: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Group a flat interleaved stream into one sequence per channel.
    ///
    /// Samples past the last whole frame are dropped.
    pub fn build(
        samples: &[f32],
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidChannelCount);
        }

        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate);
        }

        let channel_count = usize::from(channels);
        let frame_count = samples.len() / channel_count;

        let data = (0..channel_count)
            .map(|ch| {
                samples[..frame_count * channel_count]
                    .iter()
                    .skip(ch)
                    .step_by(channel_count)
                    .copied()
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        tracing::debug!(channels, sample_rate, frame_count, "Built buffer");

        Ok(AudioBuffer {
            channels,
            sample_rate,
            data,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_count(&self) -> usize {
        self.data.first().map(Vec::len).unwrap_or(0)
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / f64::from(self.sample_rate)
    }

    pub fn channel(&self, channel: usize) -> Option<&[f32]> {
        self.data.get(channel).map(Vec::as_slice)
    }

    pub fn channel_data(&self) -> &[Vec<f32>] {
        &self.data
    }

    /// Frame index at a time offset, clamped to the buffer
    pub fn frame_at(&self, seconds: f64) -> usize {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }

        let frame = (seconds * f64::from(self.sample_rate)).floor();

        if frame >= self.frame_count() as f64 {
            self.frame_count()
        } else {
            frame as usize
        }
    }
}

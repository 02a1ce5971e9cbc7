// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Immutable decoded PCM shared between the live output, the scheduler and the renderer.

use std::{fmt, sync::Arc, time::Duration};

/// Decoded audio. The samples are interleaved f32 in the range [-1.0, 1.0] and are
/// stored in an Arc so that every voice and render can share them.
#[derive(Clone, PartialEq)]
pub struct AudioBuffer {
    data: Arc<Vec<f32>>,
    channel_count: u16,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Creates a buffer from interleaved samples.
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> AudioBuffer {
        AudioBuffer {
            data: Arc::new(data),
            channel_count: channel_count.max(1),
            sample_rate,
        }
    }

    /// The interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Returns true if both buffers point at the same samples.
    pub fn shares_samples(&self, other: &AudioBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Converts the buffer to the given sample rate and channel count. Returns a cheap
    /// clone if it already matches.
    pub fn conform(&self, sample_rate: u32, channel_count: u16) -> AudioBuffer {
        if self.sample_rate == sample_rate && self.channel_count == channel_count {
            return self.clone();
        }

        let resampled = if self.sample_rate != sample_rate {
            resample_linear(&self.data, self.channel_count, self.sample_rate, sample_rate)
        } else {
            self.data.to_vec()
        };

        let remixed = if self.channel_count != channel_count {
            remix_channels(&resampled, self.channel_count, channel_count)
        } else {
            resampled
        };

        AudioBuffer::new(remixed, channel_count, sample_rate)
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("frames", &self.frames())
            .field("channel_count", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Resamples interleaved audio using linear interpolation. This is plenty for drum hits
/// and one-shots.
pub(crate) fn resample_linear(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let channels = channel_count.max(1) as usize;
    if source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);

    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let idx0 = source_frame * channels + channel;
            let idx1 = (source_frame + 1) * channels + channel;

            let s0 = samples.get(idx0).copied().unwrap_or(0.0);
            let s1 = samples.get(idx1).copied().unwrap_or(s0);

            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}

/// Changes the channel layout of interleaved audio. Mono is copied to every output
/// channel, anything folding down to mono is averaged, and other layouts map output
/// channel n to source channel n modulo the source channel count.
fn remix_channels(samples: &[f32], source_channels: u16, target_channels: u16) -> Vec<f32> {
    let source_channels = source_channels.max(1) as usize;
    let target_channels = target_channels.max(1) as usize;
    let frames = samples.len() / source_channels;

    let mut output = Vec::with_capacity(frames * target_channels);
    for frame in samples.chunks_exact(source_channels) {
        if target_channels == 1 {
            output.push(frame.iter().sum::<f32>() / source_channels as f32);
            continue;
        }
        for channel in 0..target_channels {
            output.push(frame[channel % source_channels]);
        }
    }
    output
}

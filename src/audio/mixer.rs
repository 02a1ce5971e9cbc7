// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
// Voice mixing shared by the cpal callback and the tests.
use crate::samples::AudioBuffer;

/// Default maximum number of simultaneously sounding pad hits.
pub const DEFAULT_MAX_VOICES: usize = 32;

/// A single sounding pad hit.
struct Voice {
    sample: AudioBuffer,
    /// Position in interleaved samples.
    position: usize,
}

/// Mixes sounding pad hits into interleaved output blocks.
pub struct VoiceMixer {
    voices: Vec<Voice>,
    max_voices: usize,
}

impl VoiceMixer {
    /// Creates a new mixer. Samples given to it must already be in the output format.
    pub fn new(max_voices: usize) -> Self {
        Self {
            voices: Vec::with_capacity(max_voices),
            max_voices: max_voices.max(1),
        }
    }

    /// Starts a new voice. When every voice is busy the oldest one is stolen.
    pub fn add(&mut self, sample: AudioBuffer) {
        if self.voices.len() >= self.max_voices {
            self.voices.remove(0);
        }
        self.voices.push(Voice {
            sample,
            position: 0,
        });
    }

    /// Returns the number of sounding voices.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Fills the output with the sum of every voice, clipped to [-1.0, 1.0]. Voices that
    /// run out are dropped.
    pub fn process_into(&mut self, output: &mut [f32]) {
        output.fill(0.0);

        for voice in self.voices.iter_mut() {
            let remaining = &voice.sample.samples()[voice.position..];
            let count = remaining.len().min(output.len());
            for (dst, src) in output[..count].iter_mut().zip(&remaining[..count]) {
                *dst += *src;
            }
            voice.position += count;
        }

        for sample in output.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.voices
            .retain(|voice| voice.position < voice.sample.samples().len());
    }
}

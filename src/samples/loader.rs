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

//! Sample loading and caching for pad samples.
//!
//! Samples are decoded entirely into memory at startup so that neither live triggering
//! nor playback ever waits on the disk.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use hound::WavReader;
use tracing::{debug, info};

use super::buffer::AudioBuffer;
use crate::error::PadError;
use crate::events::PadId;

/// Manages loading and caching of sample data.
pub struct SampleLoader {
    /// Cache of loaded samples by file path.
    cache: HashMap<PathBuf, AudioBuffer>,
    /// Sample rate every loaded sample is converted to.
    target_sample_rate: u32,
    /// Channel count every loaded sample is converted to.
    target_channels: u16,
}

impl SampleLoader {
    /// Creates a new sample loader.
    pub fn new(target_sample_rate: u32, target_channels: u16) -> Self {
        Self {
            cache: HashMap::new(),
            target_sample_rate,
            target_channels,
        }
    }

    /// Loads the sample for a pad from a WAV file into memory, converted to the target
    /// format. Returns a cached version if already loaded.
    pub fn load(&mut self, pad: PadId, path: &Path) -> Result<AudioBuffer, PadError> {
        if let Some(sample) = self.cache.get(path) {
            debug!(path = ?path, "Using cached sample");
            return Ok(sample.clone());
        }

        info!(pad = pad.0, path = ?path, "Loading sample into memory");

        let decoded = decode_wav(pad, path)?;
        let source_sample_rate = decoded.sample_rate();
        if source_sample_rate != self.target_sample_rate {
            info!(
                source_rate = source_sample_rate,
                target_rate = self.target_sample_rate,
                "Transcoding sample"
            );
        }
        let loaded = decoded.conform(self.target_sample_rate, self.target_channels);

        info!(
            pad = pad.0,
            channels = loaded.channel_count(),
            sample_rate = loaded.sample_rate(),
            duration_ms = loaded.duration().as_millis(),
            memory_kb = loaded.memory_size() / 1024,
            "Sample loaded"
        );

        self.cache.insert(path.to_path_buf(), loaded.clone());

        Ok(loaded)
    }

    /// Returns the total memory used by cached samples.
    pub fn total_memory_usage(&self) -> usize {
        self.cache.values().map(|s| s.memory_size()).sum()
    }
}

impl std::fmt::Debug for SampleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleLoader")
            .field("cached_samples", &self.cache.len())
            .field("target_sample_rate", &self.target_sample_rate)
            .field("target_channels", &self.target_channels)
            .field("total_memory_kb", &(self.total_memory_usage() / 1024))
            .finish()
    }
}

/// Decodes a whole WAV file into interleaved f32 samples.
fn decode_wav(pad: PadId, path: &Path) -> Result<AudioBuffer, PadError> {
    let decode_error = |e: hound::Error| match e {
        hound::Error::IoError(io_err) if io_err.kind() == io::ErrorKind::NotFound => {
            PadError::AssetNotFound {
                pad,
                path: path.to_path_buf(),
            }
        }
        e => PadError::DecodeError {
            pad,
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    };

    let mut reader = WavReader::open(path).map_err(decode_error)?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        // Float samples are already in the correct range [-1.0, 1.0]
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, hound::Error>>()
            .map_err(decode_error)?,
        hound::SampleFormat::Int => {
            // Use i64 to avoid overflow for 32-bit samples
            let scale_factor = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|sample| sample as f32 * scale_factor))
                .collect::<Result<Vec<f32>, hound::Error>>()
                .map_err(decode_error)?
        }
    };

    Ok(AudioBuffer::new(samples, spec.channels, spec.sample_rate))
}

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
use std::{error::Error, fmt, sync::Arc};

use crate::config;
use crate::events::PadId;
use crate::samples::AudioBuffer;

pub mod cpal;
pub mod format;
pub mod mixer;
pub mod mock;

pub use format::{OutputFormat, SampleFormat};

/// Plays pad samples the moment they're triggered.
pub trait Device: fmt::Display + Send + Sync {
    /// Starts the sample immediately, layered over anything already sounding. Must not
    /// block on the audio callback.
    fn play_pad(&self, pad: PadId, sample: AudioBuffer) -> Result<(), Box<dyn Error>>;
}

/// Lists the names of the output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the output device described by the configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device)));
    };

    Ok(Arc::new(cpal::Device::get(device, config.output_format()?)?))
}

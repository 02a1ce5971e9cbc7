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

//! Resolves pads to their preloaded samples.

use std::path::{Path, PathBuf};

use tracing::{error, info, span, Level};

use super::buffer::AudioBuffer;
use super::loader::SampleLoader;
use crate::error::PadError;
use crate::events::PadId;

/// Hands out decoded pad samples. Implementations must not touch the disk in `load`;
/// everything is resolved before anything time critical runs.
pub trait AssetProvider: Send + Sync {
    /// The number of configured pads.
    fn pad_count(&self) -> usize;

    /// Gets the sample for the given pad.
    fn load(&self, pad: PadId) -> Result<AudioBuffer, PadError>;
}

/// The outcome of loading a single pad.
enum Slot {
    Loaded(AudioBuffer),
    NotFound(PathBuf),
    Undecodable { path: PathBuf, reason: String },
}

/// Every pad must be addressable by a `PadId`.
pub const MAX_BANK_PADS: usize = u8::MAX as usize + 1;

/// A fixed bank of pad samples, loaded once at startup.
pub struct PadBank {
    slots: Vec<Slot>,
}

impl PadBank {
    /// Loads every pad sample. A pad that fails to load is remembered as failed and is
    /// reported each time it's requested; it doesn't prevent the other pads from loading.
    pub fn load(paths: &[PathBuf], sample_rate: u32, channels: u16) -> Result<PadBank, PadError> {
        let span = span!(Level::INFO, "pad bank");
        let _enter = span.enter();

        let mut loader = SampleLoader::new(sample_rate, channels);
        let slots: Vec<Slot> = paths
            .iter()
            .enumerate()
            .map(|(index, path)| {
                let pad = u8::try_from(index)
                    .map(PadId)
                    .map_err(|_| PadError::TooManyPads(paths.len()))?;
                Ok(match loader.load(pad, path) {
                    Ok(sample) => Slot::Loaded(sample),
                    Err(PadError::AssetNotFound { path, .. }) => {
                        error!(pad = pad.0, path = ?path, "Sample not found");
                        Slot::NotFound(path)
                    }
                    Err(e) => {
                        error!(
                            pad = pad.0,
                            path = ?path,
                            err = e.to_string(),
                            "Failed to load sample"
                        );
                        Slot::Undecodable {
                            path: path.to_path_buf(),
                            reason: e.to_string(),
                        }
                    }
                })
            })
            .collect::<Result<Vec<Slot>, PadError>>()?;

        info!(
            pads = slots.len(),
            memory_kb = loader.total_memory_usage() / 1024,
            "Pad bank loaded"
        );

        Ok(PadBank { slots })
    }

    /// Creates a bank from samples that are already decoded.
    pub fn from_buffers(buffers: Vec<AudioBuffer>) -> Result<PadBank, PadError> {
        if buffers.len() > MAX_BANK_PADS {
            return Err(PadError::TooManyPads(buffers.len()));
        }
        Ok(PadBank {
            slots: buffers.into_iter().map(Slot::Loaded).collect(),
        })
    }

    /// Returns the pads whose samples failed to load.
    pub fn failed_pads(&self) -> Vec<PadId> {
        self.slots
            .iter()
            .zip(0..=u8::MAX)
            .filter(|(slot, _)| !matches!(slot, Slot::Loaded(_)))
            .map(|(_, index)| PadId(index))
            .collect()
    }

    /// Returns the path a failed pad was loaded from.
    pub fn failed_path(&self, pad: PadId) -> Option<&Path> {
        match self.slots.get(pad.index())? {
            Slot::Loaded(_) => None,
            Slot::NotFound(path) => Some(path),
            Slot::Undecodable { path, .. } => Some(path),
        }
    }
}

impl AssetProvider for PadBank {
    fn pad_count(&self) -> usize {
        self.slots.len()
    }

    fn load(&self, pad: PadId) -> Result<AudioBuffer, PadError> {
        match self.slots.get(pad.index()) {
            Some(Slot::Loaded(sample)) => Ok(sample.clone()),
            Some(Slot::NotFound(path)) => Err(PadError::AssetNotFound {
                pad,
                path: path.clone(),
            }),
            Some(Slot::Undecodable { path, reason }) => Err(PadError::DecodeError {
                pad,
                path: path.clone(),
                reason: reason.clone(),
            }),
            None => Err(PadError::InvalidPad {
                pad,
                pad_count: self.slots.len(),
            }),
        }
    }
}

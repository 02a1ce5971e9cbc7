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
use std::path::PathBuf;

use crate::events::PadId;

/// Errors surfaced by the recorder, the sample provider and the mixdown renderer.
/// Every variant is recoverable at the operation that produced it.
#[derive(Debug, thiserror::Error)]
pub enum PadError {
    #[error("pad {pad} is out of range, only {pad_count} pads are configured")]
    InvalidPad { pad: PadId, pad_count: usize },

    #[error("sample for pad {pad} not found at {}", path.display())]
    AssetNotFound { pad: PadId, path: PathBuf },

    #[error("unable to decode sample for pad {pad} ({}): {reason}", path.display())]
    DecodeError {
        pad: PadId,
        path: PathBuf,
        reason: String,
    },

    #[error("nothing has been recorded")]
    EmptyRecording,

    #[error("recording references pad {0}, which has no loaded sample")]
    MissingAsset(PadId),

    #[error("{0} pads configured, at most 256 are supported")]
    TooManyPads(usize),

    #[error("recording is full ({0} events)")]
    RecordingFull(usize),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("take error: {0}")]
    Take(#[from] serde_yml::Error),

    #[error("invalid take: {0}")]
    InvalidTake(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

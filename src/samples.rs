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

//! Pad sample loading.
//!
//! This module provides:
//! - Decoded, shareable audio buffers
//! - WAV decoding and conversion to the output format
//! - The pad bank, which resolves a pad to its preloaded sample

mod bank;
mod buffer;
mod loader;

pub use bank::{AssetProvider, PadBank};
pub use buffer::AudioBuffer;
pub use loader::SampleLoader;

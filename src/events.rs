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

//! Pad identifiers and the event log shared by the recorder, scheduler and renderer.

use std::{fmt, fs, path::Path, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PadError;

/// Identifies a pad, and therefore the sample it plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PadId(pub u8);

impl PadId {
    /// Returns the pad as an index into pad tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single pad hit, relative to the start of the recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatEvent {
    /// The pad that was hit.
    pub pad: PadId,
    /// Milliseconds elapsed since the recording epoch.
    pub offset_ms: u64,
}

impl BeatEvent {
    pub fn new(pad: PadId, offset_ms: u64) -> BeatEvent {
        BeatEvent { pad, offset_ms }
    }

    /// The offset as a duration.
    pub fn offset(&self) -> Duration {
        Duration::from_millis(self.offset_ms)
    }
}

/// A frozen, ordered log of pad hits. Cloning is cheap and clones share storage.
///
/// Events are in recording order, which is also non-decreasing offset order. Events with
/// equal offsets keep the order they were recorded in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventLog {
    events: Arc<[BeatEvent]>,
}

/// The on-disk representation of a take.
#[derive(Serialize, Deserialize)]
struct Take {
    events: Vec<BeatEvent>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn empty() -> EventLog {
        EventLog {
            events: Arc::from(Vec::new()),
        }
    }

    /// Freezes the given events into a log. Fails if the offsets ever go backwards.
    pub fn from_events(events: Vec<BeatEvent>) -> Result<EventLog, PadError> {
        if let Some(window) = events
            .windows(2)
            .find(|window| window[1].offset_ms < window[0].offset_ms)
        {
            return Err(PadError::InvalidTake(format!(
                "offset {}ms follows offset {}ms",
                window[1].offset_ms, window[0].offset_ms
            )));
        }

        Ok(EventLog {
            events: Arc::from(events),
        })
    }

    /// Freezes events the recorder has already kept in order.
    pub(crate) fn freeze(events: Vec<BeatEvent>) -> EventLog {
        EventLog {
            events: Arc::from(events),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Gets the event at the given position.
    pub fn get(&self, index: usize) -> Option<BeatEvent> {
        self.events.get(index).copied()
    }

    /// Gets the last event, which carries the largest offset.
    pub fn last(&self) -> Option<BeatEvent> {
        self.events.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BeatEvent> {
        self.events.iter()
    }

    /// The offset of the last hit, or zero for an empty log.
    pub fn duration(&self) -> Duration {
        self.last().map(|event| event.offset()).unwrap_or_default()
    }

    /// Saves the log as a YAML take.
    pub fn save(&self, path: &Path) -> Result<(), PadError> {
        let take = Take {
            events: self.events.to_vec(),
        };
        fs::write(path, serde_yml::to_string(&take)?)?;
        info!(path = ?path, events = self.len(), "Saved take");
        Ok(())
    }

    /// Loads a YAML take written by save.
    pub fn load(path: &Path) -> Result<EventLog, PadError> {
        let take: Take = serde_yml::from_str(&fs::read_to_string(path)?)?;
        EventLog::from_events(take.events)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        EventLog::empty()
    }
}

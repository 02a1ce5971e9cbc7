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

//! The recording clock and the event log it writes.

use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Level, Span};

use crate::error::PadError;
use crate::events::{BeatEvent, EventLog, PadId};

/// Default number of events a single recording can hold.
pub const DEFAULT_MAX_EVENTS: usize = 1000;

/// The operations the rest of the system needs from a recorder. The storage behind
/// them is up to the implementation.
pub trait BeatRecorder: Send + Sync {
    /// Starts a new recording, discarding the previous one.
    fn start_recording(&self);

    /// Stops the recording and returns the frozen log.
    fn stop_recording(&self) -> EventLog;

    /// Records a hit on the given pad. Returns the logged event, or None if nothing is
    /// being recorded.
    fn record_beat(&self, pad: PadId) -> Result<Option<BeatEvent>, PadError>;

    /// The number of events in the frozen log.
    fn recording_length(&self) -> usize;

    /// The event at the given position in the frozen log.
    fn event_at(&self, index: usize) -> Option<BeatEvent>;

    /// Returns true while a recording is in progress.
    fn is_recording(&self) -> bool;

    /// The frozen log of the last completed recording.
    fn snapshot(&self) -> EventLog;
}

enum State {
    Idle,
    Recording { epoch: Instant },
}

struct Session {
    state: State,
    /// Events of the recording in progress.
    events: Vec<BeatEvent>,
    /// The last completed recording.
    frozen: EventLog,
}

/// Records pad hits with millisecond offsets from the moment recording started.
pub struct Recorder {
    pad_count: usize,
    max_events: usize,
    session: Mutex<Session>,
    span: Span,
}

impl Recorder {
    /// Creates an idle recorder for the given number of pads.
    pub fn new(pad_count: usize, max_events: usize) -> Recorder {
        Recorder {
            pad_count,
            max_events,
            session: Mutex::new(Session {
                state: State::Idle,
                events: Vec::new(),
                frozen: EventLog::empty(),
            }),
            span: span!(Level::INFO, "recorder"),
        }
    }

    /// Starts recording. Calling this while already recording re-arms the epoch and
    /// throws away everything recorded so far.
    pub fn start(&self) {
        let _enter = self.span.enter();
        let mut session = self.session.lock();
        if matches!(session.state, State::Recording { .. }) {
            info!(
                discarded = session.events.len(),
                "Restarting recording, discarding current take."
            );
        } else {
            info!("Recording started.");
        }
        session.events.clear();
        session.frozen = EventLog::empty();
        session.state = State::Recording {
            epoch: Instant::now(),
        };
    }

    /// Stops recording and freezes the log. Does nothing when idle.
    pub fn stop(&self) -> EventLog {
        let _enter = self.span.enter();
        let mut session = self.session.lock();
        if let State::Recording { .. } = session.state {
            let events = std::mem::take(&mut session.events);
            session.frozen = EventLog::freeze(events);
            session.state = State::Idle;
            info!(events = session.frozen.len(), "Recording stopped.");
        }
        session.frozen.clone()
    }

    /// Logs a hit on the given pad. The offset is taken while the log is locked, so
    /// concurrent callers are serialized and offsets never go backwards in the log.
    pub fn record(&self, pad: PadId) -> Result<Option<BeatEvent>, PadError> {
        if pad.index() >= self.pad_count {
            return Err(PadError::InvalidPad {
                pad,
                pad_count: self.pad_count,
            });
        }

        let mut session = self.session.lock();
        let epoch = match session.state {
            State::Recording { epoch } => epoch,
            State::Idle => return Ok(None),
        };

        if session.events.len() >= self.max_events {
            let _enter = self.span.enter();
            warn!(pad = pad.0, max_events = self.max_events, "Recording is full.");
            return Err(PadError::RecordingFull(self.max_events));
        }

        let offset_ms = u64::try_from(epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        let event = BeatEvent::new(pad, offset_ms);
        session.events.push(event);
        debug!(pad = pad.0, offset_ms, "Recorded beat");
        Ok(Some(event))
    }

    /// Returns true while a recording is in progress.
    pub fn is_recording(&self) -> bool {
        matches!(self.session.lock().state, State::Recording { .. })
    }

    /// The frozen log of the last completed recording. Empty while recording.
    pub fn snapshot(&self) -> EventLog {
        self.session.lock().frozen.clone()
    }

    pub fn len(&self) -> usize {
        self.session.lock().frozen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn event_at(&self, index: usize) -> Option<BeatEvent> {
        self.session.lock().frozen.get(index)
    }

    /// The number of pads this recorder accepts.
    pub fn pad_count(&self) -> usize {
        self.pad_count
    }
}

impl BeatRecorder for Recorder {
    fn start_recording(&self) {
        self.start()
    }

    fn stop_recording(&self) -> EventLog {
        self.stop()
    }

    fn record_beat(&self, pad: PadId) -> Result<Option<BeatEvent>, PadError> {
        self.record(pad)
    }

    fn recording_length(&self) -> usize {
        self.len()
    }

    fn event_at(&self, index: usize) -> Option<BeatEvent> {
        Recorder::event_at(self, index)
    }

    fn is_recording(&self) -> bool {
        Recorder::is_recording(self)
    }

    fn snapshot(&self) -> EventLog {
        Recorder::snapshot(self)
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, sync::Arc, thread, time::Duration};

    use super::*;

    #[test]
    fn test_record_while_idle_is_ignored() -> Result<(), PadError> {
        let recorder = Recorder::new(9, DEFAULT_MAX_EVENTS);
        assert_eq!(None, recorder.record(PadId(0))?);
        assert!(recorder.is_empty());

        recorder.start();
        recorder.record(PadId(1))?;
        let log = recorder.stop();
        assert_eq!(1, log.len());

        // After stop, hits are still ignored and the frozen log is untouched.
        assert_eq!(None, recorder.record(PadId(2))?);
        assert_eq!(log, recorder.snapshot());
        assert_eq!(Some(PadId(1)), recorder.event_at(0).map(|event| event.pad));
        assert_eq!(None, recorder.event_at(1));
        Ok(())
    }

    #[test]
    fn test_invalid_pad() {
        let recorder = Recorder::new(9, DEFAULT_MAX_EVENTS);
        recorder.start();
        assert!(matches!(
            recorder.record(PadId(9)),
            Err(PadError::InvalidPad { pad: PadId(9), pad_count: 9 })
        ));
        assert!(recorder.stop().is_empty());
    }

    #[test]
    fn test_offsets_follow_the_clock() -> Result<(), PadError> {
        let recorder = Recorder::new(2, DEFAULT_MAX_EVENTS);
        recorder.start();
        recorder.record(PadId(0))?;
        thread::sleep(Duration::from_millis(30));
        recorder.record(PadId(1))?;
        let log = recorder.stop();

        let first = log.get(0).expect("first event");
        let second = log.get(1).expect("second event");
        assert!(second.offset_ms >= first.offset_ms + 30);
        Ok(())
    }

    #[test]
    fn test_restart_discards_previous_events() -> Result<(), PadError> {
        let recorder = Recorder::new(9, DEFAULT_MAX_EVENTS);
        recorder.start();
        recorder.record(PadId(0))?;
        recorder.record(PadId(1))?;

        recorder.start();
        recorder.record(PadId(5))?;
        let log = recorder.stop();

        assert_eq!(1, log.len());
        assert_eq!(Some(PadId(5)), log.get(0).map(|event| event.pad));
        Ok(())
    }

    #[test]
    fn test_start_discards_frozen_log() -> Result<(), PadError> {
        let recorder = Recorder::new(9, DEFAULT_MAX_EVENTS);
        recorder.start();
        recorder.record(PadId(0))?;
        recorder.stop();
        assert_eq!(1, recorder.len());

        recorder.start();
        assert!(recorder.snapshot().is_empty());
        assert!(recorder.stop().is_empty());
        Ok(())
    }

    #[test]
    fn test_stop_when_idle_is_noop() -> Result<(), PadError> {
        let recorder = Recorder::new(9, DEFAULT_MAX_EVENTS);
        recorder.start();
        recorder.record(PadId(3))?;
        let first = recorder.stop();
        let second = recorder.stop();
        assert_eq!(first, second);
        assert!(!recorder.is_recording());
        Ok(())
    }

    #[test]
    fn test_recording_full() -> Result<(), PadError> {
        let recorder = Recorder::new(1, 2);
        recorder.start();
        recorder.record(PadId(0))?;
        recorder.record(PadId(0))?;
        assert!(matches!(
            recorder.record(PadId(0)),
            Err(PadError::RecordingFull(2))
        ));
        assert_eq!(2, recorder.stop().len());
        Ok(())
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let recorder = Arc::new(Recorder::new(4, DEFAULT_MAX_EVENTS));
        recorder.start();

        let joins: Vec<_> = (0..4u8)
            .map(|pad| {
                let recorder = recorder.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        recorder.record(PadId(pad)).expect("record failed");
                    }
                })
            })
            .collect();
        for join in joins {
            join.join().expect("recording thread panicked");
        }

        let log = recorder.stop();
        assert_eq!(400, log.len());

        let mut per_pad: HashMap<PadId, usize> = HashMap::new();
        for event in log.iter() {
            *per_pad.entry(event.pad).or_default() += 1;
        }
        assert!(per_pad.values().all(|count| *count == 100));

        let offsets: Vec<u64> = log.iter().map(|event| event.offset_ms).collect();
        assert!(offsets.windows(2).all(|window| window[0] <= window[1]));
    }

    #[test]
    fn test_trait_object() -> Result<(), PadError> {
        let recorder: Box<dyn BeatRecorder> = Box::new(Recorder::new(3, DEFAULT_MAX_EVENTS));
        recorder.start_recording();
        recorder.record_beat(PadId(2))?;
        recorder.stop_recording();
        assert_eq!(1, recorder.recording_length());
        assert_eq!(Some(PadId(2)), recorder.event_at(0).map(|event| event.pad));
        Ok(())
    }
}

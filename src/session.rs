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
//! Routes pad hits and transport commands to the recorder, the scheduler, the output
//! device and the renderer.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{error, info, span, warn, Level, Span};

use crate::audio;
use crate::error::PadError;
use crate::events::{BeatEvent, EventLog, PadId};
use crate::mixdown::Renderer;
use crate::playsync::CancelHandle;
use crate::recorder::BeatRecorder;
use crate::samples::AssetProvider;
use crate::scheduler::{PlaybackOutcome, Scheduler};

/// What the session is currently doing. Recording and playing never overlap: the newer
/// request always preempts the older one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Playing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::Playing => "playing",
        };
        write!(f, "{}", state)
    }
}

/// Owns everything a pad session needs. There is no global state; everything is reached
/// through this.
pub struct Session {
    provider: Arc<dyn AssetProvider>,
    recorder: Arc<dyn BeatRecorder>,
    scheduler: Scheduler,
    device: Arc<dyn audio::Device>,
    renderer: Renderer,
    recordings: PathBuf,
    tail_ms: u64,
    /// Serializes transitions between recording and playing.
    transition: Mutex<()>,
    span: Span,
}

impl Session {
    pub fn new(
        provider: Arc<dyn AssetProvider>,
        recorder: Arc<dyn BeatRecorder>,
        device: Arc<dyn audio::Device>,
        renderer: Renderer,
        recordings: &Path,
        tail_ms: u64,
    ) -> Session {
        Session {
            provider,
            recorder,
            scheduler: Scheduler::new(),
            device,
            renderer,
            recordings: recordings.to_path_buf(),
            tail_ms,
            transition: Mutex::new(()),
            span: span!(Level::INFO, "session"),
        }
    }

    /// Handles a pad hit: logs it if a recording is in progress and plays it right away
    /// either way. The recorded event, if any, is returned.
    pub fn trigger(&self, pad: PadId) -> Result<Option<BeatEvent>, PadError> {
        let recorded = self.recorder.record_beat(pad);
        if let Err(PadError::InvalidPad { .. }) = recorded {
            return recorded;
        }

        play_pad(self.provider.as_ref(), self.device.as_ref(), pad);
        recorded
    }

    /// Starts a new recording, discarding the previous take. Playback in progress is
    /// cancelled first.
    pub fn start_recording(&self) {
        let _enter = self.span.enter();
        let _transition = self.transition.lock();
        if self.scheduler.stop() {
            info!("Playback cancelled to start recording.");
        }
        self.recorder.start_recording();
    }

    /// Stops the recording and returns the frozen take.
    pub fn stop_recording(&self) -> EventLog {
        let _transition = self.transition.lock();
        self.recorder.stop_recording()
    }

    /// Replays the last take through the output device. A recording in progress is
    /// stopped first and becomes the take that plays; a playback in progress is cancelled.
    pub fn play(&self) -> Result<CancelHandle, PadError> {
        let _enter = self.span.enter();
        let _transition = self.transition.lock();

        let log = if self.recorder.is_recording() {
            info!("Recording stopped to start playback.");
            self.recorder.stop_recording()
        } else {
            self.recorder.snapshot()
        };

        if log.is_empty() {
            warn!("Nothing recorded, playback will finish immediately.");
        }

        let provider = self.provider.clone();
        let device = self.device.clone();
        self.scheduler.play(
            log,
            move |pad| play_pad(provider.as_ref(), device.as_ref(), pad),
            |outcome| match outcome {
                PlaybackOutcome::Completed => info!("Take finished."),
                PlaybackOutcome::Cancelled => info!("Take cancelled."),
            },
        )
    }

    /// Cancels playback. Returns true if something was playing.
    pub fn stop_playback(&self) -> bool {
        let _transition = self.transition.lock();
        self.scheduler.stop()
    }

    /// Blocks until the current playback finishes on its own.
    pub fn wait_for_playback(&self) -> bool {
        self.scheduler.wait()
    }

    pub fn state(&self) -> SessionState {
        if self.recorder.is_recording() {
            SessionState::Recording
        } else if self.scheduler.is_playing() {
            SessionState::Playing
        } else {
            SessionState::Idle
        }
    }

    /// The frozen log of the last completed recording.
    pub fn take(&self) -> EventLog {
        self.recorder.snapshot()
    }

    /// Mixes the last take down and writes it to the recordings directory, along with the
    /// take itself next to it. Returns the path of the WAV file.
    pub fn render_and_export(&self) -> Result<PathBuf, PadError> {
        let log = self.recorder.snapshot();
        render_and_export(
            &self.renderer,
            &log,
            self.provider.as_ref(),
            self.tail_ms,
            &self.recordings,
        )
    }

    pub fn pad_count(&self) -> usize {
        self.provider.pad_count()
    }
}

/// Renders the log, exports the WAV file and saves the take beside it with a `.yaml`
/// extension.
pub fn render_and_export(
    renderer: &Renderer,
    log: &EventLog,
    provider: &dyn AssetProvider,
    tail_ms: u64,
    recordings: &Path,
) -> Result<PathBuf, PadError> {
    let buffer = renderer.render(log, provider, tail_ms)?;
    let path = renderer.export(buffer, recordings)?;
    log.save(&path.with_extension("yaml"))?;
    Ok(path)
}

fn play_pad(provider: &dyn AssetProvider, device: &dyn audio::Device, pad: PadId) {
    match provider.load(pad) {
        Ok(sample) => {
            if let Err(e) = device.play_pad(pad, sample) {
                error!(pad = pad.0, err = e.as_ref(), "Unable to play pad");
            }
        }
        Err(e) => warn!(pad = pad.0, err = e.to_string(), "Pad has no sample"),
    }
}

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

//! Replays a frozen event log at its original timing.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Instant,
};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level, Span};

use crate::error::PadError;
use crate::events::{EventLog, PadId};
use crate::playsync::CancelHandle;

/// How a playback run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every event fired.
    Completed,
    /// The run was cancelled before every event fired.
    Cancelled,
}

/// Fires every event of the log at `t0 + offset`, where `t0` is the moment this is called.
///
/// Each deadline is computed from `t0` rather than from the previous fire time, so sleep
/// overshoot never accumulates. Events that are already due fire immediately, in log order.
/// Cancellation is checked before every event and wakes a pending wait immediately.
pub fn run<F>(log: &EventLog, cancel_handle: &CancelHandle, mut on_fire: F) -> PlaybackOutcome
where
    F: FnMut(PadId),
{
    let t0 = Instant::now();

    for event in log.iter() {
        let target = t0 + event.offset();

        while Instant::now() < target {
            if cancel_handle.wait_until(target) {
                return PlaybackOutcome::Cancelled;
            }
        }

        if cancel_handle.is_cancelled() {
            return PlaybackOutcome::Cancelled;
        }

        debug!(
            pad = event.pad.0,
            offset_ms = event.offset_ms,
            late_us = target.elapsed().as_micros() as u64,
            "Firing pad"
        );
        on_fire(event.pad);
    }

    PlaybackOutcome::Completed
}

/// The run currently owned by the scheduler.
struct ActiveRun {
    cancel_handle: CancelHandle,
    running: Arc<AtomicBool>,
    /// Disconnects once the worker has exited.
    done: Receiver<()>,
    join: thread::JoinHandle<()>,
}

/// Runs playback on a dedicated worker thread. Only one run is ever active: starting a
/// new one cancels the previous run and waits for its worker to exit first.
pub struct Scheduler {
    active: Mutex<Option<ActiveRun>>,
    span: Span,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler {
            active: Mutex::new(None),
            span: span!(Level::INFO, "scheduler"),
        }
    }

    /// Starts replaying the log. `on_fire` is called from the worker for every event and
    /// `on_done` exactly once with the outcome. Neither may call back into the scheduler.
    pub fn play<F, D>(
        &self,
        log: EventLog,
        on_fire: F,
        on_done: D,
    ) -> Result<CancelHandle, PadError>
    where
        F: FnMut(PadId) + Send + 'static,
        D: FnOnce(PlaybackOutcome) + Send + 'static,
    {
        let _enter = self.span.enter();
        let mut active = self.active.lock();

        if let Some(previous) = active.take() {
            info!("Cancelling previous playback.");
            Self::finish(previous);
        }

        let cancel_handle = CancelHandle::new();
        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done) = crossbeam_channel::bounded::<()>(0);

        let join = {
            let cancel_handle = cancel_handle.clone();
            let running = running.clone();
            let span = self.span.clone();
            thread::Builder::new()
                .name("playback".to_string())
                .spawn(move || {
                    let _done_tx = done_tx;
                    let _enter = span.enter();
                    info!(
                        events = log.len(),
                        duration_ms = log.duration().as_millis(),
                        "Playback started."
                    );

                    let outcome = run(&log, &cancel_handle, on_fire);

                    info!(outcome = ?outcome, "Playback finished.");
                    running.store(false, Ordering::Release);
                    on_done(outcome);
                })?
        };

        *active = Some(ActiveRun {
            cancel_handle: cancel_handle.clone(),
            running,
            done,
            join,
        });

        Ok(cancel_handle)
    }

    /// Cancels the active run, if any, and waits for its worker to exit. Returns true if a
    /// run was cancelled.
    pub fn stop(&self) -> bool {
        let _enter = self.span.enter();
        match self.active.lock().take() {
            Some(previous) => {
                let was_running = previous.running.load(Ordering::Acquire);
                Self::finish(previous);
                was_running
            }
            None => {
                info!("Scheduler is not active, nothing to stop.");
                false
            }
        }
    }

    /// Returns true while a run is firing events.
    pub fn is_playing(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|run| run.running.load(Ordering::Acquire))
    }

    /// Blocks until the active run ends, on its own or because it was cancelled. The run
    /// stays owned by the scheduler while waiting, so it can still be stopped or replaced.
    /// Returns false if there is no run to wait for.
    pub fn wait(&self) -> bool {
        let done = match self.active.lock().as_ref() {
            Some(run) => run.done.clone(),
            None => return false,
        };
        // Never sent on; returns once the worker drops its sender.
        let _ = done.recv();
        true
    }

    fn finish(run: ActiveRun) {
        run.cancel_handle.cancel();
        if run.join.join().is_err() {
            error!("Playback worker panicked");
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(run) = self.active.get_mut().take() {
            Self::finish(run);
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crossbeam_channel::unbounded;

    use super::*;
    use crate::events::BeatEvent;
    use crate::testutil::eventually;

    fn log(events: &[(u8, u64)]) -> EventLog {
        EventLog::from_events(
            events
                .iter()
                .map(|(pad, offset_ms)| BeatEvent::new(PadId(*pad), *offset_ms))
                .collect(),
        )
        .expect("invalid log")
    }

    #[test]
    fn test_events_fire_in_order_and_never_early() {
        let log = log(&[(0, 0), (1, 40), (2, 40), (3, 90), (4, 150)]);
        let mut fired: Vec<(PadId, Instant)> = Vec::new();

        let before = Instant::now();
        let outcome = run(&log, &CancelHandle::new(), |pad| fired.push((pad, Instant::now())));

        assert_eq!(PlaybackOutcome::Completed, outcome);
        let pads: Vec<PadId> = fired.iter().map(|(pad, _)| *pad).collect();
        assert_eq!(
            vec![PadId(0), PadId(1), PadId(2), PadId(3), PadId(4)],
            pads
        );

        for (event, (_, fired_at)) in log.iter().zip(fired.iter()) {
            let elapsed = fired_at.duration_since(before);
            assert!(elapsed >= event.offset(), "{:?} fired early", event);
            assert!(
                elapsed < event.offset() + Duration::from_millis(60),
                "{:?} fired {:?} late",
                event,
                elapsed - event.offset()
            );
        }
    }

    #[test]
    fn test_late_events_fire_immediately_in_order() {
        let log = log(&[(0, 0), (1, 5), (2, 10), (3, 15)]);
        let mut fired = Vec::new();

        // Each fire takes longer than the gap to the next event.
        let outcome = run(&log, &CancelHandle::new(), |pad| {
            fired.push(pad);
            thread::sleep(Duration::from_millis(20));
        });

        assert_eq!(PlaybackOutcome::Completed, outcome);
        assert_eq!(vec![PadId(0), PadId(1), PadId(2), PadId(3)], fired);
    }

    #[test]
    fn test_drift_does_not_accumulate() {
        let offsets: Vec<(u8, u64)> = (0..10).map(|i| (0, i * 20)).collect();
        let log = log(&offsets);
        let mut last = None;

        let before = Instant::now();
        run(&log, &CancelHandle::new(), |_| {
            last = Some(Instant::now());
            // Simulated slow output on every hit.
            thread::sleep(Duration::from_millis(5));
        });

        let elapsed = last.expect("nothing fired").duration_since(before);
        assert!(elapsed >= Duration::from_millis(180));
        assert!(elapsed < Duration::from_millis(180 + 45));
    }

    #[test]
    fn test_empty_log_completes_immediately() {
        let (done_tx, done_rx) = unbounded();
        let scheduler = Scheduler::new();
        scheduler
            .play(EventLog::empty(), |_| panic!("nothing to fire"), move |outcome| {
                done_tx.send(outcome).expect("send failed");
            })
            .expect("play failed");

        assert_eq!(
            Ok(PlaybackOutcome::Completed),
            done_rx.recv_timeout(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_cancel_between_events() {
        let log = log(&[(0, 0), (1, 300), (2, 600)]);
        let (fire_tx, fire_rx) = unbounded();
        let (done_tx, done_rx) = unbounded();

        let scheduler = Scheduler::new();
        let cancel_handle = scheduler
            .play(
                log,
                move |pad| fire_tx.send(pad).expect("send failed"),
                move |outcome| done_tx.send(outcome).expect("send failed"),
            )
            .expect("play failed");

        assert_eq!(Ok(PadId(0)), fire_rx.recv_timeout(Duration::from_secs(1)));
        let cancelled_at = Instant::now();
        cancel_handle.cancel();

        assert_eq!(
            Ok(PlaybackOutcome::Cancelled),
            done_rx.recv_timeout(Duration::from_secs(1))
        );
        assert!(cancelled_at.elapsed() < Duration::from_millis(100));

        // Nothing else fires and the outcome is reported exactly once.
        thread::sleep(Duration::from_millis(700));
        assert!(fire_rx.try_recv().is_err());
        assert!(done_rx.try_recv().is_err());
        eventually(|| !scheduler.is_playing(), "Scheduler never stopped");
    }

    #[test]
    fn test_play_cancels_previous_run() {
        let (fire_tx, fire_rx) = unbounded();
        let (done_tx, done_rx) = unbounded();
        let scheduler = Scheduler::new();

        {
            let fire_tx = fire_tx.clone();
            let done_tx = done_tx.clone();
            scheduler
                .play(
                    log(&[(0, 0), (0, 500)]),
                    move |pad| fire_tx.send(("first", pad)).expect("send failed"),
                    move |outcome| done_tx.send(("first", outcome)).expect("send failed"),
                )
                .expect("play failed");
        }
        assert_eq!(
            Ok(("first", PadId(0))),
            fire_rx.recv_timeout(Duration::from_secs(1))
        );

        scheduler
            .play(
                log(&[(1, 0)]),
                move |pad| fire_tx.send(("second", pad)).expect("send failed"),
                move |outcome| done_tx.send(("second", outcome)).expect("send failed"),
            )
            .expect("play failed");

        // The first run has been fully cancelled before the second one starts.
        assert_eq!(
            Ok(("first", PlaybackOutcome::Cancelled)),
            done_rx.recv_timeout(Duration::from_secs(1))
        );
        assert_eq!(
            Ok(("second", PadId(1))),
            fire_rx.recv_timeout(Duration::from_secs(1))
        );
        assert_eq!(
            Ok(("second", PlaybackOutcome::Completed)),
            done_rx.recv_timeout(Duration::from_secs(1))
        );
        thread::sleep(Duration::from_millis(600));
        assert!(fire_rx.try_recv().is_err());
    }

    #[test]
    fn test_stop() {
        let scheduler = Scheduler::new();
        assert!(!scheduler.stop());

        scheduler
            .play(log(&[(0, 0), (0, 5000)]), |_| {}, |_| {})
            .expect("play failed");
        eventually(|| scheduler.is_playing(), "Scheduler never started");

        let start = Instant::now();
        assert!(scheduler.stop());
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn test_wait_for_completion() {
        let scheduler = Scheduler::new();
        assert!(!scheduler.wait());

        scheduler
            .play(log(&[(0, 0), (1, 30)]), |_| {}, |_| {})
            .expect("play failed");
        assert!(scheduler.wait());
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn test_play_while_waiting_cancels_previous_run() {
        let scheduler = Scheduler::new();
        let (fire_tx, fire_rx) = unbounded();
        let (done_tx, done_rx) = unbounded();

        {
            let fire_tx = fire_tx.clone();
            let done_tx = done_tx.clone();
            scheduler
                .play(
                    log(&[(0, 0), (0, 300)]),
                    move |pad| fire_tx.send(("first", pad)).expect("send failed"),
                    move |outcome| done_tx.send(("first", outcome)).expect("send failed"),
                )
                .expect("play failed");
        }

        thread::scope(|scope| {
            let waiter = scope.spawn(|| scheduler.wait());
            eventually(|| fire_rx.len() == 1, "First run never fired");
            thread::sleep(Duration::from_millis(20));

            // The waiter must not hide the run from the scheduler.
            assert!(scheduler.is_playing());

            scheduler
                .play(
                    log(&[(1, 0), (1, 300)]),
                    move |pad| fire_tx.send(("second", pad)).expect("send failed"),
                    move |outcome| done_tx.send(("second", outcome)).expect("send failed"),
                )
                .expect("play failed");

            assert_eq!(
                ("first", PlaybackOutcome::Cancelled),
                done_rx
                    .recv_timeout(Duration::from_secs(1))
                    .expect("first run never finished")
            );
            assert!(waiter.join().expect("waiter panicked"));
        });

        assert!(scheduler.wait());
        assert_eq!(
            ("second", PlaybackOutcome::Completed),
            done_rx.recv().expect("second run never finished")
        );
        let fired: Vec<(&str, PadId)> = fire_rx.try_iter().collect();
        assert_eq!(
            vec![("first", PadId(0)), ("second", PadId(1)), ("second", PadId(1))],
            fired
        );
    }

    #[test]
    fn test_stop_while_waiting() {
        let scheduler = Scheduler::new();
        let (done_tx, done_rx) = unbounded();
        scheduler
            .play(
                log(&[(0, 0), (0, 5000)]),
                |_| {},
                move |outcome| done_tx.send(outcome).expect("send failed"),
            )
            .expect("play failed");

        thread::scope(|scope| {
            let waiter = scope.spawn(|| scheduler.wait());
            thread::sleep(Duration::from_millis(20));

            assert!(scheduler.stop());
            assert!(waiter.join().expect("waiter panicked"));
        });

        assert_eq!(Ok(PlaybackOutcome::Cancelled), done_rx.try_recv());
        assert!(!scheduler.is_playing());
    }
}

// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, warn, Instrument, Level};

use crate::error::PadError;
use crate::events::PadId;
use crate::session::Session;
use crate::util;

pub mod keyboard;

/// Controller events that will trigger behavior in the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// A pad was hit. It plays immediately and is logged if a recording is in progress.
    Trigger(PadId),

    /// Starts a new recording, discarding the previous take.
    Record,

    /// Stops the recording in progress. If nothing is being recorded, does nothing.
    Stop,

    /// Plays the last take back.
    Play,

    /// Cancels playback. If nothing is playing, does nothing.
    Halt,

    /// Mixes the last take down to a file in the recordings directory.
    Render,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a session from a driver's events.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(
        session: Arc<Session>,
        driver: Arc<dyn Driver>,
    ) -> Result<Controller, Box<dyn Error>> {
        Ok(Controller {
            handle: tokio::spawn(
                Controller::trigger_events(session, driver)
                    .instrument(span!(Level::INFO, "controller")),
            ),
        })
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Triggers session events by watching the driver and getting events from it.
    async fn trigger_events(session: Arc<Session>, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(32);
        let join_handle = driver.monitor_events(events_tx);
        let mut renders: Vec<JoinHandle<Result<PathBuf, PadError>>> = Vec::new();

        info!(pads = session.pad_count(), "Controller started.");

        loop {
            if let Some(event) = events_rx.recv().await {
                info!(event = format!("{:?}", event), "Received event.");

                let result: Result<(), Box<dyn Error + Send + Sync>> = match event {
                    Event::Trigger(pad) => session.trigger(pad).map(|_| ()).map_err(Into::into),
                    Event::Record => {
                        Self::transport(&session, |session| {
                            session.start_recording();
                            Ok(())
                        })
                        .await
                    }
                    Event::Stop => {
                        Self::transport(&session, |session| {
                            let take = session.stop_recording();
                            info!(
                                events = take.len(),
                                duration = util::offset_display(take.duration().as_millis() as u64),
                                "Take recorded."
                            );
                            Ok(())
                        })
                        .await
                    }
                    Event::Play => {
                        Self::transport(&session, |session| session.play().map(|_| ())).await
                    }
                    Event::Halt => {
                        Self::transport(&session, |session| {
                            session.stop_playback();
                            Ok(())
                        })
                        .await
                    }
                    Event::Render => {
                        // Rendering can take a while, keep it off the event loop.
                        let session = session.clone();
                        renders.push(tokio::task::spawn_blocking(move || {
                            session.render_and_export()
                        }));
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    error!("Error talking to session: {}", e);
                }

                renders.retain(|render| !render.is_finished());
            } else {
                info!("Controller closing.");
                if let Err(e) = join_handle.await {
                    error!("Error waiting for event monitor to stop: {}", e);
                }
                for render in renders.drain(..) {
                    match render.await {
                        Ok(Ok(path)) => info!(path = ?path, "Render finished."),
                        Ok(Err(e)) => warn!(err = e.to_string(), "Render failed."),
                        Err(e) => error!("Error waiting for render: {}", e),
                    }
                }
                return;
            }
        }
    }

    /// Runs a transport change on the blocking pool, since it may join the playback
    /// worker. Events are still handled one at a time, in order.
    async fn transport<F>(
        session: &Arc<Session>,
        change: F,
    ) -> Result<(), Box<dyn Error + Send + Sync>>
    where
        F: FnOnce(&Session) -> Result<(), PadError> + Send + 'static,
    {
        let session = session.clone();
        tokio::task::spawn_blocking(move || change(session.as_ref())).await??;
        Ok(())
    }
}

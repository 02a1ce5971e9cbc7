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
use std::collections::HashMap;
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::events::PadId;

const RECORD: &str = "record";
const STOP: &str = "stop";
const PLAY: &str = "play";
const HALT: &str = "halt";
const RENDER: &str = "render";

/// A controller that drives a session from the keyboard. A line of pad keys hits those
/// pads in order; a command word runs that command.
pub struct Driver {
    bindings: HashMap<char, PadId>,
}

impl Driver {
    pub fn new(bindings: &[(char, PadId)]) -> Driver {
        Driver {
            bindings: bindings.iter().copied().collect(),
        }
    }

    fn monitor_io<R, W>(
        bindings: &HashMap<char, PadId>,
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<(), io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Pads or command ({}, {}, {}, {}, {}): ",
            RECORD, STOP, PLAY, HALT, RENDER,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
        }

        let input = input.trim().to_lowercase();
        let events = match input.as_str() {
            RECORD => vec![Event::Record],
            STOP => vec![Event::Stop],
            PLAY => vec![Event::Play],
            HALT => vec![Event::Halt],
            RENDER => vec![Event::Render],
            keys => keys
                .chars()
                .filter_map(|key| match bindings.get(&key) {
                    Some(pad) => Some(Event::Trigger(*pad)),
                    None => {
                        warn!(key = key.to_string(), "Unbound key");
                        None
                    }
                })
                .collect(),
        };

        for event in events {
            events_tx.blocking_send(event).map_err(io::Error::other)?;
        }
        Ok(())
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let bindings = self.bindings.clone();
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!(pads = bindings.len(), "Keyboard driver started.");

            loop {
                match Self::monitor_io(&bindings, &events_tx, io::stdin().lock(), io::stdout()) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        info!("Input closed, keyboard driver exiting.");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

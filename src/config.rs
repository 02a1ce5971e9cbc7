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
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::controller::{keyboard, Controller};
use crate::events::EventLog;
use crate::mixdown::Renderer;
use crate::recorder::Recorder;
use crate::samples::PadBank;
use crate::session::{self, Session};

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::padtrack::Padtrack;

mod audio;
mod error;
mod padtrack;

/// Loads every pad sample named by the config. Pads that fail to load are reported but
/// don't stop the rest from loading.
pub fn load_pads(config: &Padtrack) -> Result<PadBank, Box<dyn Error>> {
    let format = config.audio().output_format()?;
    let bank = PadBank::load(&config.pad_paths(), format.sample_rate, format.channels)?;
    for pad in bank.failed_pads() {
        warn!(pad = pad.0, "Pad will be silent");
    }
    Ok(bank)
}

/// Builds a session from the config: loads the pads, opens the output device and sets up
/// the recorder and renderer.
pub fn init_session(config: &Padtrack) -> Result<Arc<Session>, Box<dyn Error>> {
    let bank = load_pads(config)?;
    let device = crate::audio::get_device(config.audio())?;
    info!(device = device.to_string(), "Using audio device");

    Ok(Arc::new(Session::new(
        Arc::new(bank),
        Arc::new(Recorder::new(config.pad_count(), config.max_events())),
        device,
        Renderer::new(config.audio().output_format()?),
        &config.recordings(),
        config.tail_ms(),
    )))
}

/// Initializes the session and a keyboard controller from the given config file and
/// returns the controller. The controller owns the session and runs until its input closes.
pub fn init_session_and_controller(config_path: &Path) -> Result<Controller, Box<dyn Error>> {
    let config = Padtrack::deserialize(config_path)?;
    let session = init_session(&config)?;
    let driver = Arc::new(keyboard::Driver::new(&config.key_bindings()));
    Controller::new(session, driver)
}

/// Renders a saved take with the pads of the given config into the config's recordings
/// directory. Returns the path of the new WAV file.
pub fn render_take(config_path: &Path, take_path: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let config = Padtrack::deserialize(config_path)?;
    let log = EventLog::load(take_path)?;
    let bank = load_pads(&config)?;
    let renderer = Renderer::new(config.audio().output_format()?);

    Ok(session::render_and_export(
        &renderer,
        &log,
        &bank,
        config.tail_ms(),
        &config.recordings(),
    )?)
}

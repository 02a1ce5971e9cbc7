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
use clap::{crate_version, Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;

use padtrack::config::{self, Padtrack};
use padtrack::events::{EventLog, PadId};
use padtrack::samples::AssetProvider;
use padtrack::{audio, util};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A drum pad recorder."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start will start a keyboard driven pad session.
    Start {
        /// The path to the pad config.
        config_path: String,
    },
    /// Loads and lists every pad in the given config.
    Pads {
        /// The path to the pad config.
        config_path: String,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Mixes a saved take down to a WAV file in the recordings directory.
    Render {
        /// The path to the pad config.
        config_path: String,
        /// The path to the take.
        take_path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_path } => {
            let mut controller = config::init_session_and_controller(&PathBuf::from(config_path))?;
            controller.join().await?;
        }
        Commands::Pads { config_path } => {
            let config = Padtrack::deserialize(&PathBuf::from(&config_path))?;
            let bank = config::load_pads(&config)?;
            let keys = config.key_bindings();
            let paths = config.pad_paths();

            println!("Pads (count: {}):", bank.pad_count());
            for (index, path) in paths.iter().enumerate() {
                let pad = PadId(u8::try_from(index)?);
                let key = keys
                    .iter()
                    .find(|(_, bound)| *bound == pad)
                    .map(|(key, _)| key.to_string())
                    .unwrap_or_else(|| "-".to_string());
                match bank.load(pad) {
                    Ok(sample) => println!(
                        "- {} [{}] {} ({}, {} frames)",
                        pad,
                        key,
                        util::filename_display(path),
                        util::duration_minutes_seconds(sample.duration()),
                        sample.frames()
                    ),
                    Err(e) => println!("- {} [{}] unavailable: {}", pad, key, e),
                }
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;
            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Render {
            config_path,
            take_path,
        } => {
            let take_path = PathBuf::from(take_path);
            let take = EventLog::load(&take_path)?;
            let path = config::render_take(&PathBuf::from(config_path), &take_path)?;
            println!(
                "Rendered {} hits ({}) to {}",
                take.len(),
                util::offset_display(take.duration().as_millis() as u64),
                path.display()
            );
        }
    };

    Ok(())
}

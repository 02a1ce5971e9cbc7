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
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

use super::audio::Audio;
use super::error::ConfigError;
use crate::events::PadId;
use crate::mixdown::DEFAULT_TAIL_MS;
use crate::recorder::DEFAULT_MAX_EVENTS;

/// The most pads a kit may have.
pub const MAX_PADS: usize = 64;

const DEFAULT_KEYS: &str = "qweasdzxc";
const DEFAULT_RECORDINGS: &str = "recordings";

/// The configuration for a pad session.
#[derive(Deserialize, Debug)]
pub struct Padtrack {
    /// Sample files, one per pad, in pad order.
    pads: Vec<String>,

    /// Keys bound to pads in pad order (default: "qweasdzxc").
    keys: Option<String>,

    /// Where exported takes are written (default: "recordings").
    recordings: Option<String>,

    /// The audio output configuration.
    #[serde(default)]
    audio: Audio,

    /// Silence appended after the last hit of a mixdown, in milliseconds.
    tail_ms: Option<u64>,

    /// How many hits a single recording may hold.
    max_events: Option<usize>,

    /// Relative paths are resolved against this directory.
    #[serde(skip)]
    base_path: PathBuf,
}

impl Padtrack {
    /// Parses the configuration from a YAML file. Relative paths in it are resolved
    /// against the directory the file lives in.
    pub fn deserialize(path: &Path) -> Result<Padtrack, ConfigError> {
        let base_path = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Padtrack::from_config(
            Config::builder().add_source(File::from(path)).build()?,
            &base_path,
        )
    }

    /// Deserializes and validates an already built config.
    pub(super) fn from_config(config: Config, base_path: &Path) -> Result<Padtrack, ConfigError> {
        let mut padtrack = config.try_deserialize::<Padtrack>()?;
        padtrack.base_path = base_path.to_path_buf();
        padtrack.validate()?;
        Ok(padtrack)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pads.is_empty() || self.pads.len() > MAX_PADS {
            return Err(ConfigError::Invalid(format!(
                "between 1 and {} pads must be configured, found {}",
                MAX_PADS,
                self.pads.len()
            )));
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = self.key_chars().find(|key| !seen.insert(*key)) {
            return Err(ConfigError::Invalid(format!(
                "key '{}' is bound more than once",
                duplicate
            )));
        }

        if self.max_events == Some(0) {
            return Err(ConfigError::Invalid(
                "max_events must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    fn key_chars(&self) -> impl Iterator<Item = char> + '_ {
        self.keys
            .as_deref()
            .unwrap_or(DEFAULT_KEYS)
            .chars()
            .map(|key| key.to_ascii_lowercase())
    }

    /// The resolved sample path of every pad, in pad order.
    pub fn pad_paths(&self) -> Vec<PathBuf> {
        self.pads.iter().map(|pad| self.base_path.join(pad)).collect()
    }

    /// The number of configured pads.
    pub fn pad_count(&self) -> usize {
        self.pads.len()
    }

    /// The key bound to each pad. Extra keys beyond the pad count are ignored, and pads
    /// beyond the key count have no key.
    pub fn key_bindings(&self) -> Vec<(char, PadId)> {
        self.key_chars()
            .take(self.pads.len())
            .zip(0..=u8::MAX)
            .map(|(key, index)| (key, PadId(index)))
            .collect()
    }

    /// The resolved directory exports are written to.
    pub fn recordings(&self) -> PathBuf {
        self.base_path
            .join(self.recordings.as_deref().unwrap_or(DEFAULT_RECORDINGS))
    }

    /// Gets the audio configuration.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn tail_ms(&self) -> u64 {
        self.tail_ms.unwrap_or(DEFAULT_TAIL_MS)
    }

    pub fn max_events(&self) -> usize {
        self.max_events.unwrap_or(DEFAULT_MAX_EVENTS)
    }
}

#[cfg(test)]
mod test {
    use std::path::{Path, PathBuf};

    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Result<Padtrack, ConfigError> {
        Padtrack::from_config(
            Config::builder()
                .add_source(File::from_str(yaml, FileFormat::Yaml))
                .build()?,
            Path::new("/kits/rock"),
        )
    }

    #[test]
    fn test_defaults() -> Result<(), ConfigError> {
        let padtrack = parse(
            r#"
            pads:
              - kick.wav
              - snare.wav
              - /samples/hat.wav
        "#,
        )?;

        assert_eq!(3, padtrack.pad_count());
        assert_eq!(
            vec![
                PathBuf::from("/kits/rock/kick.wav"),
                PathBuf::from("/kits/rock/snare.wav"),
                PathBuf::from("/samples/hat.wav"),
            ],
            padtrack.pad_paths()
        );
        assert_eq!(
            vec![('q', PadId(0)), ('w', PadId(1)), ('e', PadId(2))],
            padtrack.key_bindings()
        );
        assert_eq!(PathBuf::from("/kits/rock/recordings"), padtrack.recordings());
        assert_eq!("default", padtrack.audio().device());
        assert_eq!(DEFAULT_TAIL_MS, padtrack.tail_ms());
        assert_eq!(DEFAULT_MAX_EVENTS, padtrack.max_events());
        Ok(())
    }

    #[test]
    fn test_overrides() -> Result<(), ConfigError> {
        let padtrack = parse(
            r#"
            pads:
              - kick.wav
              - snare.wav
            keys: JK
            recordings: /tmp/takes
            tail_ms: 250
            max_events: 10
            audio:
              device: mock-device
              sample_rate: 48000
        "#,
        )?;

        assert_eq!(
            vec![('j', PadId(0)), ('k', PadId(1))],
            padtrack.key_bindings()
        );
        assert_eq!(PathBuf::from("/tmp/takes"), padtrack.recordings());
        assert_eq!(250, padtrack.tail_ms());
        assert_eq!(10, padtrack.max_events());
        assert_eq!("mock-device", padtrack.audio().device());
        assert_eq!(48000, padtrack.audio().sample_rate());
        Ok(())
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            parse("pads: []"),
            Err(ConfigError::Invalid(_)) | Err(ConfigError::Load(_))
        ));
        assert!(matches!(
            parse(
                r#"
                pads:
                  - kick.wav
                keys: qq
            "#
            ),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse(
                r#"
                pads:
                  - kick.wav
                max_events: 0
            "#
            ),
            Err(ConfigError::Invalid(_))
        ));
    }
}

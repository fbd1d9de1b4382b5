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
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use super::audio::Audio;
use super::error::ConfigError;
use super::library::Library;
use super::modulation::Modulation;
use crate::modulation::Settings;

/// Channel volume, in percent, before the user touches anything.
pub const DEFAULT_VOLUME: f32 = 75.0;

/// The configuration for the ambient player.
#[derive(Deserialize, Clone, Debug)]
pub struct Player {
    /// The audio output configuration.
    #[serde(default)]
    audio: Audio,
    /// The path to the library file, relative to this file.
    library: String,
    /// Seed for the initial variation choice. Random when unset.
    seed: Option<u64>,
    /// Start playing as soon as the graph is mounted.
    #[serde(default)]
    autoplay: bool,
    /// Initial volume of every channel, in percent.
    volume: Option<f32>,
    /// Modulation timings.
    #[serde(default)]
    modulation: Modulation,

    /// The directory the player file lives in.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Player {
    /// Parse the player configuration from a YAML file. Values can be overridden with
    /// MURMUR_-prefixed environment variables, e.g. MURMUR_AUDIO__DEVICE=mock.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        let mut player = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix("MURMUR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Player>()?;
        player.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(player)
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// The resolved path of the library file.
    pub fn library_path(&self) -> PathBuf {
        self.base_dir.join(&self.library)
    }

    /// Loads the library this player points at.
    pub fn library(&self) -> Result<Library, ConfigError> {
        Library::deserialize(&self.library_path())
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(DEFAULT_VOLUME)
    }

    pub fn modulation(&self) -> Result<Settings, ConfigError> {
        self.modulation.settings()
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs, time::Duration};

    use super::Player;

    #[test]
    fn test_deserialize() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("player.yaml");
        fs::write(
            &path,
            r#"
audio:
  device: mock-device
  sample_rate: 48000
library: libraries/forest.yaml
seed: 7
autoplay: true
modulation:
  sweep_tick: 50ms
"#,
        )?;

        let player = Player::deserialize(&path)?;
        assert_eq!("mock-device", player.audio().device());
        assert_eq!(Some(48000), player.audio().sample_rate());
        assert_eq!(
            dir.path().join("libraries/forest.yaml"),
            player.library_path()
        );
        assert_eq!(Some(7), player.seed());
        assert!(player.autoplay());
        assert_eq!(75.0, player.volume());
        assert_eq!(Duration::from_millis(50), player.modulation()?.sweep_tick);
        Ok(())
    }

    #[test]
    fn test_minimal() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("player.yaml");
        fs::write(&path, "library: library.yaml\nvolume: 40\n")?;

        let player = Player::deserialize(&path)?;
        assert_eq!("default", player.audio().device());
        assert_eq!(None, player.audio().sample_rate());
        assert_eq!(None, player.seed());
        assert!(!player.autoplay());
        assert_eq!(40.0, player.volume());
        assert_eq!(
            Duration::from_millis(30),
            player.modulation()?.crossfade_tick
        );
        Ok(())
    }
}

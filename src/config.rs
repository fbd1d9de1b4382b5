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
use std::{error::Error, path::Path, sync::Arc};

use crate::{
    assets,
    audio::Context,
    controller::{keyboard, Controller},
    state::Action,
};

mod audio;
mod error;
mod library;
mod modulation;
mod player;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::library::{Channel, Library, Variation};
pub use self::modulation::Modulation;
pub use self::player::{Player, DEFAULT_VOLUME};

/// Loads the library the player config points at, decodes its samples and mounts the graph on
/// the given context.
pub fn init_player(
    player_config: &Player,
    context: Arc<dyn Context>,
) -> Result<Arc<crate::player::Player>, Box<dyn Error>> {
    let library = player_config.library()?;
    let assets = assets::load(&library);
    let player = crate::player::Player::new(
        context,
        player_config.modulation()?,
        player_config.volume(),
        player_config.seed(),
    )?;
    player.mount_assets(&assets)?;
    Ok(Arc::new(player))
}

/// Creates the player on the configured device and hands it to a keyboard controller.
pub fn init_player_and_controller(player_path: &Path) -> Result<Controller, Box<dyn Error>> {
    let player_config = Player::deserialize(player_path)?;
    let context = crate::audio::get_context(player_config.audio())?;
    let player = init_player(&player_config, context)?;
    if player_config.autoplay() {
        player.dispatch(Action::Play);
    }
    Ok(Controller::new(player, Arc::new(keyboard::Driver::new())))
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs, sync::Arc};

    use crate::{audio::mock, testutil::write_wav};

    use super::{init_player, Player};

    #[tokio::test(start_paused = true)]
    async fn test_init_player() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        for name in ["rain", "wind", "pad", "lead", "spark", "crackle", "hall"] {
            write_wav(&dir.path().join(format!("{}.wav", name)), 1, 44100, &[0.1; 32])?;
        }
        fs::write(
            dir.path().join("library.yaml"),
            r#"
reverb_impulse: hall.wav
channels:
  - name: Effects
    rules: { multi_sample: true }
    variations:
      - name: embers
        rules: { velocity_variance: 0.2 }
        samples: [spark.wav, crackle.wav]
  - name: Ambience
    rules: { reverb: true, modulate_lpf: true }
    variations:
      - name: storm
        samples: [rain.wav]
      - name: breeze
        samples: [wind.wav]
  - name: Lead
    variations:
      - name: melody
        samples: [lead.wav]
  - name: Pad
    rules: { reverb: true }
    variations:
      - name: warm
        samples: [pad.wav]
"#,
        )?;
        let path = dir.path().join("player.yaml");
        fs::write(&path, "library: library.yaml
seed: 11
volume: 50
")?;

        let context = Arc::new(mock::Context::new("mock", 44100));
        let player = init_player(&Player::deserialize(&path)?, context)?;
        let state = player.state();
        assert!(state.is_setup);
        let names: Vec<_> = state.channels.iter().map(|c| c.graph.name.as_str()).collect();
        assert_eq!(vec!["Ambience", "Pad", "Lead", "Effects"], names);
        assert!(state.channels.iter().all(|c| c.volume == 50.0));
        assert_eq!("crackle", state.channels[3].graph.variations[0].samples[1].name);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_player_with_missing_sample() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("library.yaml"),
            "channels:\n  - name: Pad\n    variations:\n      - name: a\n        samples: [gone.wav]\n",
        )?;
        let path = dir.path().join("player.yaml");
        fs::write(&path, "library: library.yaml\n")?;

        let context = Arc::new(mock::Context::new("mock", 44100));
        assert!(init_player(&Player::deserialize(&path)?, context).is_err());
        Ok(())
    }
}

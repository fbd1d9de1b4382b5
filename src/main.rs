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
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use murmur::{audio, config};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "An ambient, generative sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Loads every sample of a player's library and builds the audio graph without playing it.
    Verify {
        /// The path to the player config.
        player_path: String,
    },
    /// Start will start the ambient player.
    Start {
        /// The path to the player config.
        player_path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
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
        Commands::Verify { player_path } => {
            let player_config = config::Player::deserialize(&PathBuf::from(player_path))?;
            let context = Arc::new(audio::mock::Context::new(
                "mock-verify",
                player_config
                    .audio()
                    .sample_rate()
                    .unwrap_or(audio::mock::DEFAULT_SAMPLE_RATE),
            ));
            let player = config::init_player(&player_config, context.clone())?;

            print!("{}", player.state());
            println!("Nodes: {}", context.node_count());
        }
        Commands::Start { player_path } => {
            config::init_player_and_controller(&PathBuf::from(player_path))?
                .join()
                .await?;
        }
    }

    Ok(())
}

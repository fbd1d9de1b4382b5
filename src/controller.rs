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
use std::{io, sync::Arc};

use tokio::{
    sync::mpsc::{self, Sender},
    task::{JoinError, JoinHandle},
};
use tracing::{error, info, span, warn, Level, Span};

use crate::{player::Player, state::Action};

pub mod keyboard;

/// Controller events that will trigger behavior in the player.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// Unmutes every channel and starts the automations.
    Play,

    /// Mutes every channel.
    Stop,

    /// Sets a channel's volume, in percent.
    SetVolume { channel: usize, percent: f32 },

    /// Crossfades a channel over to another variation.
    SetVariation { channel: usize, variation: usize },

    /// Logs the current engine state.
    Status,

    /// Shuts the controller down.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Feeds events from a driver into the player.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(player: Arc<Player>, driver: Arc<dyn Driver>) -> Controller {
        Controller {
            handle: tokio::spawn(async move { Controller::trigger_events(player, driver).await }),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Triggers player actions by watching the driver and getting events from it.
    async fn trigger_events(player: Arc<Player>, driver: Arc<dyn Driver>) {
        let span = span!(Level::INFO, "controller");

        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);
        span.in_scope(|| info!(state = %player.state(), "Controller started."));

        while let Some(event) = events_rx.recv().await {
            if !Controller::handle_event(&span, &player, event) {
                break;
            }
        }

        // Dropping the receiver lets the driver notice that nobody is listening anymore.
        drop(events_rx);
        span.in_scope(|| info!("Controller closing."));
        match join_handle.await {
            Ok(Err(e)) => span.in_scope(|| error!(err = %e, "Event monitor failed")),
            Err(e) => span.in_scope(|| error!(err = %e, "Error waiting for event monitor to stop")),
            Ok(Ok(())) => {}
        }
    }

    /// Applies one event. Returns false once the controller should stop.
    fn handle_event(span: &Span, player: &Player, event: Event) -> bool {
        let _enter = span.enter();
        info!(event = ?event, "Received event.");

        let state = player.state();
        let action = match event {
            Event::Play => Action::Play,
            Event::Stop => Action::Stop,
            Event::SetVolume { channel, percent } => {
                if channel >= state.channels.len() {
                    warn!(channel, "No such channel");
                    return true;
                }
                Action::SetVolume { channel, percent }
            }
            Event::SetVariation { channel, variation } => {
                match state.channels.get(channel) {
                    Some(c) if variation < c.graph.variations.len() => {}
                    Some(_) => {
                        warn!(channel, variation, "No such variation");
                        return true;
                    }
                    None => {
                        warn!(channel, "No such channel");
                        return true;
                    }
                }
                Action::SetVariation { channel, variation }
            }
            Event::Status => {
                info!("\n{}", state);
                return true;
            }
            Event::Quit => return false,
        };
        player.dispatch(action);
        true
    }
}

#[cfg(test)]
mod test {
    use std::{io, sync::Arc};

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use crate::{
        audio::mock, modulation::Settings, player::Player, testutil::session_assets,
    };

    use super::{Controller, Driver, Event};

    /// Sends a fixed script of events, then quits.
    struct ScriptDriver {
        script: Vec<(usize, usize, f32)>,
    }

    impl Driver for ScriptDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let script = self.script.clone();
            tokio::task::spawn_blocking(move || {
                let mut events = vec![Event::Play, Event::Status];
                for (channel, variation, percent) in script {
                    events.push(Event::SetVolume { channel, percent });
                    events.push(Event::SetVariation { channel, variation });
                }
                events.push(Event::Stop);
                events.push(Event::Play);
                events.push(Event::Quit);
                for event in events {
                    if events_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Ok(())
            })
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller() {
        let context = Arc::new(mock::Context::new("mock", 44100));
        let player = Arc::new(Player::new(context, Settings::default(), 75.0, Some(5)).unwrap());
        player.mount_assets(&session_assets()).unwrap();

        let driver = Arc::new(ScriptDriver {
            script: vec![
                (1, 2, 30.0),
                // Out of range, ignored.
                (9, 0, 10.0),
                (0, 7, 10.0),
            ],
        });
        let mut controller = Controller::new(player.clone(), driver);
        controller.join().await.unwrap();

        let state = player.state();
        assert!(state.is_playing);
        assert!(state.played_once);
        assert_eq!(30.0, state.channels[1].volume);
        assert_eq!(2, state.channels[1].active_variation);
        // The bad variation index was dropped but the volume went through.
        assert_eq!(10.0, state.channels[0].volume);
        assert_eq!(
            state.channels[0].graph.initial_variation,
            state.channels[0].active_variation
        );
    }
}

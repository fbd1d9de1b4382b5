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
use std::{collections::HashMap, sync::Arc};

use parking_lot::{Mutex, RwLock};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::runtime::{Handle, TryCurrentError};
use tracing::{debug, error, info, span, warn, Level, Span};

use crate::{
    assets::Assets,
    audio::{Context, Param},
    graph::{build_channels, GraphError},
    modulation::{crossfade, stagger_start, sweep, velocity_drift, Automation, Settings},
    state::{Action, Command, EngineState},
};

/// A crossfade along with every gain it moves.
struct Fade {
    gains: Vec<Param>,
    automation: Automation,
}

/// Automations the player has started, keyed by channel index. Dropping one cancels it.
#[derive(Default)]
struct Automations {
    sweeps: HashMap<usize, Automation>,
    velocity: HashMap<usize, Vec<Automation>>,
    crossfades: HashMap<usize, Fade>,
}

impl Automations {
    fn clear(&mut self) {
        self.sweeps.clear();
        self.velocity.clear();
        self.crossfades.clear();
    }
}

/// Drives the ambient engine: owns the audio context, the engine state and every running
/// automation. All actions go through [Player::dispatch].
pub struct Player {
    context: Arc<dyn Context>,
    settings: Settings,
    /// Runtime the automations are spawned on.
    runtime: Handle,
    rng: Mutex<StdRng>,
    /// Volume every channel starts at when mounted.
    volume: f32,
    state: RwLock<EngineState>,
    automations: Mutex<Automations>,
    span: Span,
}

impl Player {
    /// Creates a new player. Must be called from within a tokio runtime.
    pub fn new(
        context: Arc<dyn Context>,
        settings: Settings,
        volume: f32,
        seed: Option<u64>,
    ) -> Result<Player, TryCurrentError> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Player {
            context,
            settings,
            runtime: Handle::try_current()?,
            rng: Mutex::new(rng),
            volume,
            state: RwLock::new(EngineState::default()),
            automations: Mutex::new(Automations::default()),
            span: span!(Level::INFO, "player"),
        })
    }

    pub fn context(&self) -> Arc<dyn Context> {
        self.context.clone()
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> EngineState {
        self.state.read().clone()
    }

    /// Builds the graph from the given assets and mounts it. If the assets aren't ready or the
    /// graph can't be built, nothing is mounted.
    pub fn mount_assets(&self, assets: &Assets) -> Result<(), GraphError> {
        let _enter = self.span.enter();

        if !assets.is_ready() {
            warn!(
                channels = assets.channels.len(),
                load_failed = assets.load_failed,
                "Assets are not ready, not mounting"
            );
            assets.ready()?;
        }

        let channels = {
            let mut rng = self.rng.lock();
            build_channels(
                self.context.as_ref(),
                assets,
                &mut *rng,
                self.settings.base_cutoff,
            )
        };
        match channels {
            Ok(channels) => {
                self.dispatch(Action::Mount {
                    channels,
                    volume: self.volume,
                });
                Ok(())
            }
            Err(e) => {
                error!(err = %e, "Unable to build the audio graph");
                Err(e)
            }
        }
    }

    /// Applies an action: computes the next state, publishes it and carries out the commands
    /// the transition produced.
    pub fn dispatch(&self, action: Action) {
        let _enter = self.span.enter();

        let mut state = self.state.write();
        let mount = matches!(action, Action::Mount { .. });
        let (next, commands) = state.reduce(action);
        *state = next;

        let mut automations = self.automations.lock();
        if mount {
            automations.clear();
        }
        for command in commands {
            self.execute(&state, &mut automations, command);
        }

        info!(
            is_setup = state.is_setup,
            is_playing = state.is_playing,
            "Dispatched action"
        );
    }

    /// The number of crossfades still running on a channel.
    pub fn active_crossfades(&self, channel: usize) -> usize {
        self.automations
            .lock()
            .crossfades
            .get(&channel)
            .map_or(0, |fade| usize::from(!fade.automation.is_finished()))
    }

    /// True if the channel's lowpass sweep is running.
    pub fn is_sweeping(&self, channel: usize) -> bool {
        self.automations
            .lock()
            .sweeps
            .get(&channel)
            .is_some_and(|sweep| !sweep.is_finished())
    }

    fn execute(&self, state: &EngineState, automations: &mut Automations, command: Command) {
        match command {
            Command::SetChannelGain { param, gain } => {
                let now = self.context.current_time();
                if let Err(e) = self.context.set_value_at_time(param, gain, now) {
                    warn!(err = %e, "Unable to set channel gain");
                }
            }
            Command::StartSweep {
                channel,
                param,
                base,
                phase,
            } => {
                debug!(channel, base, phase, "Starting lowpass sweep");
                let sweep = sweep(
                    &self.runtime,
                    self.context.clone(),
                    param,
                    base,
                    phase,
                    &self.settings,
                );
                automations.sweeps.insert(channel, sweep);
            }
            Command::CancelSweep { channel } => {
                if automations.sweeps.remove(&channel).is_some() {
                    debug!(channel, "Cancelled lowpass sweep");
                }
            }
            Command::StaggerStart { channel, variation } => {
                let variation = state.channels[channel].graph.variation(variation);
                if let Err(e) = stagger_start(
                    self.context.as_ref(),
                    variation,
                    self.settings.stagger_interval,
                ) {
                    warn!(err = %e, channel, variation = %variation.name, "Unable to start samples");
                }
            }
            Command::StartVelocityDrift {
                channel,
                variation,
                gains,
                variance,
            } => {
                debug!(channel, variation, variance, "Starting velocity drift");
                let seed = self.rng.lock().gen();
                let drift = velocity_drift(
                    &self.runtime,
                    self.context.clone(),
                    gains,
                    variance,
                    seed,
                    &self.settings,
                );
                automations.velocity.entry(channel).or_default().push(drift);
            }
            Command::CancelVelocityDrift { channel } => {
                automations.velocity.remove(&channel);
            }
            Command::Crossfade { channel, from, to } => {
                // A crossfade still running on this channel is cancelled and the new one fades
                // out whatever it was moving, so no two ramps ever fight over the same gain.
                let mut gains = vec![from];
                if let Some(previous) = automations.crossfades.remove(&channel) {
                    if !previous.automation.is_finished() {
                        debug!(channel, "Taking over a running crossfade");
                        gains.extend(previous.gains.iter().copied());
                    }
                }
                debug!(channel, from = ?gains, to = ?to, "Starting crossfade");
                let automation = crossfade(
                    &self.runtime,
                    self.context.clone(),
                    gains.clone(),
                    to,
                    &self.settings,
                );
                gains.push(to);
                automations
                    .crossfades
                    .insert(channel, Fade { gains, automation });
            }
        }
    }
}

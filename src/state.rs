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
use std::{fmt, sync::Arc};

use crate::{
    audio::Param,
    graph::ChannelGraph,
    util::percent,
};

/// The discrete state of one channel.
#[derive(Clone, Debug)]
pub struct ChannelState {
    pub graph: Arc<ChannelGraph>,
    /// Volume in percent. Not validated, so it may fall outside [0, 100].
    pub volume: f32,
    pub active_variation: usize,
}

impl ChannelState {
    /// The channel gain this volume maps to.
    pub fn gain(&self) -> f32 {
        self.volume / 100.0
    }

    fn with_volume(&self, volume: f32) -> ChannelState {
        ChannelState {
            volume,
            ..self.clone()
        }
    }

    fn with_variation(&self, active_variation: usize) -> ChannelState {
        ChannelState {
            active_variation,
            ..self.clone()
        }
    }
}

/// Inputs to the state machine.
#[derive(Clone, Debug)]
pub enum Action {
    /// Attaches a freshly built graph. Every channel starts at `volume` percent.
    Mount {
        channels: Vec<ChannelGraph>,
        volume: f32,
    },
    Play,
    Stop,
    SetVolume {
        channel: usize,
        percent: f32,
    },
    SetVariation {
        channel: usize,
        variation: usize,
    },
}

/// Side effects a transition asks for. The player carries them out against the audio context.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Sets a channel gain immediately, without a ramp.
    SetChannelGain { param: Param, gain: f32 },
    /// Starts the lowpass sweep of a channel, replacing any running one.
    StartSweep {
        channel: usize,
        param: Param,
        base: f32,
        phase: f64,
    },
    CancelSweep { channel: usize },
    /// Starts every sample of a multi-sample variation, staggered.
    StaggerStart { channel: usize, variation: usize },
    StartVelocityDrift {
        channel: usize,
        variation: usize,
        gains: Vec<Param>,
        variance: f32,
    },
    /// Cancels every velocity drift of a channel.
    CancelVelocityDrift { channel: usize },
    Crossfade {
        channel: usize,
        from: Param,
        to: Param,
    },
}

/// The engine state. Transitions never mutate it; they produce a new state that shares every
/// unchanged channel with the old one.
#[derive(Clone, Debug)]
pub struct EngineState {
    pub channels: Arc<[Arc<ChannelState>]>,
    pub is_setup: bool,
    /// Latched by the first Play so multi-sample sources are only ever started once.
    pub played_once: bool,
    pub is_playing: bool,
}

impl Default for EngineState {
    fn default() -> Self {
        EngineState {
            channels: Arc::from(Vec::new()),
            is_setup: false,
            played_once: false,
            is_playing: false,
        }
    }
}

impl EngineState {
    /// Computes the state following `action` and the commands that realize it.
    ///
    /// Channel and variation indices are trusted. An index out of range panics.
    pub fn reduce(&self, action: Action) -> (EngineState, Vec<Command>) {
        match action {
            Action::Mount { channels, volume } => self.mount(channels, volume),
            Action::Play => self.play(),
            Action::Stop => self.stop(),
            Action::SetVolume { channel, percent } => self.set_volume(channel, percent),
            Action::SetVariation { channel, variation } => self.set_variation(channel, variation),
        }
    }

    fn mount(&self, channels: Vec<ChannelGraph>, volume: f32) -> (EngineState, Vec<Command>) {
        // Whatever was mounted before goes quiet and loses its automations.
        let (_, commands) = self.stop();

        let channels = channels
            .into_iter()
            .map(|graph| {
                Arc::new(ChannelState {
                    active_variation: graph.initial_variation,
                    graph: Arc::new(graph),
                    volume,
                })
            })
            .collect::<Vec<_>>();

        let state = EngineState {
            channels: Arc::from(channels),
            is_setup: true,
            played_once: false,
            is_playing: false,
        };
        (state, commands)
    }

    fn play(&self) -> (EngineState, Vec<Command>) {
        if !self.is_setup {
            return (self.clone(), Vec::new());
        }

        let mut commands = Vec::new();
        for (index, channel) in self.channels.iter().enumerate() {
            let graph = &channel.graph;
            commands.push(Command::SetChannelGain {
                param: graph.gain_param(),
                gain: channel.gain(),
            });

            if let (true, Some(lowpass)) = (graph.rules.modulate_lpf, graph.lowpass) {
                commands.push(Command::StartSweep {
                    channel: index,
                    param: Param::frequency(lowpass),
                    base: graph.base_cutoff,
                    phase: -(index as f64),
                });
            }

            if !graph.rules.multi_sample {
                continue;
            }
            if !self.played_once {
                commands.extend(
                    graph
                        .variations
                        .iter()
                        .map(|variation| Command::StaggerStart {
                            channel: index,
                            variation: variation.index,
                        }),
                );
            }
            commands.push(Command::CancelVelocityDrift { channel: index });
            commands.extend(
                graph
                    .variations
                    .iter()
                    .filter(|variation| variation.rules.velocity_variance > 0.0)
                    .map(|variation| Command::StartVelocityDrift {
                        channel: index,
                        variation: variation.index,
                        gains: variation
                            .samples
                            .iter()
                            .filter_map(|sample| sample.gain.map(Param::gain))
                            .collect(),
                        variance: variation.rules.velocity_variance,
                    }),
            );
        }

        let state = EngineState {
            is_playing: true,
            played_once: true,
            ..self.clone()
        };
        (state, commands)
    }

    fn stop(&self) -> (EngineState, Vec<Command>) {
        let mut commands = Vec::new();
        for (index, channel) in self.channels.iter().enumerate() {
            commands.push(Command::SetChannelGain {
                param: channel.graph.gain_param(),
                gain: 0.0,
            });
            commands.push(Command::CancelSweep { channel: index });
            commands.push(Command::CancelVelocityDrift { channel: index });
        }

        let state = EngineState {
            is_playing: false,
            ..self.clone()
        };
        (state, commands)
    }

    fn set_volume(&self, channel: usize, percent: f32) -> (EngineState, Vec<Command>) {
        let updated = Arc::new(self.channels[channel].with_volume(percent));
        let mut commands = Vec::new();
        if self.is_playing {
            commands.push(Command::SetChannelGain {
                param: updated.graph.gain_param(),
                gain: updated.gain(),
            });
        }
        (self.replace(channel, updated), commands)
    }

    fn set_variation(&self, channel: usize, variation: usize) -> (EngineState, Vec<Command>) {
        let current = &self.channels[channel];
        let from = current.graph.variation(current.active_variation).gain_param();
        let to = current.graph.variation(variation).gain_param();
        let updated = Arc::new(current.with_variation(variation));
        let commands = vec![Command::Crossfade { channel, from, to }];
        (self.replace(channel, updated), commands)
    }

    /// A copy of this state with one channel swapped out.
    fn replace(&self, index: usize, channel: Arc<ChannelState>) -> EngineState {
        let mut channels = self.channels.to_vec();
        channels[index] = channel;
        EngineState {
            channels: Arc::from(channels),
            ..self.clone()
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match (self.is_setup, self.is_playing) {
            (false, _) => "not ready",
            (true, false) => "stopped",
            (true, true) => "playing",
        };
        writeln!(f, "Engine ({}):", status)?;
        for (index, channel) in self.channels.iter().enumerate() {
            let graph = &channel.graph;
            let variation = graph.variation(channel.active_variation);
            writeln!(
                f,
                "  {}. {} (Volume: {}, Variation: {} [{}/{}])",
                index,
                graph.name,
                percent(channel.gain()),
                variation.name,
                channel.active_variation + 1,
                graph.variations.len(),
            )?;
        }
        Ok(())
    }
}

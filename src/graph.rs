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
use crate::audio::ContextError;

mod channel;
mod variation;

pub use channel::{build_channel, build_channels, ChannelGraph, ChannelKind, CHANNEL_COUNT};
pub use variation::{build_variation, SampleNode, Variation};

/// Static per-channel configuration, fixed at load time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlobalRules {
    /// Route the channel through the shared reverb.
    pub reverb: bool,
    /// Sweep the channel's lowpass cutoff while playing.
    pub modulate_lpf: bool,
    /// Give every sample its own gain and start them staggered.
    pub multi_sample: bool,
}

/// Static per-variation configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VariationRules {
    /// How far, in [0, 1], velocity drift may pull a sample's gain below unity.
    pub velocity_variance: f32,
}

/// Reasons the graph can't be built. All of them are fatal: nothing is mounted.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("expected {} channels, found {found}", CHANNEL_COUNT)]
    NotReady { found: usize },

    #[error("one or more samples failed to load")]
    LoadFailed,

    #[error("channel {channel}, variation {variation}: sample {sample} has no buffer")]
    MissingBuffer {
        channel: String,
        variation: String,
        sample: String,
    },

    #[error("channel {channel} has no variations")]
    EmptyChannel { channel: String },

    #[error("reverb requested but no impulse response was loaded")]
    MissingImpulse,

    #[error("audio context error: {0}")]
    Context(#[from] ContextError),
}

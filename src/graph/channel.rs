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
use std::fmt;

use rand::Rng;
use tracing::{error, info, span, warn, Level};

use super::{build_variation, GlobalRules, GraphError, Variation};
use crate::{
    assets::{Assets, ChannelAssets},
    audio::{Context, NodeId, Param},
};

/// The number of channels a session needs.
pub const CHANNEL_COUNT: usize = 4;

/// The recognized channels, in column order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    Ambience,
    Pad,
    Lead,
    Effects,
}

impl ChannelKind {
    /// Looks up a channel by its exact name. The upper-case spellings used by older libraries
    /// are accepted too.
    pub fn from_name(name: &str) -> Option<ChannelKind> {
        match name {
            "Ambience" | "AMBIENCE" => Some(ChannelKind::Ambience),
            "Pad" | "PAD" => Some(ChannelKind::Pad),
            "Lead" | "LEAD" => Some(ChannelKind::Lead),
            "Effects" | "EFFECTS" => Some(ChannelKind::Effects),
            _ => None,
        }
    }

    /// The fixed display position.
    pub fn column(&self) -> usize {
        match self {
            ChannelKind::Ambience => 0,
            ChannelKind::Pad => 1,
            ChannelKind::Lead => 2,
            ChannelKind::Effects => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::Ambience => "Ambience",
            ChannelKind::Pad => "Pad",
            ChannelKind::Lead => "Lead",
            ChannelKind::Effects => "Effects",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The static topology of one mixing bus.
#[derive(Clone, Debug)]
pub struct ChannelGraph {
    pub name: String,
    /// Display order. Unrecognized channels land in column 0.
    pub column: usize,
    pub rules: GlobalRules,
    pub variations: Vec<Variation>,
    /// Sums every variation gain.
    pub combiner: NodeId,
    /// The user-facing volume.
    pub gain: NodeId,
    pub lowpass: Option<NodeId>,
    /// The cutoff the lowpass was built at and the sweep centers on.
    pub base_cutoff: f32,
    /// The variation chosen to be audible first.
    pub initial_variation: usize,
}

impl ChannelGraph {
    pub fn gain_param(&self) -> Param {
        Param::gain(self.gain)
    }

    pub fn variation(&self, index: usize) -> &Variation {
        &self.variations[index]
    }
}

/// The name a channel is known by: the canonical spelling if recognized, the configured one
/// otherwise.
fn channel_name(assets: &ChannelAssets) -> String {
    ChannelKind::from_name(&assets.name)
        .map_or_else(|| assets.name.clone(), |kind| kind.name().to_string())
}

/// Checks everything that would stop the channel from building, so a refused build creates no
/// nodes.
fn check_channel(assets: &ChannelAssets, name: &str, impulse: bool) -> Result<(), GraphError> {
    if assets.variations.is_empty() {
        return Err(GraphError::EmptyChannel {
            channel: name.to_string(),
        });
    }
    for variation in assets.variations.iter() {
        if let Some(sample) = variation.samples.iter().find(|s| s.buffer.is_none()) {
            return Err(GraphError::MissingBuffer {
                channel: name.to_string(),
                variation: variation.name.clone(),
                sample: sample.name.clone(),
            });
        }
    }
    if assets.rules.reverb && !impulse {
        warn!(
            channel = %name,
            "Reverb requested but no impulse response was loaded"
        );
        return Err(GraphError::MissingImpulse);
    }
    Ok(())
}

/// Builds one channel: its variations, the channel combiner, the optional reverb send, the
/// channel gain and the optional lowpass.
pub fn build_channel<R: Rng>(
    context: &dyn Context,
    assets: &ChannelAssets,
    reverb: Option<NodeId>,
    rng: &mut R,
    base_cutoff: f32,
) -> Result<ChannelGraph, GraphError> {
    let name = channel_name(assets);
    let column = match ChannelKind::from_name(&assets.name) {
        Some(kind) => kind.column(),
        None => {
            error!(
                channel = %assets.name,
                "Unrecognized channel name, defaulting to column 0"
            );
            0
        }
    };

    check_channel(assets, &name, reverb.is_some())?;

    let now = context.current_time();
    let combiner = context.create_combiner();
    let variations = assets
        .variations
        .iter()
        .enumerate()
        .map(|(index, variation)| {
            let variation =
                build_variation(context, &name, index, variation, assets.rules.multi_sample)?;
            context.connect(variation.gain, combiner)?;
            Ok(variation)
        })
        .collect::<Result<Vec<_>, GraphError>>()?;

    let initial_variation = rng.gen_range(0..variations.len());
    context.set_value_at_time(variations[initial_variation].gain_param(), 1.0, now)?;

    let gain = context.create_gain();
    context.set_value_at_time(Param::gain(gain), 0.0, now)?;
    match reverb.filter(|_| assets.rules.reverb) {
        Some(reverb) => {
            context.connect(combiner, reverb)?;
            context.connect(reverb, gain)?;
        }
        None => context.connect(combiner, gain)?,
    }

    let lowpass = if assets.rules.modulate_lpf {
        let lowpass = context.create_lowpass();
        context.set_value_at_time(Param::frequency(lowpass), base_cutoff, now)?;
        context.connect(gain, lowpass)?;
        context.connect(lowpass, context.destination())?;
        Some(lowpass)
    } else {
        context.connect(gain, context.destination())?;
        None
    };

    info!(
        channel = %name,
        column,
        variations = variations.len(),
        initial_variation,
        reverb = assets.rules.reverb,
        modulate_lpf = assets.rules.modulate_lpf,
        multi_sample = assets.rules.multi_sample,
        "Built channel"
    );

    Ok(ChannelGraph {
        name,
        column,
        rules: assets.rules,
        variations,
        combiner,
        gain,
        lowpass,
        base_cutoff,
        initial_variation,
    })
}

/// Builds every channel, ordered by column. Refuses to run unless the assets are complete.
/// A single reverb is created for the whole engine, and only if some channel asks for it.
pub fn build_channels<R: Rng>(
    context: &dyn Context,
    assets: &Assets,
    rng: &mut R,
    base_cutoff: f32,
) -> Result<Vec<ChannelGraph>, GraphError> {
    let span = span!(Level::INFO, "graph");
    let _enter = span.enter();

    assets.ready()?;

    for channel in assets.channels.iter() {
        check_channel(channel, &channel_name(channel), assets.reverb.is_some())?;
    }

    let reverb = match &assets.reverb {
        Some(impulse) if assets.channels.iter().any(|channel| channel.rules.reverb) => {
            Some(context.create_convolver(impulse.clone()))
        }
        _ => None,
    };

    let mut channels = assets
        .channels
        .iter()
        .map(|channel| build_channel(context, channel, reverb, rng, base_cutoff))
        .collect::<Result<Vec<_>, GraphError>>()?;

    // Stable, so misnamed channels keep their configured order among column 0.
    channels.sort_by_key(|channel| channel.column);
    Ok(channels)
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, SeedableRng};

    use crate::audio::{mock, Context as _};
    use crate::graph::{GlobalRules, GraphError};
    use crate::testutil::{channel_assets, session_assets};

    use super::{build_channel, build_channels, ChannelKind};

    const CUTOFF: f32 = 5000.0;

    #[test]
    fn test_channel_kinds() {
        assert_eq!(Some(ChannelKind::Pad), ChannelKind::from_name("Pad"));
        assert_eq!(Some(ChannelKind::Effects), ChannelKind::from_name("EFFECTS"));
        assert_eq!(None, ChannelKind::from_name("pad"));
        assert_eq!(None, ChannelKind::from_name("Bass"));
        assert_eq!(2, ChannelKind::Lead.column());
        assert_eq!("Ambience", ChannelKind::Ambience.to_string());
    }

    #[test]
    fn test_mount_state() -> Result<(), GraphError> {
        let context = mock::Context::new("mock", 44100);
        let mut rng = StdRng::seed_from_u64(3);
        let channels = build_channels(&context, &session_assets(), &mut rng, CUTOFF)?;

        for channel in channels.iter() {
            assert_eq!(0.0, context.gain(channel.gain));
            let gains: Vec<f32> = channel
                .variations
                .iter()
                .map(|v| context.gain(v.gain))
                .collect();
            assert_eq!(1, gains.iter().filter(|g| **g == 1.0).count());
            assert_eq!(gains.len() - 1, gains.iter().filter(|g| **g == 0.0).count());
            assert_eq!(1.0, gains[channel.initial_variation]);
        }
        Ok(())
    }

    #[test]
    fn test_channels_sorted_by_column() -> Result<(), GraphError> {
        let context = mock::Context::new("mock", 44100);
        let mut assets = session_assets();
        assets.channels.reverse();
        assets.channels.swap(0, 2);

        let channels = build_channels(&context, &assets, &mut StdRng::seed_from_u64(0), CUTOFF)?;
        let names: Vec<&str> = channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(vec!["Ambience", "Pad", "Lead", "Effects"], names);
        let columns: Vec<usize> = channels.iter().map(|c| c.column).collect();
        assert_eq!(vec![0, 1, 2, 3], columns);
        Ok(())
    }

    #[test]
    fn test_seeded_selection_is_deterministic() -> Result<(), GraphError> {
        let pick = |seed| -> Result<Vec<usize>, GraphError> {
            let context = mock::Context::new("mock", 44100);
            let channels = build_channels(
                &context,
                &session_assets(),
                &mut StdRng::seed_from_u64(seed),
                CUTOFF,
            )?;
            Ok(channels.iter().map(|c| c.initial_variation).collect())
        };
        assert_eq!(pick(42)?, pick(42)?);
        Ok(())
    }

    #[test]
    fn test_routing() -> Result<(), GraphError> {
        let context = mock::Context::new("mock", 44100);
        let channels = build_channels(
            &context,
            &session_assets(),
            &mut StdRng::seed_from_u64(1),
            CUTOFF,
        )?;
        let destination = context.destination();

        // Ambience: reverb and lowpass.
        let ambience = &channels[0];
        let reverb = context.outputs(ambience.combiner)[0];
        assert!(matches!(
            context.kind(reverb),
            Some(mock::NodeKind::Convolver)
        ));
        assert!(context.inputs(ambience.gain).contains(&reverb));
        let lowpass = ambience.lowpass.expect("ambience has a lowpass");
        assert_eq!(CUTOFF, context.frequency(lowpass));
        assert_eq!(vec![ambience.gain], context.inputs(lowpass));
        assert_eq!(vec![destination], context.outputs(lowpass));

        // Pad: reverb only. The reverb is shared.
        let pad = &channels[1];
        assert_eq!(vec![reverb], context.outputs(pad.combiner));
        assert!(pad.lowpass.is_none());
        assert_eq!(vec![destination], context.outputs(pad.gain));

        // Lead: dry, straight through.
        let lead = &channels[2];
        assert_eq!(vec![lead.combiner], context.inputs(lead.gain));
        assert_eq!(vec![destination], context.outputs(lead.gain));

        let convolvers = (0..context.node_count())
            .filter(|i| {
                matches!(
                    context.kind(crate::audio::NodeId(*i)),
                    Some(mock::NodeKind::Convolver)
                )
            })
            .count();
        assert_eq!(1, convolvers);
        Ok(())
    }

    #[test]
    fn test_not_ready() {
        let context = mock::Context::new("mock", 44100);
        let mut rng = StdRng::seed_from_u64(0);

        let mut assets = session_assets();
        assets.channels.pop();
        assert!(matches!(
            build_channels(&context, &assets, &mut rng, CUTOFF),
            Err(GraphError::NotReady { found: 3 })
        ));

        let mut assets = session_assets();
        assets.load_failed = true;
        assert!(matches!(
            build_channels(&context, &assets, &mut rng, CUTOFF),
            Err(GraphError::LoadFailed)
        ));

        let mut assets = session_assets();
        assets.reverb = None;
        assert!(matches!(
            build_channels(&context, &assets, &mut rng, CUTOFF),
            Err(GraphError::MissingImpulse)
        ));

        // The broken sample belongs to the last channel, so a build that validated as it went
        // would already have built the other three.
        let mut assets = session_assets();
        assets.channels[3].variations[0].samples[0].buffer = None;
        match build_channels(&context, &assets, &mut rng, CUTOFF) {
            Err(GraphError::MissingBuffer {
                channel,
                variation,
                sample,
            }) => {
                assert_eq!("Pad", channel);
                assert_eq!(assets.channels[3].variations[0].name, variation);
                assert_eq!(assets.channels[3].variations[0].samples[0].name, sample);
            }
            other => panic!("unexpected result {:?}", other.map(|c| c.len())),
        }

        let mut assets = session_assets();
        assets.channels[3].variations.clear();
        assert!(matches!(
            build_channels(&context, &assets, &mut rng, CUTOFF),
            Err(GraphError::EmptyChannel { channel }) if channel == "Pad"
        ));

        // Refused attempts create no nodes.
        assert_eq!(1, context.node_count());
    }

    #[test]
    fn test_reverb_without_impulse() {
        let context = mock::Context::new("mock", 44100);
        let mut rng = StdRng::seed_from_u64(0);
        let assets = channel_assets(
            "Pad",
            GlobalRules {
                reverb: true,
                ..Default::default()
            },
            2,
            1,
        );
        assert!(matches!(
            build_channel(&context, &assets, None, &mut rng, CUTOFF),
            Err(GraphError::MissingImpulse)
        ));
        assert_eq!(1, context.node_count());
    }

    #[test]
    fn test_unrecognized_name_defaults_to_column_zero() -> Result<(), GraphError> {
        let context = mock::Context::new("mock", 44100);
        let mut rng = StdRng::seed_from_u64(0);
        let assets = channel_assets("Bass", GlobalRules::default(), 2, 1);
        let channel = build_channel(&context, &assets, None, &mut rng, CUTOFF)?;
        assert_eq!("Bass", channel.name);
        assert_eq!(0, channel.column);

        let empty = channel_assets("Pad", GlobalRules::default(), 0, 1);
        assert!(matches!(
            build_channel(&context, &empty, None, &mut rng, CUTOFF),
            Err(GraphError::EmptyChannel { .. })
        ));
        Ok(())
    }
}

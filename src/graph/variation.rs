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
use std::sync::Arc;

use tracing::{debug, warn};

use super::{GraphError, VariationRules};
use crate::{
    assets::VariationAssets,
    audio::{Context, NodeId, Param, SampleBuffer},
};

/// One decoded buffer bound to a playback node.
#[derive(Clone, Debug)]
pub struct SampleNode {
    pub name: String,
    pub buffer: Arc<SampleBuffer>,
    /// The looping source playing the buffer.
    pub source: NodeId,
    /// Per-sample gain. Only multi-sample channels have one.
    pub gain: Option<NodeId>,
}

/// A named alternative rendering of a channel.
#[derive(Clone, Debug)]
pub struct Variation {
    /// Position within the channel.
    pub index: usize,
    pub name: String,
    pub rules: VariationRules,
    pub samples: Vec<SampleNode>,
    /// Sums every sample of the variation.
    pub combiner: NodeId,
    /// The variation gain, the only thing crossfades touch.
    pub gain: NodeId,
}

impl Variation {
    pub fn gain_param(&self) -> Param {
        Param::gain(self.gain)
    }
}

/// Builds the nodes for one variation: sample sources into a combiner into a muted gain.
///
/// Multi-sample variations get a gain per sample and their sources are left unstarted for the
/// staggered start. Otherwise every source loops and starts immediately at time zero.
pub fn build_variation(
    context: &dyn Context,
    channel: &str,
    index: usize,
    assets: &VariationAssets,
    multi_sample: bool,
) -> Result<Variation, GraphError> {
    if !multi_sample && assets.samples.len() > 1 {
        warn!(
            channel,
            variation = %assets.name,
            samples = assets.samples.len(),
            "Variation of a single-sample channel has more than one sample, all will loop together"
        );
    }

    let buffers = assets
        .samples
        .iter()
        .map(|sample| {
            sample
                .buffer
                .clone()
                .ok_or_else(|| GraphError::MissingBuffer {
                    channel: channel.to_string(),
                    variation: assets.name.clone(),
                    sample: sample.name.clone(),
                })
        })
        .collect::<Result<Vec<_>, GraphError>>()?;

    let combiner = context.create_combiner();
    let now = context.current_time();

    let mut samples = Vec::with_capacity(assets.samples.len());
    for (sample, buffer) in assets.samples.iter().zip(buffers) {
        let source = context.create_buffer_source(buffer.clone(), true);
        let gain = if multi_sample {
            let gain = context.create_gain();
            context.set_value_at_time(Param::gain(gain), 1.0, now)?;
            context.connect(source, gain)?;
            context.connect(gain, combiner)?;
            Some(gain)
        } else {
            context.connect(source, combiner)?;
            context.start(source, 0.0)?;
            None
        };

        debug!(
            channel,
            variation = %assets.name,
            sample = %sample.name,
            %source,
            "Built sample node"
        );
        samples.push(SampleNode {
            name: sample.name.clone(),
            buffer,
            source,
            gain,
        });
    }

    let gain = context.create_gain();
    context.set_value_at_time(Param::gain(gain), 0.0, now)?;
    context.connect(combiner, gain)?;

    Ok(Variation {
        index,
        name: assets.name.clone(),
        rules: assets.rules,
        samples,
        combiner,
        gain,
    })
}

#[cfg(test)]
mod test {
    use crate::assets::{SampleAsset, VariationAssets};
    use crate::audio::mock::{self, NodeKind};
    use crate::audio::Context as _;
    use crate::graph::{GraphError, VariationRules};
    use crate::testutil::buffer;

    use super::build_variation;

    fn assets(samples: &[&str]) -> VariationAssets {
        VariationAssets {
            name: "dawn".to_string(),
            rules: VariationRules::default(),
            samples: samples
                .iter()
                .map(|name| SampleAsset {
                    name: name.to_string(),
                    buffer: Some(buffer()),
                })
                .collect(),
        }
    }

    #[test]
    fn test_single_sample_loops_from_zero() -> Result<(), GraphError> {
        let context = mock::Context::new("mock", 44100);
        context.set_time(2.0);
        let variation = build_variation(&context, "Pad", 1, &assets(&["drone"]), false)?;

        assert_eq!(1, variation.index);
        assert_eq!(1, variation.samples.len());
        let sample = &variation.samples[0];
        assert_eq!("drone", sample.name);
        assert!(sample.gain.is_none());
        assert!(matches!(
            context.kind(sample.source),
            Some(NodeKind::BufferSource { looping: true, .. })
        ));
        assert_eq!(vec![sample.source], context.inputs(variation.combiner));
        assert_eq!(vec![variation.combiner], context.inputs(variation.gain));
        assert_eq!(vec![(sample.source, 0.0)], context.starts());
        assert_eq!(0.0, context.gain(variation.gain));
        Ok(())
    }

    #[test]
    fn test_multi_sample_gets_gains_and_waits() -> Result<(), GraphError> {
        let context = mock::Context::new("mock", 44100);
        let variation = build_variation(&context, "Effects", 0, &assets(&["a", "b", "c"]), true)?;

        assert_eq!(3, variation.samples.len());
        for sample in variation.samples.iter() {
            let gain = sample.gain.expect("multi-sample nodes have a gain");
            assert_eq!(1.0, context.gain(gain));
            assert_eq!(vec![sample.source], context.inputs(gain));
            assert!(context.inputs(variation.combiner).contains(&gain));
            assert!(!context.is_started(sample.source));
        }
        assert!(context.starts().is_empty());
        assert_eq!(0.0, context.gain(variation.gain));
        Ok(())
    }

    #[test]
    fn test_missing_buffer_is_fatal() {
        let context = mock::Context::new("mock", 44100);
        let mut assets = assets(&["a", "b"]);
        assets.samples[1].buffer = None;

        match build_variation(&context, "Lead", 0, &assets, false) {
            Err(GraphError::MissingBuffer {
                channel,
                variation,
                sample,
            }) => {
                assert_eq!("Lead", channel);
                assert_eq!("dawn", variation);
                assert_eq!("b", sample);
            }
            other => panic!("unexpected result {:?}", other.map(|v| v.name)),
        }
        // Only the destination exists.
        assert_eq!(1, context.node_count());
    }

    #[test]
    fn test_gain_muted_at_construction_time() {
        let context = mock::Context::new("mock", 44100);
        context.set_time(7.5);
        let variation = build_variation(&context, "Pad", 0, &assets(&["x"]), false).unwrap();
        assert!(context.events().iter().any(|event| matches!(
            event,
            mock::Event::SetValue { param, value, when }
                if *param == variation.gain_param() && *value == 0.0 && *when == 7.5
        )));
        assert_eq!(7.5, context.current_time());
    }
}

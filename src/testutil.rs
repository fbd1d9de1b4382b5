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
use std::{error::Error, fs::File, future::Future, path::Path, sync::Arc, time::Duration};

use hound::{SampleFormat, WavSpec, WavWriter};
use tokio::time::Instant;

use crate::{
    assets::{Assets, ChannelAssets, SampleAsset, VariationAssets},
    audio::SampleBuffer,
    graph::{GlobalRules, VariationRules},
};

/// Wait for the given async predicate to return true or fail. Runs on tokio time, so it works
/// with a paused clock.
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(10);

    loop {
        if start.elapsed() > timeout {
            panic!("{}", error_msg);
        }
        if predicate().await {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

/// Writes interleaved float samples to a wav file.
pub fn write_wav(
    path: &Path,
    channels: u16,
    sample_rate: u32,
    samples: &[f32],
) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// A short mono buffer.
pub fn buffer() -> Arc<SampleBuffer> {
    Arc::new(SampleBuffer::new(vec![vec![0.5; 64]], 44100))
}

/// A channel with `variations` variations of `samples` samples each.
pub fn channel_assets(
    name: &str,
    rules: GlobalRules,
    variations: usize,
    samples: usize,
) -> ChannelAssets {
    ChannelAssets {
        name: name.to_string(),
        rules,
        variations: (0..variations)
            .map(|v| VariationAssets {
                name: format!("{}-{}", name.to_lowercase(), v),
                rules: VariationRules::default(),
                samples: (0..samples)
                    .map(|s| SampleAsset {
                        name: format!("sample-{}", s),
                        buffer: Some(buffer()),
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// A complete session, deliberately out of column order.
///
/// - Ambience: reverb and a swept lowpass, 2 variations.
/// - Pad: reverb, 3 variations.
/// - Lead: dry, 2 variations.
/// - Effects: multi-sample, 2 variations of 3 samples. The first one drifts.
pub fn session_assets() -> Assets {
    let mut effects = channel_assets(
        "Effects",
        GlobalRules {
            multi_sample: true,
            ..Default::default()
        },
        2,
        3,
    );
    effects.variations[0].rules.velocity_variance = 0.3;

    Assets {
        channels: vec![
            channel_assets("Lead", GlobalRules::default(), 2, 1),
            effects,
            channel_assets(
                "Ambience",
                GlobalRules {
                    reverb: true,
                    modulate_lpf: true,
                    ..Default::default()
                },
                2,
                1,
            ),
            channel_assets(
                "Pad",
                GlobalRules {
                    reverb: true,
                    ..Default::default()
                },
                3,
                1,
            ),
        ],
        reverb: Some(buffer()),
        load_failed: false,
    }
}

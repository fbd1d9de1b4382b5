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
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{error, info, span, Level};

use crate::{
    audio::{decode::decode_file, SampleBuffer},
    config,
    graph::{GlobalRules, GraphError, VariationRules, CHANNEL_COUNT},
    util::sample_name,
};

/// A decoded sample and the name it's displayed under.
#[derive(Clone, Debug)]
pub struct SampleAsset {
    pub name: String,
    /// None if the sample failed to load.
    pub buffer: Option<Arc<SampleBuffer>>,
}

#[derive(Clone, Debug)]
pub struct VariationAssets {
    pub name: String,
    pub rules: VariationRules,
    pub samples: Vec<SampleAsset>,
}

#[derive(Clone, Debug)]
pub struct ChannelAssets {
    pub name: String,
    pub rules: GlobalRules,
    pub variations: Vec<VariationAssets>,
}

/// Everything the graph builders need, decoded and in memory.
#[derive(Clone, Debug, Default)]
pub struct Assets {
    pub channels: Vec<ChannelAssets>,
    /// Impulse response for the shared reverb.
    pub reverb: Option<Arc<SampleBuffer>>,
    /// Set if any sample or the impulse failed to load.
    pub load_failed: bool,
}

impl Assets {
    /// Fails unless every file loaded and there are exactly as many channels as a session needs.
    pub fn ready(&self) -> Result<(), GraphError> {
        if self.load_failed {
            return Err(GraphError::LoadFailed);
        }
        if self.channels.len() != CHANNEL_COUNT {
            return Err(GraphError::NotReady {
                found: self.channels.len(),
            });
        }
        Ok(())
    }

    /// True if the graph can be built from these assets.
    pub fn is_ready(&self) -> bool {
        self.ready().is_ok()
    }
}

/// Decodes files, remembering what it has already decoded.
#[derive(Default)]
struct Loader {
    cache: HashMap<PathBuf, Option<Arc<SampleBuffer>>>,
    failed: bool,
}

impl Loader {
    fn load(&mut self, path: &Path) -> Option<Arc<SampleBuffer>> {
        if let Some(buffer) = self.cache.get(path) {
            if buffer.is_none() {
                self.failed = true;
            }
            return buffer.clone();
        }

        let buffer = match decode_file(path) {
            Ok(buffer) => Some(Arc::new(buffer)),
            Err(e) => {
                error!(err = %e, "Unable to load sample");
                self.failed = true;
                None
            }
        };
        self.cache.insert(path.to_path_buf(), buffer.clone());
        buffer
    }
}

/// Loads every sample the library references. Failures are logged and reported through
/// `load_failed` rather than aborting, so the caller sees the whole picture at once.
pub fn load(library: &config::Library) -> Assets {
    let span = span!(Level::INFO, "assets");
    let _enter = span.enter();

    let mut loader = Loader::default();
    let channels = library
        .channels()
        .iter()
        .map(|channel| ChannelAssets {
            name: channel.name().to_string(),
            rules: channel.rules(),
            variations: channel
                .variations()
                .iter()
                .map(|variation| {
                    let rules = variation.rules().unwrap_or_else(|e| {
                        error!(
                            channel = channel.name(),
                            variation = variation.name(),
                            err = %e,
                            "Invalid variation rules"
                        );
                        loader.failed = true;
                        VariationRules::default()
                    });
                    VariationAssets {
                        name: variation.name().to_string(),
                        rules,
                        samples: variation
                            .samples()
                            .iter()
                            .map(|sample| {
                                let path = library.resolve(sample);
                                SampleAsset {
                                    name: sample_name(&path).to_string(),
                                    buffer: loader.load(&path),
                                }
                            })
                            .collect(),
                    }
                })
                .collect(),
        })
        .collect::<Vec<_>>();

    let reverb = library
        .reverb_impulse()
        .and_then(|path| loader.load(&path));

    info!(
        channels = channels.len(),
        decoded = loader.cache.len(),
        failed = loader.failed,
        "Loaded assets"
    );

    Assets {
        channels,
        reverb,
        load_failed: loader.failed,
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs, sync::Arc};

    use crate::config::Library;
    use crate::testutil::write_wav;

    use super::load;

    #[test]
    fn test_load_library() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        write_wav(&dir.path().join("drone.wav"), 1, 44100, &[0.25; 16])?;
        write_wav(&dir.path().join("hall.wav"), 2, 44100, &[0.5; 8])?;
        fs::write(
            dir.path().join("library.yaml"),
            r#"
reverb_impulse: hall.wav
channels:
  - name: Ambience
    rules:
      reverb: true
    variations:
      - name: one
        samples: [drone.wav]
      - name: two
        samples: [drone.wav]
"#,
        )?;

        let assets = load(&Library::deserialize(&dir.path().join("library.yaml"))?);
        assert!(!assets.load_failed);
        // Only one channel, so not ready.
        assert!(!assets.is_ready());
        assert_eq!(1, assets.channels.len());

        let channel = &assets.channels[0];
        assert!(channel.rules.reverb);
        assert_eq!("drone", channel.variations[0].samples[0].name);

        // The same file decodes once and is shared.
        let first = channel.variations[0].samples[0].buffer.clone().unwrap();
        let second = channel.variations[1].samples[0].buffer.clone().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(16, first.frames());
        assert_eq!(2, assets.reverb.unwrap().channel_count());
        Ok(())
    }

    #[test]
    fn test_missing_samples_fail_the_load() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        write_wav(&dir.path().join("drone.wav"), 1, 44100, &[0.25; 16])?;
        fs::write(
            dir.path().join("library.yaml"),
            r#"
channels:
  - name: Pad
    variations:
      - name: one
        samples: [drone.wav, missing.wav]
"#,
        )?;

        let assets = load(&Library::deserialize(&dir.path().join("library.yaml"))?);
        assert!(assets.load_failed);
        assert!(!assets.is_ready());
        let samples = &assets.channels[0].variations[0].samples;
        assert!(samples[0].buffer.is_some());
        assert_eq!("missing", samples[1].name);
        assert!(samples[1].buffer.is_none());
        Ok(())
    }
}

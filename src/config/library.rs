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
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;
use crate::graph::{GlobalRules, VariationRules};

/// The channel rules as written in YAML.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
struct ChannelRules {
    reverb: bool,
    modulate_lpf: bool,
    multi_sample: bool,
}

/// The variation rules as written in YAML.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
struct VariationRuleSet {
    velocity_variance: f32,
}

/// One variation of a channel.
#[derive(Deserialize, Clone, Debug)]
pub struct Variation {
    name: String,
    #[serde(default)]
    rules: VariationRuleSet,
    /// Sample files, relative to the library file.
    samples: Vec<String>,
}

impl Variation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> Result<VariationRules, ConfigError> {
        let variance = self.rules.velocity_variance;
        if !(0.0..=1.0).contains(&variance) {
            return Err(ConfigError::Invalid {
                field: "velocity_variance",
                reason: format!("{} is not in [0, 1]", variance),
            });
        }
        Ok(VariationRules {
            velocity_variance: variance,
        })
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }
}

/// One channel of the library.
#[derive(Deserialize, Clone, Debug)]
pub struct Channel {
    name: String,
    #[serde(default)]
    rules: ChannelRules,
    variations: Vec<Variation>,
}

impl Channel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> GlobalRules {
        GlobalRules {
            reverb: self.rules.reverb,
            modulate_lpf: self.rules.modulate_lpf,
            multi_sample: self.rules.multi_sample,
        }
    }

    pub fn variations(&self) -> &[Variation] {
        &self.variations
    }
}

/// The sample library: every channel, its variations and their sample files.
#[derive(Deserialize, Clone, Debug)]
pub struct Library {
    /// Impulse response for the shared reverb, relative to the library file.
    reverb_impulse: Option<String>,
    channels: Vec<Channel>,

    /// The directory the library file lives in.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Library {
    /// Parse a library from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Library, ConfigError> {
        let mut library = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Library>()?;
        library.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(library)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// The resolved path of the reverb impulse, if one is configured.
    pub fn reverb_impulse(&self) -> Option<PathBuf> {
        self.reverb_impulse.as_ref().map(|path| self.resolve(path))
    }

    /// Resolves a path from the library against the library's directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs, path::PathBuf};

    use super::Library;
    use crate::config::ConfigError;

    #[test]
    fn test_deserialize() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("library.yaml");
        fs::write(
            &path,
            r#"
reverb_impulse: impulses/hall.wav
channels:
  - name: Pad
    rules:
      reverb: true
      modulate_lpf: true
    variations:
      - name: warm
        samples: [pad/warm.wav]
  - name: Effects
    rules:
      multi_sample: true
    variations:
      - name: birds
        rules:
          velocity_variance: 0.3
        samples: [fx/a.wav, fx/b.wav]
"#,
        )?;

        let library = Library::deserialize(&path)?;
        assert_eq!(2, library.channels().len());
        assert_eq!(
            Some(dir.path().join("impulses/hall.wav")),
            library.reverb_impulse()
        );

        let pad = &library.channels()[0];
        assert_eq!("Pad", pad.name());
        assert!(pad.rules().reverb);
        assert!(pad.rules().modulate_lpf);
        assert!(!pad.rules().multi_sample);
        assert_eq!(0.0, pad.variations()[0].rules()?.velocity_variance);

        let effects = &library.channels()[1];
        assert!(effects.rules().multi_sample);
        assert_eq!(0.3, effects.variations()[0].rules()?.velocity_variance);
        assert_eq!(
            dir.path().join("fx/b.wav"),
            library.resolve(&effects.variations()[0].samples()[1])
        );
        Ok(())
    }

    #[test]
    fn test_invalid_variance() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("library.yaml");
        fs::write(
            &path,
            r#"
channels:
  - name: Lead
    variations:
      - name: loud
        rules:
          velocity_variance: 2
        samples: [a.wav]
"#,
        )?;

        let library = Library::deserialize(&path)?;
        assert!(library.reverb_impulse().is_none());
        assert!(matches!(
            library.channels()[0].variations()[0].rules(),
            Err(ConfigError::Invalid {
                field: "velocity_variance",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Library::deserialize(&PathBuf::from("/nonexistent/library.yaml")),
            Err(ConfigError::Load(_))
        ));
    }
}

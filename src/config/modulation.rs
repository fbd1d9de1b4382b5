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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::modulation::Settings;

/// A YAML representation of the modulation timings. Anything left out keeps its default.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Modulation {
    /// Time between crossfade steps, e.g. "30ms".
    crossfade_tick: Option<String>,
    /// Gain moved per crossfade step.
    crossfade_step: Option<f32>,
    /// Time between lowpass sweep updates.
    sweep_tick: Option<String>,
    /// Phase advanced per sweep update, in radians.
    sweep_rate: Option<f64>,
    /// Sweep amplitude in Hz.
    sweep_depth: Option<f32>,
    /// Cutoff the sweep centers on, in Hz.
    base_cutoff: Option<f32>,
    /// Start offset between consecutive samples of a multi-sample variation.
    stagger_interval: Option<String>,
    /// Time between velocity drift updates.
    velocity_tick: Option<String>,
}

fn parse_duration(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => DurationString::from_string(value.clone())
            .map(Into::into)
            .map_err(|e| ConfigError::Duration {
                field,
                value: value.clone(),
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}

fn parse_tick(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let tick = parse_duration(field, value, default)?;
    if tick.is_zero() {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(tick)
}

impl Modulation {
    /// Resolves the configured timings against the defaults.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let defaults = Settings::default();
        let crossfade_step = self.crossfade_step.unwrap_or(defaults.crossfade_step);
        if !(crossfade_step > 0.0 && crossfade_step <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "crossfade_step",
                reason: format!("{} is not in (0, 1]", crossfade_step),
            });
        }

        Ok(Settings {
            crossfade_tick: parse_tick(
                "crossfade_tick",
                &self.crossfade_tick,
                defaults.crossfade_tick,
            )?,
            crossfade_step,
            sweep_tick: parse_tick("sweep_tick", &self.sweep_tick, defaults.sweep_tick)?,
            sweep_rate: self.sweep_rate.unwrap_or(defaults.sweep_rate),
            sweep_depth: self.sweep_depth.unwrap_or(defaults.sweep_depth),
            base_cutoff: self.base_cutoff.unwrap_or(defaults.base_cutoff),
            stagger_interval: parse_duration(
                "stagger_interval",
                &self.stagger_interval,
                defaults.stagger_interval,
            )?,
            velocity_tick: parse_tick(
                "velocity_tick",
                &self.velocity_tick,
                defaults.velocity_tick,
            )?,
        })
    }
}

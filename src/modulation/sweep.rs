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

use tokio::runtime::Handle;
use tracing::warn;

use super::{ticker, Automation, Settings};
use crate::audio::{Context, Param};

/// The cutoff a sweep writes at the given phase.
pub fn sweep_cutoff(base: f32, depth: f32, phase: f64) -> f32 {
    base + (phase.sin() as f32) * depth
}

/// Sweeps a lowpass cutoff sinusoidally around `base` until cancelled. The first tick writes
/// the cutoff at `phase`, every later tick advances the phase by the configured rate.
///
/// Channels pass the negative of their index as the phase so that siblings never sweep in
/// lockstep.
pub fn sweep(
    runtime: &Handle,
    context: Arc<dyn Context>,
    param: Param,
    base: f32,
    phase: f64,
    settings: &Settings,
) -> Automation {
    let tick = settings.sweep_tick;
    let rate = settings.sweep_rate;
    let depth = settings.sweep_depth;
    Automation::spawn(runtime, "sweep", move |cancel| async move {
        let mut phase = phase;
        let mut interval = ticker(tick);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    let cutoff = sweep_cutoff(base, depth, phase);
                    if let Err(e) = context.set_value_at_time(param, cutoff, context.current_time()) {
                        warn!(err = %e, param = ?param, "Lowpass sweep stopped");
                        return;
                    }
                    phase += rate;
                }
            }
        }
    })
}

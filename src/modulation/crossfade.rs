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
use tracing::{debug, warn};

use super::{ticker, Automation, Settings};
use crate::audio::{Context, ContextError, Param};

/// Gain below which the outgoing ramp is done.
const SILENT: f32 = 0.01;
/// Gain above which the incoming ramp is done.
const FULL: f32 = 0.99;

/// One direction of a crossfade.
struct Ramp {
    param: Param,
    step: f32,
    done: bool,
}

impl Ramp {
    /// Moves the gain one step, reading back what the context holds now. Returns true once the
    /// ramp has crossed its threshold.
    fn tick(&mut self, context: &dyn Context) -> Result<bool, ContextError> {
        if self.done {
            return Ok(true);
        }
        let gain = (context.value(self.param)? + self.step).clamp(0.0, 1.0);
        context.set_value_at_time(self.param, gain, context.current_time())?;
        self.done = if self.step < 0.0 {
            gain < SILENT
        } else {
            gain > FULL
        };
        Ok(self.done)
    }
}

/// Fades every gain in `from` out and `to` in, one step per tick. Each ramp stops on its own
/// once it crosses its threshold; the automation ends when all of them have. `to` is never
/// faded out, so a fade with nothing else to fade out leaves everything untouched.
pub fn crossfade(
    runtime: &Handle,
    context: Arc<dyn Context>,
    from: Vec<Param>,
    to: Param,
    settings: &Settings,
) -> Automation {
    let mut outgoing: Vec<Param> = Vec::with_capacity(from.len());
    for param in from {
        if param != to && !outgoing.contains(&param) {
            outgoing.push(param);
        }
    }
    let from = outgoing;
    let tick = settings.crossfade_tick;
    let step = settings.crossfade_step;
    Automation::spawn(runtime, "crossfade", move |cancel| async move {
        if from.is_empty() {
            debug!(param = ?to, "Nothing to fade out");
            return;
        }

        let mut fade_outs: Vec<Ramp> = from
            .iter()
            .map(|param| Ramp {
                param: *param,
                step: -step,
                done: false,
            })
            .collect();
        let mut fade_in = Ramp {
            param: to,
            step,
            done: false,
        };
        let mut interval = ticker(tick);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    match tick_all(context.as_ref(), &mut fade_outs, &mut fade_in) {
                        Ok(true) => {
                            debug!(from = ?from, to = ?to, "Crossfade complete");
                            return;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            warn!(err = %e, "Crossfade stopped");
                            return;
                        }
                    }
                }
            }
        }
    })
}

/// Ticks every ramp once. Returns true when all of them are done.
fn tick_all(
    context: &dyn Context,
    fade_outs: &mut [Ramp],
    fade_in: &mut Ramp,
) -> Result<bool, ContextError> {
    let mut done = fade_in.tick(context)?;
    for ramp in fade_outs.iter_mut() {
        done &= ramp.tick(context)?;
    }
    Ok(done)
}

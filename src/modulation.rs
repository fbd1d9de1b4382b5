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
// Time-based automations. Each one runs as its own task on a tokio runtime, ticking on a wall
// clock that is independent of the audio render clock, and writes parameters through the
// context at the context's current time.
//
use std::{future::Future, time::Duration};

use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};

use crate::playsync::CancelHandle;

mod crossfade;
mod stagger;
mod sweep;
mod velocity;

pub use crossfade::crossfade;
pub use stagger::stagger_start;
pub use sweep::{sweep, sweep_cutoff};
pub use velocity::velocity_drift;

/// Timings and depths of every automation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settings {
    /// Time between crossfade steps.
    pub crossfade_tick: Duration,
    /// Gain moved per crossfade step.
    pub crossfade_step: f32,
    /// Time between lowpass sweep updates.
    pub sweep_tick: Duration,
    /// Phase advanced per sweep update, in radians.
    pub sweep_rate: f64,
    /// Sweep amplitude in Hz.
    pub sweep_depth: f32,
    /// Cutoff the lowpass is built at and the sweep centers on, in Hz.
    pub base_cutoff: f32,
    /// Start offset between consecutive samples of a multi-sample variation.
    pub stagger_interval: Duration,
    /// Time between velocity drift updates.
    pub velocity_tick: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            crossfade_tick: Duration::from_millis(30),
            crossfade_step: 0.01,
            sweep_tick: Duration::from_millis(100),
            sweep_rate: 0.006,
            sweep_depth: 4900.0,
            base_cutoff: 5000.0,
            stagger_interval: Duration::from_secs(10),
            velocity_tick: Duration::from_secs(2),
        }
    }
}

/// A running automation. Dropping it cancels the automation.
pub struct Automation {
    name: &'static str,
    cancel: CancelHandle,
    join: JoinHandle<()>,
}

impl Automation {
    /// Spawns the automation produced by `f` onto the runtime.
    pub(crate) fn spawn<F, Fut>(runtime: &Handle, name: &'static str, f: F) -> Automation
    where
        F: FnOnce(CancelHandle) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancelHandle::new();
        let join = runtime.spawn(f(cancel.clone()));
        Automation { name, cancel, join }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Asks the automation to stop. It stops before its next tick.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the automation's task has exited, whether it converged or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the automation's task to exit.
    pub async fn wait(&mut self) {
        if self.join.is_finished() {
            return;
        }
        let _ = (&mut self.join).await;
    }
}

impl Drop for Automation {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// An interval whose first tick is one period from now. Late ticks are pushed back rather
/// than bunched up.
pub(crate) fn ticker(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

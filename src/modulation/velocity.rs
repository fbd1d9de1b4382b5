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

use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::runtime::Handle;
use tracing::warn;

use super::{ticker, Automation, Settings};
use crate::audio::{Context, Param};

/// Keeps the per-sample gains of a multi-sample variation moving. Every tick, each gain is set
/// to `1 - r * variance` for a fresh uniform `r` in [0, 1).
pub fn velocity_drift(
    runtime: &Handle,
    context: Arc<dyn Context>,
    gains: Vec<Param>,
    variance: f32,
    seed: u64,
    settings: &Settings,
) -> Automation {
    let tick = settings.velocity_tick;
    Automation::spawn(runtime, "velocity", move |cancel| async move {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut interval = ticker(tick);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    let now = context.current_time();
                    for param in gains.iter() {
                        let velocity = 1.0 - rng.gen::<f32>() * variance;
                        if let Err(e) = context.set_value_at_time(*param, velocity, now) {
                            warn!(err = %e, param = ?param, "Velocity drift stopped");
                            return;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use tokio::runtime::Handle;

    use crate::audio::{mock, Context, Param};
    use crate::modulation::Settings;

    use super::velocity_drift;

    #[tokio::test(start_paused = true)]
    async fn test_drift_stays_within_variance() {
        let context = Arc::new(mock::Context::new("mock", 44100));
        let gains: Vec<_> = (0..3).map(|_| Param::gain(context.create_gain())).collect();
        let automation = velocity_drift(
            &Handle::current(),
            context.clone(),
            gains.clone(),
            0.4,
            7,
            &Settings::default(),
        );

        // Five ticks at 2s.
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        for param in gains.iter() {
            let history = context.history(*param);
            assert_eq!(5, history.len());
            assert!(history.iter().all(|v| *v > 0.6 && *v <= 1.0));
            assert!(history.windows(2).any(|w| w[0] != w[1]));
        }

        automation.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(automation.is_finished());
        assert_eq!(5, context.history(gains[0]).len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drift_is_seeded() {
        let run = |seed| async move {
            let context = Arc::new(mock::Context::new("mock", 44100));
            let param = Param::gain(context.create_gain());
            let _automation = velocity_drift(
                &Handle::current(),
                context.clone(),
                vec![param],
                0.5,
                seed,
                &Settings::default(),
            );
            tokio::time::sleep(Duration::from_millis(6_500)).await;
            context.history(param)
        };

        let first = run(3).await;
        assert_eq!(3, first.len());
        assert_eq!(first, run(3).await);
        assert_ne!(first, run(4).await);
    }
}

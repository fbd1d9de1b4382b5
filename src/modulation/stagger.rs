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

use tracing::debug;

use crate::{
    audio::{Context, ContextError},
    graph::Variation,
};

/// Starts every sample of a multi-sample variation, the k-th one `k * interval` after now, so
/// the looping layers never attack together.
pub fn stagger_start(
    context: &dyn Context,
    variation: &Variation,
    interval: Duration,
) -> Result<(), ContextError> {
    let now = context.current_time();
    for (k, sample) in variation.samples.iter().enumerate() {
        let when = now + k as f64 * interval.as_secs_f64();
        context.start(sample.source, when)?;
        debug!(
            variation = %variation.name,
            sample = %sample.name,
            when,
            "Scheduled staggered start"
        );
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::audio::{mock, ContextError};
    use crate::graph::{build_variation, GlobalRules};
    use crate::testutil::channel_assets;

    use super::stagger_start;

    #[test]
    fn test_starts_are_staggered_from_now() -> Result<(), Box<dyn std::error::Error>> {
        let context = mock::Context::new("mock", 44100);
        let rules = GlobalRules {
            multi_sample: true,
            ..Default::default()
        };
        let assets = channel_assets("Effects", rules, 1, 3);
        let variation = build_variation(&context, "Effects", 0, &assets.variations[0], true)?;

        context.set_time(4.0);
        stagger_start(&context, &variation, Duration::from_secs(10))?;

        let expected: Vec<_> = variation
            .samples
            .iter()
            .zip([4.0, 14.0, 24.0])
            .map(|(sample, when)| (sample.source, when))
            .collect();
        assert_eq!(expected, context.starts());
        Ok(())
    }

    #[test]
    fn test_second_start_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let context = mock::Context::new("mock", 44100);
        let rules = GlobalRules {
            multi_sample: true,
            ..Default::default()
        };
        let assets = channel_assets("Effects", rules, 1, 2);
        let variation = build_variation(&context, "Effects", 0, &assets.variations[0], true)?;

        stagger_start(&context, &variation, Duration::from_secs(10))?;
        assert!(matches!(
            stagger_start(&context, &variation, Duration::from_secs(10)),
            Err(ContextError::AlreadyStarted(_))
        ));
        Ok(())
    }
}

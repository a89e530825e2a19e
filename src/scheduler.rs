//! Repeating render task with explicit cancellation

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Call `tick` every `period` until `cancel` fires.
///
/// Late ticks are delayed rather than bunched up, so a slow frame never
/// causes a burst. Returns the number of ticks run.
pub async fn run_ticks<F>(period: Duration, cancel: CancellationToken, mut tick: F) -> u64
where
    F: FnMut(),
{
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {
                tick();
                ticks += 1;
            }
        }
    }

    debug!(ticks, "Tick loop stopped");
    ticks
}

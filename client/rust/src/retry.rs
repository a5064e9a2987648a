//! Backoff builders shared by the REST client and the push channel.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};

/// Backoff for idempotent REST reads.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 5
/// - Jitter enabled
pub fn read_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(5)
        .with_jitter()
}

/// Backoff for push-channel reconnects.
///
/// `max_attempts == 0` retries forever.
pub fn reconnect_backoff(
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: usize,
) -> ExponentialBuilder {
    let max_times = if max_attempts == 0 {
        usize::MAX
    } else {
        max_attempts
    };
    ExponentialBuilder::default()
        .with_min_delay(min_delay)
        .with_max_delay(max_delay)
        .with_max_times(max_times)
        .with_jitter()
}

/// Iterator over reconnect delays; `None` once attempts are exhausted.
pub fn reconnect_delays(builder: &ExponentialBuilder) -> impl Iterator<Item = Duration> {
    builder.clone().build()
}

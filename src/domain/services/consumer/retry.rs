use std::time::Duration;

use rand::Rng;

pub use rabbitmq::backoff::calculate_retry_delay;

/// Adds up to 10% of `delay` on top of it. Never shortens the delay.
pub fn add_jitter(delay: Duration) -> Duration {
    let max_extra = u64::try_from(delay.as_nanos() / 10).unwrap_or(u64::MAX);
    let extra = rand::thread_rng().gen_range(0..=max_extra);
    delay.saturating_add(Duration::from_nanos(extra))
}

/// Delay before the delivery attempt that follows `retry_count` failures.
pub fn retry_delay(retry_count: u32, base: Duration, max: Duration) -> Duration {
    add_jitter(calculate_retry_delay(retry_count, base, max))
}

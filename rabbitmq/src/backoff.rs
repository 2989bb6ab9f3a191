//! Exponential backoff shared by connection retries and message retries.

use std::time::Duration;

/// Largest exponent applied before the delay is clamped.
const MAX_EXPONENT: u32 = 31;

/// Computes `min(base * 2^exponent, max)` without overflowing.
///
/// Connection attempts call this with `attempt - 1`, message retries with the
/// envelope's current retry count.
pub fn calculate_retry_delay(exponent: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1u32 << exponent.min(MAX_EXPONENT);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

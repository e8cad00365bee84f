//! Simple jitter utility for staggering scheduled work
//!
//! When a reconciliation pass registers many capture jobs at once (startup,
//! restart recovery), giving every job the same first-fire time makes all
//! cameras hit their RTSP sources in the same instant. A small pseudo-random
//! stagger spreads that load without pulling in an external random crate.

use chrono::Duration;

/// Generate a pseudo-random jitter value using system time
///
/// # Arguments
/// * `max_jitter_ms` - Maximum jitter value in milliseconds
///
/// # Returns
/// A pseudo-random jitter value between 0 and `max_jitter_ms` (inclusive)
///
/// # Examples
/// ```
/// use timelapser::utils::jitter::generate_jitter_ms;
///
/// let jitter = generate_jitter_ms(100); // 0-100ms jitter
/// assert!(jitter <= 100);
/// ```
pub fn generate_jitter_ms(max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        return 0;
    }

    (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos()
        % (max_jitter_ms + 1) as u128) as u64
}

/// Compute a first-fire stagger for a recurring trigger
///
/// Returns a jitter duration of at most `jitter_percent` of the capture
/// interval, capped at 60 seconds so long intervals (hours) do not produce
/// absurd start delays.
///
/// # Examples
/// ```
/// use chrono::Duration;
/// use timelapser::utils::jitter::stagger_for_interval;
///
/// let stagger = stagger_for_interval(Duration::seconds(60), 25);
/// assert!(stagger >= Duration::zero());
/// assert!(stagger <= Duration::seconds(15)); // 25% of 60s
/// ```
pub fn stagger_for_interval(interval: Duration, jitter_percent: u8) -> Duration {
    if jitter_percent == 0 || interval <= Duration::zero() {
        return Duration::zero();
    }

    let interval_ms = interval.num_milliseconds().max(0) as u64;
    let max_jitter_ms = ((interval_ms * jitter_percent as u64) / 100).min(60_000);

    Duration::milliseconds(generate_jitter_ms(max_jitter_ms) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_jitter_ms() {
        // Test with zero returns zero
        assert_eq!(generate_jitter_ms(0), 0);

        // Test that jitter is within bounds
        for _ in 0..100 {
            let jitter = generate_jitter_ms(50);
            assert!(jitter <= 50);
        }
    }

    #[test]
    fn test_stagger_for_interval() {
        // Zero percent returns zero
        assert_eq!(
            stagger_for_interval(Duration::seconds(60), 0),
            Duration::zero()
        );

        // Non-positive interval returns zero
        assert_eq!(
            stagger_for_interval(Duration::seconds(0), 25),
            Duration::zero()
        );

        // 25% of a 60s interval is at most 15s
        for _ in 0..100 {
            let stagger = stagger_for_interval(Duration::seconds(60), 25);
            assert!(stagger >= Duration::zero());
            assert!(stagger <= Duration::seconds(15));
        }

        // Long intervals are capped at 60s of stagger
        for _ in 0..100 {
            let stagger = stagger_for_interval(Duration::hours(6), 25);
            assert!(stagger <= Duration::seconds(60));
        }
    }
}

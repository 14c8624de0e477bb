//! Retry scheduling: capped exponential backoff with jitter.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Delay before attempt `attempts + 1`, given `attempts` have already run.
///
/// Grows as `base * 2^(attempts - 1)`, capped, with up to 25% random jitter
/// added so a burst of failures does not retry in lockstep.
pub fn backoff_delay(attempts: i32, base_secs: u64, cap_secs: u64) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 20) as u32;
    let secs = base_secs
        .saturating_mul(2_u64.saturating_pow(exponent))
        .min(cap_secs);
    let jitter_max = secs / 4;
    let jitter = if jitter_max > 0 {
        rand::rng().random_range(0..=jitter_max)
    } else {
        0
    };
    Duration::from_secs(secs + jitter)
}

/// When the next attempt should run. A server-supplied Retry-After wins over
/// the computed backoff when it asks for a longer wait.
pub fn next_run_at(
    now: DateTime<Utc>,
    attempts: i32,
    base_secs: u64,
    cap_secs: u64,
    retry_after: Option<Duration>,
) -> DateTime<Utc> {
    let mut delay = backoff_delay(attempts, base_secs, cap_secs);
    if let Some(requested) = retry_after {
        delay = delay.max(requested);
    }
    now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(
        cap_secs as i64,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_exponentially() {
        for (attempts, expected) in [(1, 5), (2, 10), (3, 20), (4, 40), (5, 80)] {
            let delay = backoff_delay(attempts, 5, 300).as_secs();
            assert!(
                (expected..=expected + expected / 4).contains(&delay),
                "attempt {}: got {}s, expected {}s plus jitter",
                attempts,
                delay,
                expected
            );
        }
    }

    #[test]
    fn test_backoff_respects_cap() {
        let delay = backoff_delay(30, 5, 300).as_secs();
        // Cap plus at most 25% jitter.
        assert!((300..=375).contains(&delay));
    }

    #[test]
    fn test_zeroth_attempt_uses_base() {
        let delay = backoff_delay(0, 5, 300).as_secs();
        assert!((5..=7).contains(&delay));
    }

    #[test]
    fn test_retry_after_extends_the_wait() {
        let now = Utc::now();
        let run_at = next_run_at(now, 1, 5, 300, Some(Duration::from_secs(120)));
        assert!(run_at >= now + chrono::Duration::seconds(120));
    }

    #[test]
    fn test_short_retry_after_does_not_shorten_backoff() {
        let now = Utc::now();
        let run_at = next_run_at(now, 5, 5, 300, Some(Duration::from_secs(1)));
        // Attempt 5 backoff is at least 80s.
        assert!(run_at >= now + chrono::Duration::seconds(80));
    }
}

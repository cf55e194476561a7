//! Exponential backoff with jitter for health probing.

use std::time::Duration;
use rand::Rng;

/// Delay before probe number `attempt` (1-based).
///
/// Doubles from `base` up to `max`, plus up to 10% jitter so several
/// managers probing one proxy do not synchronise.
pub fn probe_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(attempt - 1);
    let capped = base.saturating_mul(factor).min(max);

    let jitter_range = capped.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    capped + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_delay_grows_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1000);

        assert_eq!(probe_delay(0, base, max), Duration::ZERO);
        assert!(probe_delay(1, base, max) >= Duration::from_millis(100));
        assert!(probe_delay(2, base, max) >= Duration::from_millis(200));

        let capped = probe_delay(10, base, max);
        assert!(capped >= max);
        assert!(capped < max + Duration::from_millis(100));
    }
}

//! Process-monotonic clock used to timestamp samples.

use once_cell::sync::Lazy;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static START: Lazy<Instant> = Lazy::new(Instant::now);

/// Microseconds elapsed since the first call in this process.
///
/// Never goes backwards, unlike wall-clock time.
#[inline]
pub fn monotonic_us() -> i64 {
    i64::try_from(START.elapsed().as_micros()).unwrap_or(i64::MAX)
}

/// Milliseconds since the Unix epoch for `stamp`, or 0 before the epoch.
pub fn unix_millis(stamp: SystemTime) -> i64 {
    stamp
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_monotonic_advances() {
        let a = monotonic_us();
        std::thread::sleep(Duration::from_millis(2));
        let b = monotonic_us();
        assert!(b >= a + 1_000);
    }

    #[test]
    fn test_unix_millis() {
        let stamp = UNIX_EPOCH + Duration::from_millis(1_234);
        assert_eq!(unix_millis(stamp), 1_234);
        assert_eq!(unix_millis(UNIX_EPOCH), 0);
    }
}

//! Wall-clock helpers backing the queue's score arithmetic.
//!
//! The priority queue orders its ready/in-flight/dlq sets by a single
//! numeric score derived from nanosecond timestamps.
//! `i128` is used throughout rather than `f64` so the `priority * 10^12 -
//! time_ns` encoding never loses precision; only the `redis` backend casts
//! down to `f64` at its own boundary.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The multiplier separating priority bands in a ready-set score. Chosen so
/// it dwarfs any realistic nanosecond timestamp component.
pub const PRIORITY_SCALE: i128 = 1_000_000_000_000;

/// Current wall-clock time as nanoseconds since the Unix epoch.
///
/// Saturates to zero if the clock reads before the epoch, which should
/// never happen in practice but keeps this infallible.
#[must_use]
pub fn now_nanos() -> i128 {
    system_time_to_nanos(SystemTime::now())
}

/// Convert a [`SystemTime`] to nanoseconds since the Unix epoch.
#[must_use]
pub fn system_time_to_nanos(time: SystemTime) -> i128 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i128::from(d.as_nanos()),
        Err(_) => 0,
    }
}

/// Convert nanoseconds since the Unix epoch back to a [`SystemTime`].
///
/// Negative or out-of-range input saturates to [`UNIX_EPOCH`].
#[must_use]
pub fn nanos_to_system_time(nanos: i128) -> SystemTime {
    if nanos <= 0 {
        return UNIX_EPOCH;
    }
    let nanos = u64::try_from(nanos).unwrap_or(u64::MAX);
    UNIX_EPOCH + Duration::from_nanos(nanos)
}

/// Encode the ready-set score for a priority and a time component.
///
/// `time_ns` is the enqueue time for a fresh envelope, or a delayed
/// `visible_after` time for a Nack'd or swept-back envelope. The time term
/// is *subtracted*, not added: `ZPOPMAX` pops the highest score, and within
/// a priority band the earlier (smaller) `time_ns` must win so dequeue order
/// is FIFO, not LIFO. The same subtraction makes a delayed `visible_after`
/// score *lower* than one dequeued now, so a backed-off envelope is
/// correctly postponed behind fresher same-priority entries rather than
/// jumping the line.
#[must_use]
pub const fn ready_score(priority: u32, time_ns: i128) -> i128 {
    (priority as i128) * PRIORITY_SCALE - time_ns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanos_round_trip_through_system_time() {
        let now = now_nanos();
        let back = system_time_to_nanos(nanos_to_system_time(now));
        // SystemTime only round-trips to nanosecond resolution on platforms
        // that actually store it; allow a tiny slop.
        assert!((back - now).abs() < 1_000);
    }

    #[test]
    fn ready_score_orders_priority_above_time() {
        let low_priority_far_future = ready_score(1, 999_999_999_999);
        let high_priority_now = ready_score(2, 0);
        assert!(high_priority_now > low_priority_far_future);
    }

    #[test]
    fn ready_score_preserves_fifo_within_priority() {
        // `ZPOPMAX` pops the highest score; the earlier entry must rank
        // higher so it is popped first.
        let earlier = ready_score(5, 100);
        let later = ready_score(5, 200);
        assert!(earlier > later);
    }

    #[test]
    fn ready_score_postpones_delayed_visibility() {
        // A backoff/sweep requeue with a further-out `visible_after` must
        // rank lower than one eligible sooner, within the same priority.
        let visible_soon = ready_score(5, 1_000);
        let visible_later = ready_score(5, 5_000);
        assert!(visible_soon > visible_later);
    }
}

//! A process-wide monotonic seconds counter for hints TTLs.
//!
//! Slot deadlines only need to compare against "now" consistently across
//! calls; they don't need wall-clock semantics. A single shared accumulator,
//! advanced by the positive delta since the previous observation, gives that
//! without caring whether `SystemTime` ever jumps backwards.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

static SECONDS: AtomicU64 = AtomicU64::new(0);

struct LastObserved(Instant);

static LAST: Mutex<Option<LastObserved>> = Mutex::new(None);

/// Returns the current value of the shared monotonic-seconds accumulator,
/// advancing it by the elapsed time since the last call.
pub fn now() -> u64 {
    let mut guard = LAST.lock().unwrap();
    let observed = Instant::now();

    let delta = match guard.as_ref() {
        Some(last) => observed.saturating_duration_since(last.0).as_secs(),
        None => 0,
    };
    *guard = Some(LastObserved(observed));
    drop(guard);

    if delta > 0 {
        // fetch_add returns the pre-add value; the accumulator the caller
        // observes is that plus the delta just applied.
        SECONDS.fetch_add(delta, Ordering::Relaxed) + delta
    } else {
        SECONDS.load(Ordering::Relaxed)
    }
}

/// Test-only hook: advances the shared accumulator by `seconds` without
/// waiting for real time to pass, so hints deadline reactivation can be
/// exercised synchronously. Only ever moves the clock forward, so it stays
/// safe to call from a test running concurrently with others that call
/// [`now`].
#[cfg(test)]
pub(crate) fn advance_for_test(seconds: u64) {
    SECONDS.fetch_add(seconds, Ordering::Relaxed);
    let mut guard = LAST.lock().unwrap();
    *guard = Some(LastObserved(Instant::now()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_non_decreasing() {
        let a = now();
        let b = now();
        assert!(b >= a);
    }

    #[test]
    fn now_returns_the_accumulator_after_applying_the_delta() {
        let a = now();
        advance_for_test(5);
        let b = now();
        assert!(b >= a + 5);
    }
}

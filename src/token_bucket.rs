use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::filter::Bucket;

/// Process-wide token bucket refilled from wall-clock time.
///
/// Capacity is both the initial allowance and the ceiling. Refills are whole
/// tokens only; when one is credited the refill timestamp snaps to the nearest
/// second, so repeated calls inside the same second never mint extra tokens.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: i64,
    rate_per_sec: i64,
}

#[derive(Debug)]
struct BucketState {
    tokens: i64,
    last_refill_ms: u64,
}

impl TokenBucket {
    pub fn new(capacity: u32, rate_per_sec: u32) -> Self {
        Self::new_at(capacity, rate_per_sec, now_millis())
    }

    /// Create a bucket whose refill clock starts at `now_ms` (milliseconds since the UNIX epoch).
    pub fn new_at(capacity: u32, rate_per_sec: u32, now_ms: u64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity as i64,
                last_refill_ms: now_ms,
            }),
            capacity: capacity as i64,
            rate_per_sec: rate_per_sec as i64,
        }
    }

    /// Refill and try to consume one token as of `now_ms`.
    pub fn get_token_at(&self, now_ms: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        // A refill stamp rounded up into the future counts as no elapsed time.
        let elapsed_ms = now_ms.saturating_sub(state.last_refill_ms) as i128;
        let tokens_to_add =
            ((elapsed_ms * self.rate_per_sec as i128) / 1000).min(self.capacity as i128) as i64;

        if tokens_to_add > 0 {
            state.last_refill_ms = round_to_second(now_ms);
        }

        if state.tokens + tokens_to_add > 0 {
            state.tokens = (tokens_to_add + state.tokens - 1).min(self.capacity - 1);
            return true;
        }

        false
    }

    pub fn tokens(&self) -> i64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tokens
    }
}

impl Bucket for TokenBucket {
    fn get_token(&self) -> bool {
        self.get_token_at(now_millis())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn round_to_second(ms: u64) -> u64 {
    (ms + 500) / 1000 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    // A whole second, so rounding is easy to reason about.
    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn test_burst_is_bounded_by_capacity() {
        let bucket = TokenBucket::new_at(10, 2, T0);
        for _ in 0..10 {
            assert!(bucket.get_token_at(T0));
            assert!(bucket.tokens() >= 0 && bucket.tokens() <= 9);
        }
        assert!(!bucket.get_token_at(T0));
        assert_eq!(bucket.tokens(), 0);
    }

    #[test]
    fn test_spaced_calls_keep_succeeding() {
        let bucket = TokenBucket::new_at(1, 1, T0);
        for i in 0..5 {
            assert!(bucket.get_token_at(T0 + i * 1000), "call {} was rejected", i);
        }
    }

    #[test]
    fn test_idle_refill_is_capped_below_capacity() {
        let bucket = TokenBucket::new_at(5, 100, T0);
        for _ in 0..5 {
            assert!(bucket.get_token_at(T0));
        }
        assert!(bucket.get_token_at(T0 + 3_600_000));
        assert_eq!(bucket.tokens(), 4);
    }

    #[test]
    fn test_sub_second_drift_cannot_mint_tokens() {
        let bucket = TokenBucket::new_at(1, 2, T0);
        assert!(bucket.get_token_at(T0));
        // One token earned; the refill stamp rounds up to T0 + 1000.
        assert!(bucket.get_token_at(T0 + 500));
        assert!(!bucket.get_token_at(T0 + 999));
        assert!(bucket.get_token_at(T0 + 1500));
    }

    #[test]
    fn test_slow_rate_starves_between_whole_tokens() {
        let bucket = TokenBucket::new_at(1, 1, T0);
        assert!(bucket.get_token_at(T0));
        assert!(!bucket.get_token_at(T0 + 999));
        assert!(bucket.get_token_at(T0 + 1000));
    }

    #[test]
    fn test_huge_elapsed_time_does_not_overflow() {
        let bucket = TokenBucket::new_at(3, u32::MAX, 0);
        assert!(bucket.get_token_at(u64::MAX / 2));
        assert_eq!(bucket.tokens(), 2);
    }

    #[test]
    fn test_round_to_second() {
        assert_eq!(round_to_second(1_499), 1_000);
        assert_eq!(round_to_second(1_500), 2_000);
        assert_eq!(round_to_second(2_000), 2_000);
    }
}

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::filter::ClientFilter;

#[derive(Debug, Clone)]
struct BlockRecord {
    counter: u32,
    last_access: Instant,
}

/// Counts failures per client IP and blocks a client once it exceeds `limit`
/// strikes inside the reset window.
#[derive(Debug)]
pub struct IpBlocker {
    limit: u32,
    reset_after: Duration,
    records: RwLock<HashMap<String, BlockRecord>>,
}

impl IpBlocker {
    pub fn new(limit: u32, reset_after: Duration) -> Self {
        Self {
            limit,
            reset_after,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Record a failure for `ip` as of `now`.
    pub fn notify_failure_at(&self, ip: &str, now: Instant) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);

        match records.get_mut(ip) {
            Some(record) => {
                if now.saturating_duration_since(record.last_access) > self.reset_after {
                    record.counter = 1;
                } else {
                    record.counter = record.counter.saturating_add(1);
                }
                record.last_access = now;
            }
            None => {
                records.insert(
                    ip.to_string(),
                    BlockRecord {
                        counter: 1,
                        last_access: now,
                    },
                );
            }
        }
    }

    /// Current strike count for `ip`, if it is tracked.
    pub fn failures(&self, ip: &str) -> Option<u32> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ip)
            .map(|record| record.counter)
    }

    /// Number of tracked clients.
    pub fn tracked(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ClientFilter for IpBlocker {
    fn notify_failure(&self, ip: &str) {
        self.notify_failure_at(ip, Instant::now());
    }

    fn check_blocked(&self, ip: &str) -> bool {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(ip)
            .map(|record| record.counter > self.limit)
            .unwrap_or(false)
    }

    fn reset(&self) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

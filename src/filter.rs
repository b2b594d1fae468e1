//! Capability traits shared by the admission pipeline.
//!
//! The dispatcher only ever talks to these traits, so the concrete stores
//! stay private to their modules and tests can swap in counting fakes.

/// Per-client failure accounting.
pub trait ClientFilter: Send + Sync {
    /// Record one failure (strike) for `ip`.
    fn notify_failure(&self, ip: &str);

    /// Whether `ip` has exceeded the tolerated number of failures.
    fn check_blocked(&self, ip: &str) -> bool;

    /// Forget every tracked client.
    fn reset(&self);
}

/// Global admission budget.
pub trait Bucket: Send + Sync {
    /// Take one token, returning `false` when the budget is exhausted.
    fn get_token(&self) -> bool;
}

use std::sync::atomic::{AtomicI64, Ordering};

use crate::deployment::TransactionId;

/// Hands out increasing transaction ids, seeded from the clock so ids from
/// successive master runs do not collide.
#[derive(Debug)]
pub struct TransactionIdGenerator {
    next: AtomicI64,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }

    pub fn next_id(&self) -> TransactionId {
        TransactionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TransactionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-sender sliding window token.

use std::collections::BTreeMap;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use parking_lot::Mutex;
use tracing::trace;

/// Width of one accounting bucket, in seconds.
pub const BUCKET_SECS: i64 = 60;

/// Width of one accounting bucket.
pub fn bucket_width() -> TimeDelta {
    TimeDelta::seconds(BUCKET_SECS)
}

/// Outcome of an atomic admission check on a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The message fit and was recorded; `count` is the new total.
    Admitted { count: u64 },
    /// The message would have pushed the token to `projected` and was not recorded.
    Rejected { projected: u64 },
}

/// Tracks how many messages one sender sent within the recent window.
///
/// Messages are accumulated in one-minute buckets keyed by the start of the
/// minute. The running total is maintained incrementally so reading it is
/// O(1); it is only accurate as a window rate right after a [`prune`].
///
/// [`prune`]: Token::prune
pub struct Token {
    key: String,
    state: Mutex<TokenState>,
}

#[derive(Default)]
struct TokenState {
    buckets: BTreeMap<DateTime<Utc>, u64>,
    total: u64,
}

impl TokenState {
    fn record(&mut self, timestamp: DateTime<Utc>, recipients: u64) {
        // Every bucket is at most total, so clamping to the headroom in
        // total keeps both sums in range and equal.
        let recipients = recipients.min(u64::MAX - self.total);
        let bucket = truncate_to_bucket(timestamp);
        *self.buckets.entry(bucket).or_insert(0) += recipients;
        self.total += recipients;
    }

    fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        // split_off keeps everything at or after the cutoff
        let kept = self.buckets.split_off(&cutoff);
        let expired = std::mem::replace(&mut self.buckets, kept);

        for value in expired.values() {
            self.total = self.total.saturating_sub(*value);
        }
        expired.len()
    }
}

impl Token {
    /// Create an empty token for a sender key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: Mutex::new(TokenState::default()),
        }
    }

    /// The sender key this token tracks.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Record a message with `recipients` recipients at `timestamp`.
    pub fn record_message(&self, timestamp: DateTime<Utc>, recipients: u64) {
        let mut state = self.state.lock();
        state.record(timestamp, recipients);

        trace!(
            key = %self.key,
            count = state.total,
            buckets = state.buckets.len(),
            recipients = recipients,
            "Recorded message"
        );
    }

    /// Drop every bucket that starts strictly before `cutoff`.
    pub fn prune(&self, cutoff: DateTime<Utc>) {
        let mut state = self.state.lock();
        let removed = state.prune(cutoff);

        if removed > 0 {
            trace!(
                key = %self.key,
                removed = removed,
                count = state.total,
                "Pruned expired buckets"
            );
        }
    }

    /// Messages currently held. Call [`Token::prune`] first.
    pub fn count(&self) -> u64 {
        self.state.lock().total
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.state.lock().buckets.len()
    }

    /// Prune, compare against `limit` and record, all under one lock.
    ///
    /// Rejected messages are not recorded.
    pub fn admit(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        recipients: u64,
        limit: u64,
    ) -> Admission {
        let mut state = self.state.lock();
        state.prune(cutoff);

        let projected = state.total.saturating_add(recipients);
        if projected > limit {
            return Admission::Rejected { projected };
        }

        state.record(now, recipients);
        Admission::Admitted { count: state.total }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "Token: {} count {} buckets {}",
            self.key,
            state.total,
            state.buckets.len()
        )
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Token")
            .field("key", &self.key)
            .field("count", &state.total)
            .field("buckets", &state.buckets.len())
            .finish()
    }
}

/// Truncate a timestamp to the start of its bucket.
pub fn truncate_to_bucket(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.duration_trunc(bucket_width()).unwrap_or(timestamp)
}

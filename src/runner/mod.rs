//! Shared execution strategies (§4.9): the three runners (`Sequential`, `Unordered`,
//! `Ordered`) that back the Concurrent/Parallel variants of select-where, flatten, and join,
//! plus the small primitives they're built from — `ErrorAggregate` and `fuse_after_error`.
//!
//! Every node built on top of these runners shares one discipline: survivor items flow through
//! as `Ok(value)`, a single task's failure is recorded rather than surfacing immediately, and
//! once the parent is fully drained the accumulated failures (if any) are delivered as one
//! final `Err` item before the stream ends (§4.5, §4.6, §4.7).

pub mod drainer;

use crate::error::QueryError;

/// Accumulates zero or more concurrent failures and collapses them to this crate's error
/// shape at the end of a runner's life, per §7: a singleton aggregate surfaces as its own
/// cause, never wrapped in `Aggregate`.
#[derive(Debug, Default)]
pub struct ErrorAggregate {
    errors: Vec<QueryError>,
}

impl ErrorAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: QueryError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Collapse the accumulated errors into at most one `QueryError`, per §7's "collapsing a
    /// singleton aggregate to its single cause" rule.
    pub fn into_error(mut self) -> Option<QueryError> {
        match self.errors.len() {
            0 => None,
            1 => Some(self.errors.pop().expect("len checked above")),
            _ => Some(QueryError::Aggregate(self.errors)),
        }
    }
}

/// Using a token tripped by the first observed failure, decide whether a runner loop should
/// keep pulling from its parent. Cancellation observed with no recorded error of its own is
/// folded into `Canceled`; a runner that already has a substantive cause ignores this and lets
/// its own aggregate win, per §7 ("cancellation is a first-class error only when no other error
/// was recorded").
pub fn cancellation_as_error(cancel: &tokio_util::sync::CancellationToken) -> Option<QueryError> {
    if cancel.is_cancelled() {
        Some(QueryError::Canceled)
    } else {
        None
    }
}

//! Error kinds shared by every operator and runner.

use std::fmt;

/// A boxed, type-erased callback/source error. User closures can return anything that
/// implements `std::error::Error`; this crate never inspects the concrete type, only forwards it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error surface for the whole combinator pipeline.
///
/// Construction-time failures (currently only negative `take`/`skip` counts) are
/// `ArgumentInvalid`; everything else happens during iteration and flows through the runner
/// machinery in [`crate::runner`].
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// An argument was rejected before enumeration began.
    #[error("invalid argument: {0}")]
    ArgumentInvalid(String),

    /// The external cancellation token was tripped, or an internal trip propagated here first.
    #[error("operation canceled")]
    Canceled,

    /// A user-supplied selector, predicate, or result selector returned an error.
    #[error("callback failed: {0}")]
    UserCallbackFailure(#[source] BoxError),

    /// A parent/source stream (e.g. an observable) reported an error.
    #[error("source failed: {0}")]
    SourceFailure(#[source] BoxError),

    /// More than one concurrent task failed; a singleton is always collapsed to its cause by
    /// [`ErrorAggregate`](crate::runner::ErrorAggregate) before reaching this variant.
    #[error("{} concurrent failures: {}", .0.len(), join_causes(.0))]
    Aggregate(Vec<QueryError>),
}

fn join_causes(errors: &[QueryError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

impl QueryError {
    pub fn argument_invalid(msg: impl Into<String>) -> Self {
        QueryError::ArgumentInvalid(msg.into())
    }

    pub fn user_callback_failure<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        QueryError::UserCallbackFailure(Box::new(err))
    }

    pub fn source_failure<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        QueryError::SourceFailure(Box::new(err))
    }

    /// True for a `Canceled` error that carries no other cause.
    pub fn is_pure_cancellation(&self) -> bool {
        matches!(self, QueryError::Canceled)
    }
}

/// A minimal stand-in error type for call sites (tests, simple observables) that just need
/// *some* `std::error::Error` carrying a message.
#[derive(Debug)]
pub struct Msg(pub String);

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Msg {}

impl Msg {
    pub fn new(msg: impl Into<String>) -> Self {
        Msg(msg.into())
    }
}

//! The operator protocol (§4.2). Every pipeline node is a concrete, independently testable
//! struct implementing [`Operator<T>`], not a boxed trait-object tree. `with_params` recurses
//! statically into the parent field(s) of whatever concrete type
//! built the chain, which is how "sticky downstream" mode switching (§4.1) is implemented without
//! any dynamic dispatch.
//!
//! Fusion (§4.2) is a constructor-time rewrite implemented the Rust-idiomatic way: a combinator
//! that wants to recognize a specific upstream shape (e.g. `select` following `select`, or
//! `prepend` on a `FromEnumerableOp`) defines an *inherent* method of the same name on that
//! concrete upstream type. Inherent methods take priority over the blanket extension-trait method
//! during overload resolution, so `from_enumerable(xs).take(3)` picks `FromEnumerableOp::take`
//! (which slices) while `select(f).take(3)` falls back to the blanket `TakeOp` wrapper — no
//! runtime capability queries or `Any` downcasting required anywhere in this crate.
//!
//! An async sequence's advance can suspend and can fail (§3), so every node's output is a
//! `Stream<Item = Result<T, QueryError>>` rather than a bare `Stream<Item = T>` — the direct
//! analogue of `IAsyncEnumerable<T>::MoveNextAsync` being allowed to throw. Per §3's invariant,
//! once an `Err` item is produced the stream yields `None` on the next poll.

pub mod flatten;
pub mod join;
pub mod observable;
pub mod select_where;
pub mod source;
pub mod structural;

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::QueryError;
use crate::params::ExecParams;

/// A boxed, owned, thread-safe fallible async sequence — the common currency every `iterate`
/// call hands back to its caller, and the shape a handful of nodes (the literal-list `Flatten`,
/// the observable bridge) store their children as when a single concrete type can't name them.
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = Result<T, QueryError>> + Send>>;

/// Common capability surface of every pipeline node, per §4.2.
pub trait Operator<T>: Send + Sync
where
    T: Send + 'static,
{
    /// The parameters currently carried by this node.
    fn params(&self) -> ExecParams;

    /// A structurally identical node with `params` replacing the current ones, recursing into
    /// parent node(s) so the whole upstream subtree picks up the new mode (§4.1).
    fn with_params(&self, params: ExecParams) -> Self
    where
        Self: Sized;

    /// Produce the async iterator for this node, recursively driving its parent. `cancel` is a
    /// token scoped to this one enumeration; dropping the returned stream, or canceling the
    /// token, tears down every task this call spawned. Calling `iterate` again (e.g. after the
    /// previous stream ran to completion) starts a fresh, independent enumeration (§3).
    fn iterate(&self, cancel: CancellationToken) -> BoxStream<T>;
}

/// Object-safe subset of [`Operator`], used only where a node must hold a runtime-growable or
/// otherwise heterogeneous collection of children — currently just the literal-list form of
/// [`flatten::FlattenLiteralOp`]. Everywhere else this crate uses concrete generics, matching the
/// teacher; this is the deliberate, narrow exception, not the default. `with_params` still needs
/// to reach every child (§4.1's "sticky downstream" rule), so it's represented here too, just
/// returning a freshly boxed child rather than `Self`.
pub trait DynOperator<T: Send + 'static>: Send + Sync {
    fn iterate_dyn(&self, cancel: CancellationToken) -> BoxStream<T>;
    fn with_params_dyn(&self, params: ExecParams) -> Arc<dyn DynOperator<T>>;
}

impl<T, O> DynOperator<T> for O
where
    T: Send + 'static,
    O: Operator<T> + 'static,
{
    fn iterate_dyn(&self, cancel: CancellationToken) -> BoxStream<T> {
        self.iterate(cancel)
    }

    fn with_params_dyn(&self, params: ExecParams) -> Arc<dyn DynOperator<T>> {
        Arc::new(self.with_params(params))
    }
}

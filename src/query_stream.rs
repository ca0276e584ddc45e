//! Public combinator surface (§6): free constructors for the source leaves, plus three blanket
//! extension traits — [`ModeExt`] (mode switching, §4.1), [`TerminalExt`] (the mechanical
//! reductions, §8) — layered on top of the per-family traits already exported from [`crate::op`]
//! (`SelectWhereExt`, `StructuralExt`, `FlattenExt`, `JoinExt`). There is no `QueryStream<T>`
//! facade struct: every combinator call already returns the concrete operator type that models
//! it, the same way `impl Stream` combinators compose directly off `futures::StreamExt` without
//! an intermediate wrapper.
//!
//! `take`/`skip` accept `usize`, which rules out negative counts at the type level — a stronger
//! guarantee than a runtime `ArgumentInvalid` check would give, and the reason this module adds
//! no separate validating constructor for them (see DESIGN.md).

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt as _;
use tokio_util::sync::CancellationToken;

use crate::config::QueryStreamConfig;
use crate::error::QueryError;
use crate::op::observable::{FromObservableOp, ObservableSource};
use crate::op::source::{EmptyOp, FromEnumerableOp, SingletonOp};
use crate::op::Operator;
use crate::params::{ExecMode, ExecParams};

/// A source with no items.
pub fn empty<T: Send + 'static>() -> EmptyOp<T> {
    EmptyOp::new()
}

/// A source with exactly one item.
pub fn singleton<T: Send + 'static>(item: T) -> SingletonOp<T> {
    SingletonOp::new(item)
}

/// A source eagerly backed by `items`.
pub fn from_enumerable<T: Send + 'static>(items: Vec<T>) -> FromEnumerableOp<T> {
    FromEnumerableOp::new(items)
}

/// Bridges an external push-style producer into the pull-based pipeline (§4.3, §4.8).
/// `max_buffer <= 0` means unbounded; a positive value drops the newest item once the internal
/// queue is full.
pub fn from_observable<T: Send + 'static>(source: Arc<dyn ObservableSource<T>>, max_buffer: i64) -> FromObservableOp<T> {
    FromObservableOp::new(source, max_buffer)
}

/// As [`from_observable`], but a non-positive `max_buffer` falls back to
/// `config.default_observable_buffer` instead of going straight to unbounded.
pub fn from_observable_with_config<T: Send + 'static>(
    source: Arc<dyn ObservableSource<T>>,
    max_buffer: i64,
    config: QueryStreamConfig,
) -> FromObservableOp<T> {
    FromObservableOp::with_config(source, max_buffer, config)
}

/// Mode switching (§4.1): every method here rebinds `ExecParams` wholesale via `with_params`
/// rather than inserting a node, so the switch is *sticky downstream* — it reaches every operator
/// already built upstream, not just the one it's called on.
pub trait ModeExt<T: Send + 'static>: Operator<T> + Sized {
    fn as_concurrent(self, ordered: bool) -> Self {
        self.with_params(ExecParams { mode: ExecMode::Concurrent, ordered })
    }

    fn as_parallel(self, ordered: bool) -> Self {
        self.with_params(ExecParams { mode: ExecMode::Parallel, ordered })
    }

    fn as_sequential(self) -> Self {
        self.with_params(ExecParams::sequential())
    }

    /// Keeps the current mode, relaxes delivery order.
    fn as_unordered(self) -> Self {
        let mode = self.params().mode;
        self.with_params(ExecParams { mode, ordered: false })
    }
}

impl<T: Send + 'static, O: Operator<T>> ModeExt<T> for O {}

/// The mechanical reductions (§6, §8): `any`, `count`, `to_list`, `for_each`. Each has a
/// `_cancellable` variant taking an explicit [`CancellationToken`]; the plain name runs with a
/// fresh, never-triggered token (the common case — nothing to cancel against).
pub trait TerminalExt<T: Send + 'static>: Operator<T> + Sized + 'static {
    fn any_cancellable(self, cancel: CancellationToken) -> BoxFuture<'static, Result<bool, QueryError>> {
        Box::pin(async move {
            let mut stream = self.iterate(cancel);
            match stream.next().await {
                None => Ok(false),
                Some(Ok(_)) => Ok(true),
                Some(Err(e)) => Err(e),
            }
        })
    }

    fn any(self) -> BoxFuture<'static, Result<bool, QueryError>> {
        self.any_cancellable(CancellationToken::new())
    }

    fn count_cancellable(self, cancel: CancellationToken) -> BoxFuture<'static, Result<usize, QueryError>> {
        Box::pin(async move {
            let mut stream = self.iterate(cancel);
            let mut n = 0usize;
            while let Some(item) = stream.next().await {
                item?;
                n += 1;
            }
            Ok(n)
        })
    }

    fn count(self) -> BoxFuture<'static, Result<usize, QueryError>> {
        self.count_cancellable(CancellationToken::new())
    }

    fn to_list_cancellable(self, cancel: CancellationToken) -> BoxFuture<'static, Result<Vec<T>, QueryError>> {
        Box::pin(async move {
            let mut stream = self.iterate(cancel);
            let mut out = Vec::new();
            while let Some(item) = stream.next().await {
                out.push(item?);
            }
            Ok(out)
        })
    }

    fn to_list(self) -> BoxFuture<'static, Result<Vec<T>, QueryError>> {
        self.to_list_cancellable(CancellationToken::new())
    }

    fn for_each_cancellable<F>(self, cancel: CancellationToken, mut f: F) -> BoxFuture<'static, Result<(), QueryError>>
    where
        F: FnMut(T) + Send + 'static,
    {
        Box::pin(async move {
            let mut stream = self.iterate(cancel);
            while let Some(item) = stream.next().await {
                f(item?);
            }
            Ok(())
        })
    }

    fn for_each<F>(self, f: F) -> BoxFuture<'static, Result<(), QueryError>>
    where
        F: FnMut(T) + Send + 'static,
    {
        self.for_each_cancellable(CancellationToken::new(), f)
    }
}

impl<T: Send + 'static, O: Operator<T> + 'static> TerminalExt<T> for O {}

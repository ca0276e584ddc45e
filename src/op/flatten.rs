//! `Flatten` (§4.6): an outer sequence of pipelines, flattened into one sequence of their items.
//!
//! Two shapes share one execution core. [`FlattenOp`] wraps an arbitrary parent whose items are
//! themselves operators (the general case: `source.select(build_subquery).flatten()`).
//! [`FlattenLiteralOp`] instead holds a runtime-growable `Vec` of children built up directly
//! (`flatten_all(vec![a, b, c])`, or repeated `.concat()`); it has an inherent `concat`/`push`
//! that extends the list in place rather than nesting another nodes (the "Concatable" fusion
//! capability of §4.2) — the one place in this crate a node holds heterogeneous children, via
//! the object-safe [`DynOperator`].
//!
//! `Sequential` drains each inner stream fully before moving to the next. `Unordered` spawns one
//! draining task per inner stream as it's discovered, fanning in to a single shared channel —
//! items surface in whatever order their producers finish. `Ordered` also spawns one task per
//! inner stream (so slow and fast inner streams still progress concurrently) but the consumer
//! drains their individual queues strictly in outer-enqueue order, preserving the sequence a
//! purely sequential flatten would have produced. An `Empty` inner stream needs no special-casing
//! to be skipped cheaply: it completes on its very first poll without ever spawning a task.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::channel::mpsc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::{BoxStream, DynOperator, Operator};
use crate::error::QueryError;
use crate::params::{ExecMode, ExecParams};

/// Bridges a source-of-inner-streams item to the `BoxStream<T>` the runners below need,
/// regardless of whether that item is a concrete `Operator<T>` (the general `FlattenOp` case) or
/// a type-erased `Arc<dyn DynOperator<T>>` (the literal-list case).
pub trait IntoInnerStream<T: Send + 'static>: Send + 'static {
    fn into_inner_stream(self, cancel: CancellationToken) -> BoxStream<T>;
}

impl<T, O> IntoInnerStream<T> for O
where
    T: Send + 'static,
    O: Operator<T> + 'static,
{
    fn into_inner_stream(self, cancel: CancellationToken) -> BoxStream<T> {
        self.iterate(cancel)
    }
}

impl<T: Send + 'static> IntoInnerStream<T> for Arc<dyn DynOperator<T>> {
    fn into_inner_stream(self, cancel: CancellationToken) -> BoxStream<T> {
        self.iterate_dyn(cancel)
    }
}

fn spawn_into<T: Send + 'static>(mut inner: BoxStream<T>, tx: mpsc::UnboundedSender<Result<T, QueryError>>, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = inner.next() => match item {
                    Some(item) => {
                        if tx.unbounded_send(item).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    });
}

fn run_sequential<Src, T>(outer: BoxStream<Src>, cancel: CancellationToken) -> BoxStream<T>
where
    Src: IntoInnerStream<T>,
    T: Send + 'static,
{
    Box::pin(stream::unfold((outer, None::<BoxStream<T>>, false), move |(mut outer, mut inner, done)| {
        let cancel = cancel.clone();
        async move {
            if done {
                return None;
            }
            loop {
                if cancel.is_cancelled() {
                    return Some((Err(QueryError::Canceled), (outer, inner, true)));
                }
                if let Some(mut cur) = inner.take() {
                    match cur.next().await {
                        Some(Err(e)) => return Some((Err(e), (outer, None, true))),
                        Some(Ok(v)) => return Some((Ok(v), (outer, Some(cur), false))),
                        None => continue,
                    }
                }
                match outer.next().await {
                    None => return None,
                    Some(Err(e)) => return Some((Err(e), (outer, None, true))),
                    Some(Ok(src)) => {
                        inner = Some(src.into_inner_stream(cancel.clone()));
                        continue;
                    }
                }
            }
        }
    }))
}

fn run_unordered<Src, T>(mut outer: BoxStream<Src>, cancel: CancellationToken) -> BoxStream<T>
where
    Src: IntoInnerStream<T>,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::unbounded::<Result<T, QueryError>>();
    let driver_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = driver_cancel.cancelled() => break,
                item = outer.next() => match item {
                    None => break,
                    Some(Err(e)) => {
                        let _ = tx.unbounded_send(Err(e));
                        break;
                    }
                    Some(Ok(src)) => {
                        let inner = src.into_inner_stream(driver_cancel.clone());
                        spawn_into(inner, tx.clone(), driver_cancel.clone());
                    }
                }
            }
        }
    });
    race_cancellation(rx, cancel)
}

fn run_ordered<Src, T>(mut outer: BoxStream<Src>, cancel: CancellationToken) -> BoxStream<T>
where
    Src: IntoInnerStream<T>,
    T: Send + 'static,
{
    let (queue_tx, queue_rx) = mpsc::unbounded::<mpsc::UnboundedReceiver<Result<T, QueryError>>>();
    let driver_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = driver_cancel.cancelled() => break,
                item = outer.next() => match item {
                    None => break,
                    Some(Err(e)) => {
                        let (etx, erx) = mpsc::unbounded();
                        let _ = etx.unbounded_send(Err(e));
                        let _ = queue_tx.unbounded_send(erx);
                        break;
                    }
                    Some(Ok(src)) => {
                        let inner = src.into_inner_stream(driver_cancel.clone());
                        let (itx, irx) = mpsc::unbounded();
                        spawn_into(inner, itx, driver_cancel.clone());
                        if queue_tx.unbounded_send(irx).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
    Box::pin(stream::unfold(
        (queue_rx, None::<mpsc::UnboundedReceiver<Result<T, QueryError>>>, cancel, false),
        |(mut queue_rx, mut current, cancel, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(mut cur) = current.take() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Some((Err(QueryError::Canceled), (queue_rx, None, cancel, true))),
                        item = cur.next() => match item {
                            Some(Err(e)) => return Some((Err(e), (queue_rx, None, cancel, true))),
                            Some(Ok(v)) => return Some((Ok(v), (queue_rx, Some(cur), cancel, false))),
                            None => continue,
                        }
                    }
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Some((Err(QueryError::Canceled), (queue_rx, None, cancel, true))),
                    next_queue = queue_rx.next() => match next_queue {
                        Some(rx) => {
                            current = Some(rx);
                            continue;
                        }
                        None => return None,
                    }
                }
            }
        },
    ))
}

fn race_cancellation<T: Send + 'static>(rx: mpsc::UnboundedReceiver<Result<T, QueryError>>, cancel: CancellationToken) -> BoxStream<T> {
    Box::pin(stream::unfold((rx, cancel, false), |(mut rx, cancel, done)| async move {
        if done {
            return None;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Some((Err(QueryError::Canceled), (rx, cancel, true))),
            item = rx.next() => match item {
                Some(item) => Some((item, (rx, cancel, false))),
                None => None,
            },
        }
    }))
}

fn iterate_flatten<Src, T>(outer: BoxStream<Src>, params: ExecParams, cancel: CancellationToken) -> BoxStream<T>
where
    Src: IntoInnerStream<T>,
    T: Send + 'static,
{
    match params.mode {
        ExecMode::Sequential => run_sequential(outer, cancel),
        ExecMode::Concurrent | ExecMode::Parallel => {
            if params.ordered {
                run_ordered(outer, cancel)
            } else {
                run_unordered(outer, cancel)
            }
        }
    }
}

/// General form: `parent` produces operators, which are flattened into their combined output.
pub struct FlattenOp<P, Src, T> {
    parent: P,
    params: ExecParams,
    _marker: PhantomData<fn() -> (Src, T)>,
}

impl<P, Src, T> Operator<T> for FlattenOp<P, Src, T>
where
    P: Operator<Src>,
    Src: IntoInnerStream<T>,
    T: Send + 'static,
{
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        FlattenOp {
            parent: self.parent.with_params(params),
            params,
            _marker: PhantomData,
        }
    }

    fn iterate(&self, cancel: CancellationToken) -> BoxStream<T> {
        let outer = self.parent.iterate(cancel.clone());
        iterate_flatten(outer, self.params, cancel)
    }
}

pub trait FlattenExt<Src, T>: Operator<Src> + Sized
where
    Src: IntoInnerStream<T>,
    T: Send + 'static,
{
    fn flatten(self) -> FlattenOp<Self, Src, T> {
        let params = self.params();
        FlattenOp { parent: self, params, _marker: PhantomData }
    }
}

impl<P, Src, T> FlattenExt<Src, T> for P
where
    P: Operator<Src>,
    Src: IntoInnerStream<T>,
    T: Send + 'static,
{
}

/// Literal-list form: children are accumulated directly rather than produced by an upstream
/// operator. `concat`/`push` extend the list in place (the "Concatable" fusion of §4.2).
pub struct FlattenLiteralOp<T> {
    children: Vec<Arc<dyn DynOperator<T>>>,
    params: ExecParams,
}

impl<T: Send + 'static> FlattenLiteralOp<T> {
    pub fn new(children: Vec<Arc<dyn DynOperator<T>>>) -> Self {
        FlattenLiteralOp { children, params: ExecParams::sequential() }
    }

    pub fn from_operators<O: Operator<T> + 'static>(children: Vec<O>) -> Self {
        FlattenLiteralOp::new(children.into_iter().map(|c| Arc::new(c) as Arc<dyn DynOperator<T>>).collect())
    }

    /// Fuses: grows the existing list instead of nesting a new `Flatten`/`Concat` around it.
    pub fn push(mut self, child: impl Operator<T> + 'static) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    /// Fuses, mirroring `StructuralExt::concat`'s name so it shadows the blanket version.
    pub fn concat(self, other: impl Operator<T> + 'static) -> Self {
        self.push(other)
    }
}

impl<T: Send + 'static> Operator<T> for FlattenLiteralOp<T> {
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        FlattenLiteralOp {
            children: self.children.iter().map(|c| c.with_params_dyn(params)).collect(),
            params,
        }
    }

    fn iterate(&self, cancel: CancellationToken) -> BoxStream<T> {
        let outer: BoxStream<Arc<dyn DynOperator<T>>> = Box::pin(stream::iter(self.children.clone().into_iter().map(Ok)));
        iterate_flatten(outer, self.params, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::select_where::SelectWhereExt as _;
    use crate::op::source::FromEnumerableOp;
    use crate::params::ExecMode;
    use futures::executor::block_on;
    use futures::StreamExt as _;
    use std::collections::HashSet;

    fn values<T: Send + 'static>(op: impl Operator<T>) -> Vec<T> {
        block_on(op.iterate(CancellationToken::new()).collect::<Vec<_>>())
            .into_iter()
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn sequential_flatten_preserves_outer_then_inner_order() {
        let outer = FromEnumerableOp::new(vec![
            FromEnumerableOp::new(vec![1, 2]),
            FromEnumerableOp::new(vec![3, 4]),
        ]);
        let flattened = FlattenOp {
            parent: outer,
            params: ExecParams::sequential(),
            _marker: PhantomData,
        };
        assert_eq!(values(flattened), vec![1, 2, 3, 4]);
    }

    #[test]
    fn literal_flatten_concat_extends_list() {
        let op = FlattenLiteralOp::from_operators(vec![FromEnumerableOp::new(vec![1, 2])]).concat(FromEnumerableOp::new(vec![3, 4]));
        assert_eq!(values(op), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn ordered_flatten_preserves_enqueue_order_under_concurrency() {
        let outer = FromEnumerableOp::new(vec![30u64, 10, 20]).select(|delay| {
            FromEnumerableOp::new(vec![delay]).select_async(move |d| async move {
                tokio::time::sleep(std::time::Duration::from_millis(d)).await;
                Ok::<_, crate::error::Msg>(d)
            })
        });
        let op = FlattenOp {
            parent: outer,
            params: ExecParams { mode: ExecMode::Concurrent, ordered: true },
            _marker: PhantomData,
        };
        assert_eq!(values(op), vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn unordered_flatten_yields_every_item_regardless_of_completion_order() {
        let outer = FromEnumerableOp::new(vec![30u64, 10, 20]).select(|delay| {
            FromEnumerableOp::new(vec![delay]).select_async(move |d| async move {
                tokio::time::sleep(std::time::Duration::from_millis(d)).await;
                Ok::<_, crate::error::Msg>(d)
            })
        });
        let op = FlattenOp {
            parent: outer,
            params: ExecParams { mode: ExecMode::Concurrent, ordered: false },
            _marker: PhantomData,
        };
        let out: HashSet<u64> = values(op).into_iter().collect();
        assert_eq!(out, HashSet::from([30, 10, 20]));
    }
}

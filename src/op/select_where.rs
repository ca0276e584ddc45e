//! `Select`/`Where`/`SelectAsync`/`WhereAsync` (§4.5), unified behind one runtime shape:
//! [`SelectWhereOutcome`] lets a single selector both transform and decide whether to keep an
//! item, so `select` is "always Keep", `where_` is "Keep the input unchanged or Skip", and the
//! two compose freely.
//!
//! Fusion (the "SelectWhere" capability of §4.2) is implemented as a constructor-time rewrite
//! using ordinary Rust method resolution: [`SelectWhereOp`] has *inherent* `select`/`where_`/
//! `select_async`/`where_async` methods that extend its already-composed selector in place
//! (`Selector::then`), while [`SelectWhereExt`] supplies the same method names as a blanket
//! extension trait for every other [`Operator`]. An inherent method always wins over a trait
//! method of the same name, so `stream.select(f).select(g)` produces one `SelectWhereOp` with a
//! two-stage selector, not two nested nodes — exactly the "closures compose" rule from §4.2,
//! with no runtime type inspection anywhere.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::{BoxStream, Operator};
use crate::error::QueryError;
use crate::params::{ExecMode, ExecParams};
use crate::runner::ErrorAggregate;

/// How many selector calls may be outstanding at once under `Concurrent`/`Parallel` (§4.1). A
/// plain constant rather than something user-configurable — nothing here calls for runtime
/// tuning, matching how a handful of other bounded channels in this crate use fixed constants.
const CONCURRENT_LIMIT: usize = 64;
const PARALLEL_LIMIT: usize = 32;

/// The result of applying one selector stage to an item: either a (possibly transformed) value
/// to keep, or a request to drop the item entirely.
pub enum SelectWhereOutcome<T> {
    Keep(T),
    Skip,
}

/// A type-erased, cheaply cloneable `In -> Outcome<Out>` step. Selector composition needs to
/// clone the previous stage into the closure driving the next one (`Selector::then`), which is
/// what the `Arc` buys here — plain closures generally aren't `Clone`.
pub struct SelectorFn<In, Out> {
    inner: Arc<dyn Fn(In) -> BoxFuture<'static, Result<SelectWhereOutcome<Out>, QueryError>> + Send + Sync>,
}

impl<In, Out> Clone for SelectorFn<In, Out> {
    fn clone(&self) -> Self {
        SelectorFn { inner: self.inner.clone() }
    }
}

impl<In: Send + 'static, Out: Send + 'static> SelectorFn<In, Out> {
    fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SelectWhereOutcome<Out>, QueryError>> + Send + 'static,
    {
        SelectorFn {
            inner: Arc::new(move |x| Box::pin(f(x)) as BoxFuture<'static, _>),
        }
    }

    pub fn call(&self, input: In) -> BoxFuture<'static, Result<SelectWhereOutcome<Out>, QueryError>> {
        (self.inner)(input)
    }

    /// Compose this stage with a following one: `Skip` short-circuits without running `next`.
    pub fn then<Next>(self, next: SelectorFn<Out, Next>) -> SelectorFn<In, Next>
    where
        Next: Send + 'static,
    {
        SelectorFn::new(move |input: In| {
            let this = self.clone();
            let next = next.clone();
            async move {
                match this.call(input).await? {
                    SelectWhereOutcome::Keep(mid) => next.call(mid).await,
                    SelectWhereOutcome::Skip => Ok(SelectWhereOutcome::Skip),
                }
            }
        })
    }

    pub fn map_sync<F>(f: F) -> Self
    where
        F: Fn(In) -> Out + Send + Sync + 'static,
    {
        SelectorFn::new(move |x| {
            let y = f(x);
            async move { Ok(SelectWhereOutcome::Keep(y)) }
        })
    }

    pub fn map_async<Fut, E, F>(f: F) -> Self
    where
        Fut: Future<Output = Result<Out, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(In) -> Fut + Send + Sync + 'static,
    {
        SelectorFn::new(move |x| {
            let fut = f(x);
            async move {
                match fut.await {
                    Ok(v) => Ok(SelectWhereOutcome::Keep(v)),
                    Err(e) => Err(QueryError::user_callback_failure(e)),
                }
            }
        })
    }
}

impl<T: Send + 'static> SelectorFn<T, T> {
    pub fn filter_sync<F>(p: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        SelectorFn::new(move |x: T| {
            let keep = p(&x);
            async move {
                Ok(if keep {
                    SelectWhereOutcome::Keep(x)
                } else {
                    SelectWhereOutcome::Skip
                })
            }
        })
    }
}

impl<T: Clone + Send + 'static> SelectorFn<T, T> {
    pub fn filter_async<Fut, E, F>(p: F) -> Self
    where
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
    {
        SelectorFn::new(move |x: T| {
            let probe = x.clone();
            let fut = p(probe);
            async move {
                match fut.await {
                    Ok(true) => Ok(SelectWhereOutcome::Keep(x)),
                    Ok(false) => Ok(SelectWhereOutcome::Skip),
                    Err(e) => Err(QueryError::user_callback_failure(e)),
                }
            }
        })
    }
}

/// The `Select`/`Where` node: a parent plus a (possibly fused) selector chain.
pub struct SelectWhereOp<P, In, Out> {
    parent: P,
    selector: SelectorFn<In, Out>,
    params: ExecParams,
}

impl<P, In, Out> SelectWhereOp<P, In, Out>
where
    P: Operator<In>,
    In: Send + 'static,
    Out: Send + 'static,
{
    fn new(parent: P, selector: SelectorFn<In, Out>) -> Self {
        let params = parent.params();
        SelectWhereOp { parent, selector, params }
    }

    /// Fuses: extends the existing selector chain instead of wrapping in a new node.
    pub fn select<V, F>(self, f: F) -> SelectWhereOp<P, In, V>
    where
        V: Send + 'static,
        F: Fn(Out) -> V + Send + Sync + 'static,
    {
        SelectWhereOp {
            parent: self.parent,
            selector: self.selector.then(SelectorFn::map_sync(f)),
            params: self.params,
        }
    }

    /// Fuses.
    pub fn where_<F>(self, p: F) -> SelectWhereOp<P, In, Out>
    where
        F: Fn(&Out) -> bool + Send + Sync + 'static,
    {
        SelectWhereOp {
            parent: self.parent,
            selector: self.selector.then(SelectorFn::filter_sync(p)),
            params: self.params,
        }
    }

    /// Fuses.
    pub fn select_async<V, Fut, E, F>(self, f: F) -> SelectWhereOp<P, In, V>
    where
        V: Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(Out) -> Fut + Send + Sync + 'static,
    {
        SelectWhereOp {
            parent: self.parent,
            selector: self.selector.then(SelectorFn::map_async(f)),
            params: self.params,
        }
    }

    /// Fuses.
    pub fn where_async<Fut, E, F>(self, p: F) -> SelectWhereOp<P, In, Out>
    where
        Out: Clone,
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(Out) -> Fut + Send + Sync + 'static,
    {
        SelectWhereOp {
            parent: self.parent,
            selector: self.selector.then(SelectorFn::filter_async(p)),
            params: self.params,
        }
    }
}

impl<P, In, Out> Operator<Out> for SelectWhereOp<P, In, Out>
where
    P: Operator<In>,
    In: Send + 'static,
    Out: Send + 'static,
{
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        SelectWhereOp {
            parent: self.parent.with_params(params),
            selector: self.selector.clone(),
            params,
        }
    }

    fn iterate(&self, cancel: CancellationToken) -> BoxStream<Out> {
        let parent_stream = self.parent.iterate(cancel.clone());
        let selector = self.selector.clone();
        match self.params.mode {
            ExecMode::Sequential => run_sequential(parent_stream, selector, cancel),
            ExecMode::Concurrent => run_overlapped(parent_stream, selector, self.params.ordered, CONCURRENT_LIMIT, false, cancel),
            ExecMode::Parallel => run_overlapped(parent_stream, selector, self.params.ordered, PARALLEL_LIMIT, true, cancel),
        }
    }
}

fn run_sequential<In, Out>(mut parent: BoxStream<In>, selector: SelectorFn<In, Out>, cancel: CancellationToken) -> BoxStream<Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    Box::pin(stream::unfold(false, move |done| {
        let selector = selector.clone();
        let cancel = cancel.clone();
        async move {
            if done {
                return None;
            }
            loop {
                if cancel.is_cancelled() {
                    return Some((Err(QueryError::Canceled), true));
                }
                match parent.next().await {
                    None => return None,
                    Some(Err(e)) => return Some((Err(e), true)),
                    Some(Ok(v)) => match selector.call(v).await {
                        Ok(SelectWhereOutcome::Keep(o)) => return Some((Ok(o), false)),
                        Ok(SelectWhereOutcome::Skip) => continue,
                        Err(e) => return Some((Err(e), true)),
                    },
                }
            }
        }
    }))
}

/// Shared implementation of the Concurrent/Parallel runners: selector calls overlap via
/// `buffered`/`buffer_unordered`, with `spawn` adding true task-level parallelism for the
/// `Parallel` mode. Failures are accumulated (not surfaced immediately) so that several
/// concurrently-failing selector calls collapse into one terminal error per §7.
fn run_overlapped<In, Out>(
    parent: BoxStream<In>,
    selector: SelectorFn<In, Out>,
    ordered: bool,
    limit: usize,
    spawn: bool,
    cancel: CancellationToken,
) -> BoxStream<Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    let mapped = parent.map(move |item| -> BoxFuture<'static, Result<Option<Out>, QueryError>> {
        let selector = selector.clone();
        match item {
            Err(e) => Box::pin(futures::future::ready(Err(e))),
            Ok(v) => {
                if spawn {
                    Box::pin(async move {
                        match tokio::spawn(async move { selector.call(v).await }).await {
                            Ok(Ok(SelectWhereOutcome::Keep(o))) => Ok(Some(o)),
                            Ok(Ok(SelectWhereOutcome::Skip)) => Ok(None),
                            Ok(Err(e)) => Err(e),
                            Err(join_err) => Err(QueryError::user_callback_failure(join_err)),
                        }
                    })
                } else {
                    Box::pin(async move {
                        match selector.call(v).await? {
                            SelectWhereOutcome::Keep(o) => Ok(Some(o)),
                            SelectWhereOutcome::Skip => Ok(None),
                        }
                    })
                }
            }
        }
    });
    let results: futures::stream::BoxStream<'static, Result<Option<Out>, QueryError>> = if ordered {
        mapped.buffered(limit).boxed()
    } else {
        mapped.buffer_unordered(limit).boxed()
    };
    finish_with_aggregate(results, cancel)
}

fn finish_with_aggregate<Out>(
    mut results: futures::stream::BoxStream<'static, Result<Option<Out>, QueryError>>,
    cancel: CancellationToken,
) -> BoxStream<Out>
where
    Out: Send + 'static,
{
    Box::pin(stream::unfold(
        (ErrorAggregate::new(), false),
        move |(mut agg, done)| {
            let cancel = cancel.clone();
            async move {
                if done {
                    return None;
                }
                loop {
                    if cancel.is_cancelled() {
                        let err = agg.into_error().unwrap_or(QueryError::Canceled);
                        return Some((Err(err), (ErrorAggregate::new(), true)));
                    }
                    match results.next().await {
                        Some(Ok(Some(v))) => return Some((Ok(v), (agg, false))),
                        Some(Ok(None)) => continue,
                        Some(Err(e)) => {
                            agg.push(e);
                            continue;
                        }
                        None => {
                            return match agg.into_error() {
                                Some(err) => Some((Err(err), (ErrorAggregate::new(), true))),
                                None => None,
                            };
                        }
                    }
                }
            }
        },
    ))
}

/// Blanket combinator surface: any [`Operator`] gets `select`/`where_`/`select_async`/
/// `where_async`. A concrete type with its own inherent method of the same name (currently just
/// [`SelectWhereOp`] itself) shadows this and fuses instead of wrapping.
pub trait SelectWhereExt<T: Send + 'static>: Operator<T> + Sized {
    fn select<U, F>(self, f: F) -> SelectWhereOp<Self, T, U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        SelectWhereOp::new(self, SelectorFn::map_sync(f))
    }

    fn where_<F>(self, p: F) -> SelectWhereOp<Self, T, T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        SelectWhereOp::new(self, SelectorFn::filter_sync(p))
    }

    fn select_async<U, Fut, E, F>(self, f: F) -> SelectWhereOp<Self, T, U>
    where
        U: Send + 'static,
        Fut: Future<Output = Result<U, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
    {
        SelectWhereOp::new(self, SelectorFn::map_async(f))
    }

    fn where_async<Fut, E, F>(self, p: F) -> SelectWhereOp<Self, T, T>
    where
        T: Clone,
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
    {
        SelectWhereOp::new(self, SelectorFn::filter_async(p))
    }
}

impl<T: Send + 'static, O: Operator<T>> SelectWhereExt<T> for O {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::source::FromEnumerableOp;
    use futures::executor::block_on;
    use futures::StreamExt as _;

    fn collect<T: Send + 'static>(op: impl Operator<T>) -> Vec<Result<T, QueryError>> {
        block_on(op.iterate(CancellationToken::new()).collect())
    }

    #[test]
    fn select_maps_every_item() {
        let op = FromEnumerableOp::new(vec![1, 2, 3]).select(|x| x * 10);
        let out: Vec<i32> = collect(op).into_iter().map(Result::unwrap).collect();
        assert_eq!(out, vec![10, 20, 30]);
    }

    #[test]
    fn where_filters_in_place() {
        let op = FromEnumerableOp::new(vec![1, 2, 3, 4]).where_(|x| x % 2 == 0);
        let out: Vec<i32> = collect(op).into_iter().map(Result::unwrap).collect();
        assert_eq!(out, vec![2, 4]);
    }

    #[test]
    fn chained_select_where_fuses_into_one_node() {
        let op = FromEnumerableOp::new(vec![1, 2, 3, 4, 5])
            .select(|x| x + 1)
            .where_(|x| x % 2 == 0)
            .select(|x| x * 100);
        let out: Vec<i32> = collect(op).into_iter().map(Result::unwrap).collect();
        // +1: 2,3,4,5,6 ; even: 2,4,6 ; *100: 200,400,600
        assert_eq!(out, vec![200, 400, 600]);
    }

    #[tokio::test]
    async fn select_async_runs_concurrently_and_preserves_order() {
        let op = FromEnumerableOp::new(vec![3u64, 1, 2])
            .select_async(|n: u64| async move {
                tokio::time::sleep(std::time::Duration::from_millis(n)).await;
                Ok::<_, crate::error::Msg>(n)
            })
            .with_params(ExecParams::sequential().with_mode(ExecMode::Concurrent));
        let out: Vec<u64> = op
            .iterate(CancellationToken::new())
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(out, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn select_where_propagates_cancellation() {
        let op = FromEnumerableOp::new(vec![1, 2, 3]).select(|x| x);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out: Vec<_> = op.iterate(cancel).collect().await;
        assert!(matches!(out.last(), Some(Err(QueryError::Canceled))));
    }

    #[tokio::test]
    async fn user_callback_failure_surfaces_from_select_async() {
        let op = FromEnumerableOp::new(vec![1, 2]).select_async(|_: i32| async move { Err::<i32, _>(crate::error::Msg::new("boom")) });
        let out: Vec<_> = op.iterate(CancellationToken::new()).collect().await;
        assert!(matches!(out[0], Err(QueryError::UserCallbackFailure(_))));
    }
}

//! `Prepend`/`Append`/`AsyncPrepend`/`AsyncAppend`/`Concat`/`Take`/`Skip` (§4.4).
//!
//! These are generic fallback wrappers, used whenever the parent isn't one of the source leaves
//! in [`crate::op::source`] that already fuses the same operation into itself. As with
//! `select_where`, fusion happens through inherent methods on the fusable leaf types shadowing
//! the blanket [`StructuralExt`] methods of the same name — nothing here needs to inspect its
//! parent's type.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::flatten::FlattenLiteralOp;
use super::{BoxStream, DynOperator, Operator};
use crate::error::QueryError;
use crate::params::{ExecMode, ExecParams};

/// A type-erased, cheaply cloneable thunk producing a single value asynchronously, used by
/// `AsyncPrepend`/`AsyncAppend`. Mirrors `select_where::SelectorFn`'s erasure for the same reason:
/// the closure must be callable once per independent `iterate` call.
struct AsyncValue<T> {
    inner: Arc<dyn Fn() -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync>,
}

impl<T> Clone for AsyncValue<T> {
    fn clone(&self) -> Self {
        AsyncValue { inner: self.inner.clone() }
    }
}

impl<T: Send + 'static> AsyncValue<T> {
    fn new<F, Fut, E>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        AsyncValue {
            inner: Arc::new(move || {
                let fut = f();
                Box::pin(async move { fut.await.map_err(QueryError::user_callback_failure) }) as BoxFuture<'static, _>
            }),
        }
    }

    async fn get(&self) -> Result<T, QueryError> {
        (self.inner)().await
    }
}

/// The one-element stream `Prepend`/`Append` delegate to under `Concurrent`: just the value,
/// already available, so there's nothing to offload.
struct ValueOp<T> {
    value: T,
    params: ExecParams,
}

impl<T: Clone + Send + 'static> Operator<T> for ValueOp<T> {
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        ValueOp {
            value: self.value.clone(),
            params,
        }
    }

    fn iterate(&self, _cancel: CancellationToken) -> BoxStream<T> {
        stream::once(futures::future::ready(Ok(self.value.clone()))).boxed()
    }
}

/// As [`ValueOp`], but under `Parallel` the value is handed off to `spawn_blocking`, matching the
/// worker-pool offload `join`/`select_where` already apply to their own `Parallel`-mode work.
struct WorkerValueOp<T> {
    value: T,
    params: ExecParams,
}

impl<T: Clone + Send + 'static> Operator<T> for WorkerValueOp<T> {
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        WorkerValueOp {
            value: self.value.clone(),
            params,
        }
    }

    fn iterate(&self, _cancel: CancellationToken) -> BoxStream<T> {
        let value = self.value.clone();
        stream::once(async move {
            match tokio::task::spawn_blocking(move || value).await {
                Ok(v) => Ok(v),
                Err(join_err) => Err(QueryError::user_callback_failure(join_err)),
            }
        })
        .boxed()
    }
}

/// The one-element stream `AsyncPrepend`/`AsyncAppend` delegate to: runs the thunk to completion
/// as its single item. Under `Parallel` the await itself runs on a blocking worker, the same
/// "synchronous-shaped work moves to `spawn_blocking`" contract `join`/`select_where` apply.
struct AsyncValueOp<T> {
    producer: AsyncValue<T>,
    parallel: bool,
    params: ExecParams,
}

impl<T: Send + 'static> Operator<T> for AsyncValueOp<T> {
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        AsyncValueOp {
            producer: self.producer.clone(),
            parallel: self.parallel,
            params,
        }
    }

    fn iterate(&self, _cancel: CancellationToken) -> BoxStream<T> {
        let producer = self.producer.clone();
        let parallel = self.parallel;
        stream::once(async move {
            if parallel {
                match tokio::task::spawn_blocking(move || futures::executor::block_on(producer.get())).await {
                    Ok(result) => result,
                    Err(join_err) => Err(QueryError::user_callback_failure(join_err)),
                }
            } else {
                producer.get().await
            }
        })
        .boxed()
    }
}

/// `Take(n)`: stop once `n` successful items have been produced. An error from the parent still
/// propagates and ends the stream, even if fewer than `n` items were seen.
pub struct TakeOp<P, T> {
    parent: P,
    n: usize,
    params: ExecParams,
    _marker: PhantomData<fn() -> T>,
}

impl<P, T> Operator<T> for TakeOp<P, T>
where
    P: Operator<T>,
    T: Send + 'static,
{
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        TakeOp {
            parent: self.parent.with_params(params),
            n: self.n,
            params,
            _marker: PhantomData,
        }
    }

    fn iterate(&self, cancel: CancellationToken) -> BoxStream<T> {
        let parent = self.parent.iterate(cancel);
        let n = self.n;
        Box::pin(stream::unfold((parent, 0usize), move |(mut parent, taken)| async move {
            if taken >= n {
                return None;
            }
            match parent.next().await {
                None => None,
                // Force every later poll to stop, without needing a separate "done" flag.
                Some(Err(e)) => Some((Err(e), (parent, n))),
                Some(Ok(v)) => Some((Ok(v), (parent, taken + 1))),
            }
        }))
    }
}

/// `Skip(n)`: drop the first `n` successful items. An error seen while skipping still propagates.
pub struct SkipOp<P, T> {
    parent: P,
    n: usize,
    params: ExecParams,
    _marker: PhantomData<fn() -> T>,
}

impl<P, T> Operator<T> for SkipOp<P, T>
where
    P: Operator<T>,
    T: Send + 'static,
{
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        SkipOp {
            parent: self.parent.with_params(params),
            n: self.n,
            params,
            _marker: PhantomData,
        }
    }

    fn iterate(&self, cancel: CancellationToken) -> BoxStream<T> {
        let parent = self.parent.iterate(cancel);
        let n = self.n;
        Box::pin(stream::unfold((parent, 0usize), move |(mut parent, mut skipped)| async move {
            loop {
                match parent.next().await {
                    None => return None,
                    Some(Err(e)) => return Some((Err(e), (parent, skipped))),
                    Some(Ok(v)) => {
                        if skipped < n {
                            skipped += 1;
                            continue;
                        }
                        return Some((Ok(v), (parent, skipped)));
                    }
                }
            }
        }))
    }
}

/// `Prepend(x)`: emit `x` first, then the parent's sequence unchanged (including its errors).
pub struct PrependOp<P, T> {
    parent: P,
    value: T,
    params: ExecParams,
}

impl<P, T> Operator<T> for PrependOp<P, T>
where
    P: Operator<T> + 'static,
    T: Clone + Send + 'static,
{
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        PrependOp {
            parent: self.parent.with_params(params),
            value: self.value.clone(),
            params,
        }
    }

    fn iterate(&self, cancel: CancellationToken) -> BoxStream<T> {
        match self.params.mode {
            ExecMode::Sequential => {
                let head = stream::once(futures::future::ready(Ok(self.value.clone())));
                Box::pin(head.chain(self.parent.iterate(cancel)))
            }
            ExecMode::Concurrent => {
                let head = ValueOp { value: self.value.clone(), params: self.params };
                concat_op(head, self.parent.with_params(self.params), self.params).iterate(cancel)
            }
            ExecMode::Parallel => {
                let head = WorkerValueOp { value: self.value.clone(), params: self.params };
                concat_op(head, self.parent.with_params(self.params), self.params).iterate(cancel)
            }
        }
    }
}

enum AppendState<T> {
    Parent(BoxStream<T>),
    Done,
}

/// `Append(x)`: forward the parent's sequence, then emit `x` — but only if the parent ended
/// cleanly. An error from the parent ends the stream without ever producing `x` (§3's "once an
/// error item is produced, nothing follows" invariant).
pub struct AppendOp<P, T> {
    parent: P,
    value: T,
    params: ExecParams,
}

impl<P, T> Operator<T> for AppendOp<P, T>
where
    P: Operator<T> + 'static,
    T: Clone + Send + 'static,
{
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        AppendOp {
            parent: self.parent.with_params(params),
            value: self.value.clone(),
            params,
        }
    }

    fn iterate(&self, cancel: CancellationToken) -> BoxStream<T> {
        match self.params.mode {
            ExecMode::Sequential => {
                let parent = self.parent.iterate(cancel);
                let value = self.value.clone();
                Box::pin(stream::unfold(AppendState::Parent(parent), move |state| {
                    let value = value.clone();
                    async move {
                        match state {
                            AppendState::Parent(mut parent) => match parent.next().await {
                                Some(Err(e)) => Some((Err(e), AppendState::Done)),
                                Some(Ok(v)) => Some((Ok(v), AppendState::Parent(parent))),
                                None => Some((Ok(value), AppendState::Done)),
                            },
                            AppendState::Done => None,
                        }
                    }
                }))
            }
            ExecMode::Concurrent => {
                let tail = ValueOp { value: self.value.clone(), params: self.params };
                concat_op(self.parent.with_params(self.params), tail, self.params).iterate(cancel)
            }
            ExecMode::Parallel => {
                let tail = WorkerValueOp { value: self.value.clone(), params: self.params };
                concat_op(self.parent.with_params(self.params), tail, self.params).iterate(cancel)
            }
        }
    }
}

enum AsyncPrependState<T> {
    Pending,
    Parent(BoxStream<T>),
    Done,
}

/// `AsyncPrepend`: like `Prepend`, but the value is produced by an async callback. A failing
/// callback ends the stream immediately, without ever touching the parent.
pub struct AsyncPrependOp<P, T> {
    parent: P,
    producer: AsyncValue<T>,
    params: ExecParams,
}

impl<P, T> Operator<T> for AsyncPrependOp<P, T>
where
    P: Operator<T> + 'static,
    T: Send + 'static,
{
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        AsyncPrependOp {
            parent: self.parent.with_params(params),
            producer: self.producer.clone(),
            params,
        }
    }

    fn iterate(&self, cancel: CancellationToken) -> BoxStream<T> {
        match self.params.mode {
            ExecMode::Sequential => {
                let parent = self.parent.iterate(cancel);
                let producer = self.producer.clone();
                Box::pin(stream::unfold(
                    (AsyncPrependState::Pending, Some(parent)),
                    move |(state, parent_opt)| {
                        let producer = producer.clone();
                        async move {
                            match state {
                                AsyncPrependState::Pending => match producer.get().await {
                                    Ok(v) => Some((Ok(v), (AsyncPrependState::Parent(parent_opt.unwrap()), None))),
                                    Err(e) => Some((Err(e), (AsyncPrependState::Done, None))),
                                },
                                AsyncPrependState::Parent(mut parent) => match parent.next().await {
                                    Some(item) => Some((item, (AsyncPrependState::Parent(parent), None))),
                                    None => None,
                                },
                                AsyncPrependState::Done => None,
                            }
                        }
                    },
                ))
            }
            // The thunk is handed to `Flatten`'s per-child spawn before the parent stream is ever
            // built, so its latency overlaps parent consumption rather than gating it (§4.4).
            ExecMode::Concurrent => {
                let head = AsyncValueOp { producer: self.producer.clone(), parallel: false, params: self.params };
                concat_op(head, self.parent.with_params(self.params), self.params).iterate(cancel)
            }
            ExecMode::Parallel => {
                let head = AsyncValueOp { producer: self.producer.clone(), parallel: true, params: self.params };
                concat_op(head, self.parent.with_params(self.params), self.params).iterate(cancel)
            }
        }
    }
}

enum AsyncAppendState<T> {
    Parent(BoxStream<T>),
    Done,
}

/// `AsyncAppend`: like `Append`, the trailing value is produced asynchronously after the parent
/// ends cleanly; a failing callback surfaces as the stream's final (and only additional) error.
pub struct AsyncAppendOp<P, T> {
    parent: P,
    producer: AsyncValue<T>,
    params: ExecParams,
}

impl<P, T> Operator<T> for AsyncAppendOp<P, T>
where
    P: Operator<T> + 'static,
    T: Send + 'static,
{
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        AsyncAppendOp {
            parent: self.parent.with_params(params),
            producer: self.producer.clone(),
            params,
        }
    }

    fn iterate(&self, cancel: CancellationToken) -> BoxStream<T> {
        match self.params.mode {
            ExecMode::Sequential => {
                let parent = self.parent.iterate(cancel);
                let producer = self.producer.clone();
                Box::pin(stream::unfold(AsyncAppendState::Parent(parent), move |state| {
                    let producer = producer.clone();
                    async move {
                        match state {
                            AsyncAppendState::Parent(mut parent) => match parent.next().await {
                                Some(Err(e)) => Some((Err(e), AsyncAppendState::Done)),
                                Some(Ok(v)) => Some((Ok(v), AsyncAppendState::Parent(parent))),
                                None => match producer.get().await {
                                    Ok(v) => Some((Ok(v), AsyncAppendState::Done)),
                                    Err(e) => Some((Err(e), AsyncAppendState::Done)),
                                },
                            },
                            AsyncAppendState::Done => None,
                        }
                    }
                }))
            }
            ExecMode::Concurrent => {
                let tail = AsyncValueOp { producer: self.producer.clone(), parallel: false, params: self.params };
                concat_op(self.parent.with_params(self.params), tail, self.params).iterate(cancel)
            }
            ExecMode::Parallel => {
                let tail = AsyncValueOp { producer: self.producer.clone(), parallel: true, params: self.params };
                concat_op(self.parent.with_params(self.params), tail, self.params).iterate(cancel)
            }
        }
    }
}

enum ConcatPhase<T> {
    First(BoxStream<T>, BoxStream<T>),
    Second(BoxStream<T>),
    Stopped,
}

/// `Concat`: the sequential chaining of two pipelines, with the same "an error stops everything"
/// discipline as `Append`. `Sequential` drains `a` then `b` directly; `Concurrent`/`Parallel`
/// delegate to a two-element [`FlattenLiteralOp`] so both sides are spawned and make progress
/// independently of which one the consumer is currently reading from (§4.4) — the same overlap
/// `flatten.rs`'s per-child spawn already gives the general `Flatten` case.
pub struct ConcatOp<A, B, T> {
    a: A,
    b: B,
    params: ExecParams,
    _marker: PhantomData<fn() -> T>,
}

/// Builds a [`ConcatOp`] directly, used by `Prepend`/`Append`/`AsyncPrepend`/`AsyncAppend`'s own
/// `Concurrent`/`Parallel` arms to express themselves "as `Concat` with a one-element stream"
/// rather than duplicating `ConcatOp`'s delegation logic.
fn concat_op<A, B, T>(a: A, b: B, params: ExecParams) -> ConcatOp<A, B, T> {
    ConcatOp { a, b, params, _marker: PhantomData }
}

impl<A, B, T> Operator<T> for ConcatOp<A, B, T>
where
    A: Operator<T> + 'static,
    B: Operator<T> + 'static,
    T: Send + 'static,
{
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        ConcatOp {
            a: self.a.with_params(params),
            b: self.b.with_params(params),
            params,
            _marker: PhantomData,
        }
    }

    fn iterate(&self, cancel: CancellationToken) -> BoxStream<T> {
        match self.params.mode {
            ExecMode::Sequential => {
                let a = self.a.iterate(cancel.clone());
                let b = self.b.iterate(cancel);
                Box::pin(stream::unfold(ConcatPhase::First(a, b), |phase| async move {
                    match phase {
                        ConcatPhase::Stopped => None,
                        ConcatPhase::First(mut a, b) => {
                            loop {
                                match a.next().await {
                                    Some(Err(e)) => return Some((Err(e), ConcatPhase::Stopped)),
                                    Some(Ok(v)) => return Some((Ok(v), ConcatPhase::First(a, b))),
                                    None => break,
                                }
                            }
                            let mut b = b;
                            match b.next().await {
                                Some(Err(e)) => Some((Err(e), ConcatPhase::Stopped)),
                                Some(Ok(v)) => Some((Ok(v), ConcatPhase::Second(b))),
                                None => None,
                            }
                        }
                        ConcatPhase::Second(mut b) => match b.next().await {
                            Some(Err(e)) => Some((Err(e), ConcatPhase::Stopped)),
                            Some(Ok(v)) => Some((Ok(v), ConcatPhase::Second(b))),
                            None => None,
                        },
                    }
                }))
            }
            ExecMode::Concurrent | ExecMode::Parallel => {
                let a: Arc<dyn DynOperator<T>> = Arc::new(self.a.with_params(self.params));
                let b: Arc<dyn DynOperator<T>> = Arc::new(self.b.with_params(self.params));
                FlattenLiteralOp::new(vec![a, b]).with_params(self.params).iterate(cancel)
            }
        }
    }
}

/// Blanket combinator surface. Source leaves in [`crate::op::source`] shadow `take`/`skip`/
/// `prepend`/`append` with fused, inherent versions of the same name.
pub trait StructuralExt<T: Send + 'static>: Operator<T> + Sized {
    fn take(self, n: usize) -> TakeOp<Self, T> {
        let params = self.params();
        TakeOp { parent: self, n, params, _marker: PhantomData }
    }

    fn skip(self, n: usize) -> SkipOp<Self, T> {
        let params = self.params();
        SkipOp { parent: self, n, params, _marker: PhantomData }
    }

    fn prepend(self, value: T) -> PrependOp<Self, T>
    where
        T: Clone,
    {
        let params = self.params();
        PrependOp { parent: self, value, params }
    }

    fn append(self, value: T) -> AppendOp<Self, T>
    where
        T: Clone,
    {
        let params = self.params();
        AppendOp { parent: self, value, params }
    }

    fn prepend_async<F, Fut, E>(self, producer: F) -> AsyncPrependOp<Self, T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let params = self.params();
        AsyncPrependOp {
            parent: self,
            producer: AsyncValue::new(producer),
            params,
        }
    }

    fn append_async<F, Fut, E>(self, producer: F) -> AsyncAppendOp<Self, T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let params = self.params();
        AsyncAppendOp {
            parent: self,
            producer: AsyncValue::new(producer),
            params,
        }
    }

    fn concat<B>(self, other: B) -> ConcatOp<Self, B, T>
    where
        B: Operator<T>,
    {
        let params = self.params();
        ConcatOp { a: self, b: other, params, _marker: PhantomData }
    }
}

impl<T: Send + 'static, O: Operator<T>> StructuralExt<T> for O {}

#[cfg(test)]
mod tests {
    use super::super::select_where::SelectWhereExt as _;
    use super::*;
    use crate::op::source::{EmptyOp, FromEnumerableOp};
    use futures::executor::block_on;
    use futures::StreamExt as _;

    fn values<T: Send + 'static>(op: impl Operator<T>) -> Vec<T> {
        block_on(op.iterate(CancellationToken::new()).collect::<Vec<_>>())
            .into_iter()
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn take_stops_at_count() {
        let op = FromEnumerableOp::new(vec![1, 2, 3]).select(|x| x).take(2);
        assert_eq!(values(op), vec![1, 2]);
    }

    #[test]
    fn skip_drops_prefix() {
        let op = FromEnumerableOp::new(vec![1, 2, 3]).select(|x| x).skip(1);
        assert_eq!(values(op), vec![2, 3]);
    }

    #[test]
    fn prepend_adds_to_front() {
        let op = FromEnumerableOp::new(vec![2, 3]).select(|x| x).prepend(1);
        assert_eq!(values(op), vec![1, 2, 3]);
    }

    #[test]
    fn append_adds_to_back() {
        let op = FromEnumerableOp::new(vec![1, 2]).select(|x| x).append(3);
        assert_eq!(values(op), vec![1, 2, 3]);
    }

    #[test]
    fn concat_chains_two_pipelines() {
        let a = FromEnumerableOp::new(vec![1, 2]).select(|x| x);
        let b = FromEnumerableOp::new(vec![3, 4]).select(|x| x);
        assert_eq!(values(a.concat(b)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn concat_with_empty_left_yields_right_only() {
        let a: EmptyOp<i32> = EmptyOp::new();
        let b = FromEnumerableOp::new(vec![1, 2]);
        assert_eq!(values(a.concat(b)), vec![1, 2]);
    }

    #[tokio::test]
    async fn append_async_runs_after_parent_completes() {
        let op = FromEnumerableOp::new(vec![1, 2])
            .select(|x| x)
            .append_async(|| async { Ok::<_, crate::error::Msg>(3) });
        let out = values(op);
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn concurrent_prepend_still_yields_the_prepended_value_first() {
        let op = FromEnumerableOp::new(vec![2, 3])
            .select(|x| x)
            .with_params(ExecParams { mode: ExecMode::Concurrent, ordered: true })
            .prepend(1);
        let op = op.with_params(ExecParams { mode: ExecMode::Concurrent, ordered: true });
        let out: Vec<_> = op.iterate(CancellationToken::new()).collect().await;
        let out: Vec<i32> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn parallel_append_still_yields_the_appended_value_last() {
        let op = FromEnumerableOp::new(vec![1, 2])
            .select(|x| x)
            .with_params(ExecParams { mode: ExecMode::Parallel, ordered: true })
            .append(3);
        let op = op.with_params(ExecParams { mode: ExecMode::Parallel, ordered: true });
        let out: Vec<_> = op.iterate(CancellationToken::new()).collect().await;
        let out: Vec<i32> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn concurrent_async_prepend_overlaps_but_still_orders_its_value_first() {
        let op = FromEnumerableOp::new(vec![2, 3])
            .select(|x| x)
            .with_params(ExecParams { mode: ExecMode::Concurrent, ordered: true })
            .prepend_async(|| async {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                Ok::<_, crate::error::Msg>(1)
            });
        let op = op.with_params(ExecParams { mode: ExecMode::Concurrent, ordered: true });
        let out: Vec<_> = op.iterate(CancellationToken::new()).collect().await;
        let out: Vec<i32> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn concurrent_concat_preserves_enqueue_order() {
        let a = FromEnumerableOp::new(vec![1, 2]).select(|x| x);
        let b = FromEnumerableOp::new(vec![3, 4]).select(|x| x);
        let op = a
            .concat(b)
            .with_params(ExecParams { mode: ExecMode::Concurrent, ordered: true });
        let out: Vec<_> = op.iterate(CancellationToken::new()).collect().await;
        let out: Vec<i32> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn concurrent_concat_stops_at_first_sides_error_without_running_second() {
        let a = FromEnumerableOp::new(vec![1])
            .select(|x| x)
            .select_async(|_| async { Err::<i32, _>(crate::error::Msg::new("boom")) });
        let b = FromEnumerableOp::new(vec![2, 3]).select(|x| x);
        let op = a
            .concat(b)
            .with_params(ExecParams { mode: ExecMode::Concurrent, ordered: true });
        let out: Vec<_> = op.iterate(CancellationToken::new()).collect().await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
    }
}

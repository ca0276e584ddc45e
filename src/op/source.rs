//! Source leaves (§4.3): `Empty`, `Singleton`, `FromEnumerable`. These are the fusion targets
//! for `Prepend`/`Append`/`Take`/`Skip`: each exposes *inherent* methods of those names that
//! collapse the operation into a rebuilt leaf instead of stacking a wrapper node around it.
//! Inherent methods win over the blanket `QueryStreamExt` methods of the same name during
//! overload resolution, so `from_enumerable(xs).take(3)` picks the fused version below while
//! `select(f).take(3)` falls back to the generic `structural::TakeOp` (§4.2's "SkipTake" and
//! "ConcatEnumerables" fusion capabilities). Source leaves never produce `Err` items of their
//! own; argument validation happens before a node is ever built (see `crate::query_stream`).

use std::marker::PhantomData;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::{BoxStream, Operator};
use crate::params::ExecParams;

/// A source that produces no items. `any()` is false, `count()` is 0, and any `take`/`skip`
/// over it returns itself (there is nothing to slice).
#[derive(Debug, Clone)]
pub struct EmptyOp<T> {
    params: ExecParams,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EmptyOp<T> {
    pub fn new() -> Self {
        EmptyOp {
            params: ExecParams::sequential(),
            _marker: PhantomData,
        }
    }

    pub fn take(&self, _n: usize) -> Self {
        self.clone()
    }

    pub fn skip(&self, _n: usize) -> Self {
        self.clone()
    }
}

impl<T> Default for EmptyOp<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Operator<T> for EmptyOp<T> {
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        EmptyOp {
            params,
            _marker: PhantomData,
        }
    }

    fn iterate(&self, _cancel: CancellationToken) -> BoxStream<T> {
        stream::empty().boxed()
    }
}

/// A one-item source. `prepend`/`append` on it are fused into a two-element [`FromEnumerableOp`]
/// (§4.3).
#[derive(Debug, Clone)]
pub struct SingletonOp<T> {
    pub(crate) item: T,
    params: ExecParams,
}

impl<T> SingletonOp<T> {
    pub fn new(item: T) -> Self {
        SingletonOp {
            item,
            params: ExecParams::sequential(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SingletonOp<T> {
    pub fn prepend(&self, x: T) -> FromEnumerableOp<T> {
        FromEnumerableOp::new(vec![x, self.item.clone()])
    }

    pub fn append(&self, x: T) -> FromEnumerableOp<T> {
        FromEnumerableOp::new(vec![self.item.clone(), x])
    }
}

impl<T: Clone + Send + 'static> Operator<T> for SingletonOp<T> {
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        SingletonOp {
            item: self.item.clone(),
            params,
        }
    }

    fn iterate(&self, _cancel: CancellationToken) -> BoxStream<T> {
        stream::iter(std::iter::once(Ok(self.item.clone()))).boxed()
    }
}

/// An eagerly materialized, known-length source. Represented as a shared backing `Vec` plus a
/// `[start, start+len)` window so that `take`/`skip`/`prepend`/`append` chains collapse into a
/// single node instead of stacking wrappers (the `SkipTake` and `ConcatEnumerables` fusion
/// capabilities of §4.2).
#[derive(Debug, Clone)]
pub struct FromEnumerableOp<T> {
    pub(crate) items: Arc<Vec<T>>,
    pub(crate) start: usize,
    pub(crate) len: usize,
    params: ExecParams,
}

impl<T> FromEnumerableOp<T> {
    pub fn new(items: Vec<T>) -> Self {
        let len = items.len();
        FromEnumerableOp {
            items: Arc::new(items),
            start: 0,
            len,
            params: ExecParams::sequential(),
        }
    }

    /// Length of the window this node currently exposes (not the backing `Vec`'s length).
    pub fn window_len(&self) -> usize {
        self.len
    }
}

impl<T: Clone + Send + Sync + 'static> FromEnumerableOp<T> {
    /// A new node over `[x] ++ xs`. Fuses `Prepend`/`AsyncPrepend` onto this leaf.
    pub fn prepend(&self, x: T) -> Self {
        let mut items = Vec::with_capacity(self.len + 1);
        items.push(x);
        items.extend(self.items[self.start..self.start + self.len].iter().cloned());
        FromEnumerableOp::new(items)
    }

    /// A new node over `xs ++ [x]`. Fuses `Append`/`AsyncAppend` onto this leaf.
    pub fn append(&self, x: T) -> Self {
        let mut items: Vec<T> = self.items[self.start..self.start + self.len].to_vec();
        items.push(x);
        FromEnumerableOp::new(items)
    }

    /// The first `n` elements of the current window. Fuses `Take` onto this leaf.
    pub fn take(&self, n: usize) -> Self {
        FromEnumerableOp {
            items: self.items.clone(),
            start: self.start,
            len: self.len.min(n),
            params: self.params,
        }
    }

    /// The current window with the first `n` elements dropped. Fuses `Skip` onto this leaf.
    pub fn skip(&self, n: usize) -> Self {
        let n = n.min(self.len);
        FromEnumerableOp {
            items: self.items.clone(),
            start: self.start + n,
            len: self.len - n,
            params: self.params,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Operator<T> for FromEnumerableOp<T> {
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        FromEnumerableOp { params, ..self.clone() }
    }

    fn iterate(&self, _cancel: CancellationToken) -> BoxStream<T> {
        let slice = self.items[self.start..self.start + self.len].to_vec();
        stream::iter(slice.into_iter().map(Ok)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::StreamExt as _;

    #[test]
    fn empty_yields_nothing() {
        let op: EmptyOp<i32> = EmptyOp::new();
        let out: Vec<_> = block_on(op.iterate(CancellationToken::new()).collect());
        assert!(out.is_empty());
    }

    #[test]
    fn singleton_yields_one_item() {
        let op = SingletonOp::new(42);
        let out: Vec<_> = block_on(op.iterate(CancellationToken::new()).collect::<Vec<_>>());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), &42);
    }

    #[test]
    fn from_enumerable_round_trips() {
        let op = FromEnumerableOp::new(vec![1, 2, 3]);
        let out: Vec<i32> = block_on(op.iterate(CancellationToken::new()).map(Result::unwrap).collect());
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn take_slices_without_copying_backing_vec() {
        let op = FromEnumerableOp::new(vec![1, 2, 3, 4, 5]);
        let taken = op.take(2);
        assert!(Arc::ptr_eq(&taken.items, &op.items));
        let out: Vec<i32> = block_on(taken.iterate(CancellationToken::new()).map(Result::unwrap).collect());
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn skip_slices_without_copying_backing_vec() {
        let op = FromEnumerableOp::new(vec![1, 2, 3, 4, 5]);
        let skipped = op.skip(3);
        let out: Vec<i32> = block_on(skipped.iterate(CancellationToken::new()).map(Result::unwrap).collect());
        assert_eq!(out, vec![4, 5]);
    }

    #[test]
    fn take_beyond_length_yields_everything() {
        let op = FromEnumerableOp::new(vec![1, 2, 3]);
        let taken = op.take(10);
        assert_eq!(taken.window_len(), 3);
    }

    #[test]
    fn prepend_and_append_build_new_enumerable() {
        let op = FromEnumerableOp::new(vec![2, 3]);
        let out: Vec<i32> = block_on(op.prepend(1).iterate(CancellationToken::new()).map(Result::unwrap).collect());
        assert_eq!(out, vec![1, 2, 3]);
        let out: Vec<i32> = block_on(op.append(4).iterate(CancellationToken::new()).map(Result::unwrap).collect());
        assert_eq!(out, vec![2, 3, 4]);
    }

    #[test]
    fn singleton_prepend_append_produce_two_element_enumerable() {
        let op = SingletonOp::new(5);
        let out: Vec<i32> = block_on(op.prepend(4).iterate(CancellationToken::new()).map(Result::unwrap).collect());
        assert_eq!(out, vec![4, 5]);
        let out: Vec<i32> = block_on(op.append(6).iterate(CancellationToken::new()).map(Result::unwrap).collect());
        assert_eq!(out, vec![5, 6]);
    }

    #[test]
    fn empty_take_skip_return_itself() {
        let op: EmptyOp<i32> = EmptyOp::new();
        assert_eq!(op.take(5).params().mode, op.params().mode);
        let out: Vec<_> = block_on(op.skip(3).iterate(CancellationToken::new()).collect());
        assert!(out.is_empty());
    }
}

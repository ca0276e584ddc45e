//! Symmetric hash join (§4.7): two parents keyed by `key_a: &TA -> K` / `key_b: &TB -> K`,
//! paired into `result(a, b)` as matches are discovered.
//!
//! `Sequential` materializes both sides and produces the relational join in input-major order —
//! no hash table needed at that size of problem. `Concurrent`/`Parallel` run one task per side;
//! each, on receiving an item, takes a shared lock over both sides' `FnvHashMap<K, Vec<_>>`
//! buckets, records itself in its own bucket, copies a snapshot of the opposite bucket, and emits
//! a result for every match found in that snapshot — so output order is match-discovery order,
//! not input order (documented on [`JoinExt::join`], per §9's resolved open question). `Parallel`
//! additionally runs the key/result callbacks on `spawn_blocking`, matching the Parallel-mode
//! contract the other runners in this crate follow.

use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use fnv::FnvHashMap;
use futures::channel::mpsc;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{BoxStream, Operator};
use crate::error::QueryError;
use crate::params::{ExecMode, ExecParams};

pub struct JoinOp<A, B, TA, TB, K, R, FA, FB, FR> {
    a: A,
    b: B,
    key_a: Arc<FA>,
    key_b: Arc<FB>,
    result: Arc<FR>,
    params: ExecParams,
    _marker: PhantomData<fn() -> (TA, TB, K, R)>,
}

impl<A, B, TA, TB, K, R, FA, FB, FR> JoinOp<A, B, TA, TB, K, R, FA, FB, FR>
where
    A: Operator<TA>,
{
    fn new(a: A, b: B, key_a: FA, key_b: FB, result: FR) -> Self {
        let params = a.params();
        JoinOp {
            a,
            b,
            key_a: Arc::new(key_a),
            key_b: Arc::new(key_b),
            result: Arc::new(result),
            params,
            _marker: PhantomData,
        }
    }
}

impl<A, B, TA, TB, K, R, FA, FB, FR> Operator<R> for JoinOp<A, B, TA, TB, K, R, FA, FB, FR>
where
    A: Operator<TA>,
    B: Operator<TB>,
    TA: Clone + Send + Sync + 'static,
    TB: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    R: Send + 'static,
    FA: Fn(&TA) -> K + Send + Sync + 'static,
    FB: Fn(&TB) -> K + Send + Sync + 'static,
    FR: Fn(TA, TB) -> R + Send + Sync + 'static,
{
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        JoinOp {
            a: self.a.with_params(params),
            b: self.b.with_params(params),
            key_a: self.key_a.clone(),
            key_b: self.key_b.clone(),
            result: self.result.clone(),
            params,
            _marker: PhantomData,
        }
    }

    fn iterate(&self, cancel: CancellationToken) -> BoxStream<R> {
        match self.params.mode {
            ExecMode::Sequential => run_sequential(&self.a, &self.b, self.key_a.clone(), self.key_b.clone(), self.result.clone(), cancel),
            ExecMode::Concurrent => run_concurrent(&self.a, &self.b, self.key_a.clone(), self.key_b.clone(), self.result.clone(), false, cancel),
            ExecMode::Parallel => run_concurrent(&self.a, &self.b, self.key_a.clone(), self.key_b.clone(), self.result.clone(), true, cancel),
        }
    }
}

fn run_sequential<A, B, TA, TB, K, R, FA, FB, FR>(
    a: &A,
    b: &B,
    key_a: Arc<FA>,
    key_b: Arc<FB>,
    result: Arc<FR>,
    cancel: CancellationToken,
) -> BoxStream<R>
where
    A: Operator<TA>,
    B: Operator<TB>,
    TA: Clone + Send + Sync + 'static,
    TB: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    R: Send + 'static,
    FA: Fn(&TA) -> K + Send + Sync + 'static,
    FB: Fn(&TB) -> K + Send + Sync + 'static,
    FR: Fn(TA, TB) -> R + Send + Sync + 'static,
{
    let a_stream = a.iterate(cancel.clone());
    let b_stream = b.iterate(cancel.clone());
    let materialize = async move {
        let a_items: Vec<Result<TA, QueryError>> = a_stream.collect().await;
        let b_items: Vec<Result<TB, QueryError>> = b_stream.collect().await;
        let mut a_vals = Vec::with_capacity(a_items.len());
        for item in a_items {
            a_vals.push(item?);
        }
        let mut b_vals = Vec::with_capacity(b_items.len());
        for item in b_items {
            b_vals.push(item?);
        }
        if cancel.is_cancelled() {
            return Err(QueryError::Canceled);
        }
        let mut pairs = Vec::new();
        for av in &a_vals {
            let ka = (key_a)(av);
            for bv in &b_vals {
                if ka == (key_b)(bv) {
                    pairs.push((result)(av.clone(), bv.clone()));
                }
            }
        }
        Ok(pairs)
    };
    Box::pin(stream::once(materialize).flat_map(|outcome| -> futures::stream::BoxStream<'static, Result<R, QueryError>> {
        match outcome {
            Ok(pairs) => stream::iter(pairs.into_iter().map(Ok)).boxed(),
            Err(e) => stream::iter(std::iter::once(Err(e))).boxed(),
        }
    }))
}

type JoinTables<TA, TB, K> = Arc<Mutex<(FnvHashMap<K, Vec<TA>>, FnvHashMap<K, Vec<TB>>)>>;

fn run_concurrent<A, B, TA, TB, K, R, FA, FB, FR>(
    a: &A,
    b: &B,
    key_a: Arc<FA>,
    key_b: Arc<FB>,
    result: Arc<FR>,
    spawn: bool,
    cancel: CancellationToken,
) -> BoxStream<R>
where
    A: Operator<TA>,
    B: Operator<TB>,
    TA: Clone + Send + Sync + 'static,
    TB: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    R: Send + 'static,
    FA: Fn(&TA) -> K + Send + Sync + 'static,
    FB: Fn(&TB) -> K + Send + Sync + 'static,
    FR: Fn(TA, TB) -> R + Send + Sync + 'static,
{
    let tables: JoinTables<TA, TB, K> = Arc::new(Mutex::new((FnvHashMap::default(), FnvHashMap::default())));
    let (tx, rx) = mpsc::unbounded::<Result<R, QueryError>>();

    // The output channel closes once both side-tasks below drop their `tx` clone on exit — no
    // separate completion counter needed.
    let a_stream = a.iterate(cancel.clone());
    spawn_a_side(a_stream, tables.clone(), key_a, result.clone(), tx.clone(), spawn, cancel.clone());

    let b_stream = b.iterate(cancel.clone());
    spawn_b_side(b_stream, tables, key_b, result, tx, spawn, cancel);

    Box::pin(rx)
}

fn spawn_a_side<TA, TB, K, R, FA, FR>(
    mut stream: BoxStream<TA>,
    tables: JoinTables<TA, TB, K>,
    key_a: Arc<FA>,
    result: Arc<FR>,
    tx: mpsc::UnboundedSender<Result<R, QueryError>>,
    spawn: bool,
    cancel: CancellationToken,
) where
    TA: Clone + Send + Sync + 'static,
    TB: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    R: Send + 'static,
    FA: Fn(&TA) -> K + Send + Sync + 'static,
    FR: Fn(TA, TB) -> R + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = tx.unbounded_send(Err(QueryError::Canceled));
                    break;
                }
                item = stream.next() => match item {
                    None => break,
                    Some(Err(e)) => {
                        let _ = tx.unbounded_send(Err(e));
                        break;
                    }
                    Some(Ok(item)) => {
                        let key = if spawn {
                            let key_a = key_a.clone();
                            let probe = item.clone();
                            match tokio::task::spawn_blocking(move || (key_a)(&probe)).await {
                                Ok(k) => k,
                                Err(join_err) => {
                                    let _ = tx.unbounded_send(Err(QueryError::user_callback_failure(join_err)));
                                    continue;
                                }
                            }
                        } else {
                            (key_a)(&item)
                        };
                        let opposite: Vec<TB> = {
                            let mut guard = tables.lock();
                            guard.0.entry(key.clone()).or_default().push(item.clone());
                            guard.1.get(&key).cloned().unwrap_or_default()
                        };
                        for other in opposite {
                            let pair = if spawn {
                                let result = result.clone();
                                let a_item = item.clone();
                                match tokio::task::spawn_blocking(move || (result)(a_item, other)).await {
                                    Ok(r) => r,
                                    Err(join_err) => {
                                        let _ = tx.unbounded_send(Err(QueryError::user_callback_failure(join_err)));
                                        continue;
                                    }
                                }
                            } else {
                                (result)(item.clone(), other)
                            };
                            if tx.unbounded_send(Ok(pair)).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    });
}

fn spawn_b_side<TA, TB, K, R, FA, FB, FR>(
    mut stream: BoxStream<TB>,
    tables: JoinTables<TA, TB, K>,
    key_b: Arc<FB>,
    result: Arc<FR>,
    tx: mpsc::UnboundedSender<Result<R, QueryError>>,
    spawn: bool,
    cancel: CancellationToken,
) where
    TA: Clone + Send + Sync + 'static,
    TB: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    R: Send + 'static,
    FB: Fn(&TB) -> K + Send + Sync + 'static,
    FR: Fn(TA, TB) -> R + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = tx.unbounded_send(Err(QueryError::Canceled));
                    break;
                }
                item = stream.next() => match item {
                    None => break,
                    Some(Err(e)) => {
                        let _ = tx.unbounded_send(Err(e));
                        break;
                    }
                    Some(Ok(item)) => {
                        let key = if spawn {
                            let key_b = key_b.clone();
                            let probe = item.clone();
                            match tokio::task::spawn_blocking(move || (key_b)(&probe)).await {
                                Ok(k) => k,
                                Err(join_err) => {
                                    let _ = tx.unbounded_send(Err(QueryError::user_callback_failure(join_err)));
                                    continue;
                                }
                            }
                        } else {
                            (key_b)(&item)
                        };
                        let opposite: Vec<TA> = {
                            let mut guard = tables.lock();
                            guard.1.entry(key.clone()).or_default().push(item.clone());
                            guard.0.get(&key).cloned().unwrap_or_default()
                        };
                        for other in opposite {
                            let pair = if spawn {
                                let result = result.clone();
                                let b_item = item.clone();
                                match tokio::task::spawn_blocking(move || (result)(other, b_item)).await {
                                    Ok(r) => r,
                                    Err(join_err) => {
                                        let _ = tx.unbounded_send(Err(QueryError::user_callback_failure(join_err)));
                                        continue;
                                    }
                                }
                            } else {
                                (result)(other, item.clone())
                            };
                            if tx.unbounded_send(Ok(pair)).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    });
}

/// Blanket combinator surface: `self` contributes the `A`/"left" side.
///
/// Output order for `Concurrent`/`Parallel` is match-discovery order, not input-major order, and
/// this is true regardless of `ordered` — `ordered` still governs each side's own upstream
/// pipeline, not the pairing order `join` itself produces (§9).
pub trait JoinExt<TA: Send + 'static>: Operator<TA> + Sized {
    fn join<B, TB, K, R, FA, FB, FR>(self, other: B, key_a: FA, key_b: FB, result: FR) -> JoinOp<Self, B, TA, TB, K, R, FA, FB, FR>
    where
        B: Operator<TB>,
        TA: Clone + Sync,
        TB: Clone + Send + Sync + 'static,
        K: Eq + Hash + Clone + Send + Sync + 'static,
        R: Send + 'static,
        FA: Fn(&TA) -> K + Send + Sync + 'static,
        FB: Fn(&TB) -> K + Send + Sync + 'static,
        FR: Fn(TA, TB) -> R + Send + Sync + 'static,
    {
        JoinOp::new(self, other, key_a, key_b, result)
    }
}

impl<T: Send + 'static, O: Operator<T>> JoinExt<T> for O {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::source::FromEnumerableOp;
    use futures::executor::block_on;

    fn collect<T: Send + 'static>(op: impl Operator<T>) -> Vec<T> {
        block_on(op.iterate(CancellationToken::new()).collect::<Vec<_>>())
            .into_iter()
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn sequential_join_pairs_matching_keys() {
        let a = FromEnumerableOp::new(vec![1, 2, 3]);
        let b = FromEnumerableOp::new(vec![10, 20, 30, 40]);
        let op = a.join(b, |x: &i32| x % 2, |y: &i32| y % 2, |x, y| (x, y));
        let mut out = collect(op);
        out.sort();
        let mut expected = vec![];
        for x in [1, 2, 3] {
            for y in [10, 20, 30, 40] {
                if x % 2 == y % 2 {
                    expected.push((x, y));
                }
            }
        }
        expected.sort();
        assert_eq!(out, expected);
        assert_eq!(out.len(), 6);
    }

    #[tokio::test]
    async fn concurrent_join_produces_the_same_count_of_matches() {
        let a = FromEnumerableOp::new(vec![1, 2, 3]).with_params(ExecParams::sequential().with_mode(ExecMode::Concurrent));
        let b = FromEnumerableOp::new(vec![10, 20, 30, 40]);
        let op = a.join(b, |x: &i32| x % 2, |y: &i32| y % 2, |x, y| (x, y));
        let op = op.with_params(ExecParams::sequential().with_mode(ExecMode::Concurrent));
        let out = op.iterate(CancellationToken::new()).collect::<Vec<_>>().await;
        assert_eq!(out.len(), 6);
        assert!(out.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn empty_side_yields_no_pairs() {
        let a: FromEnumerableOp<i32> = FromEnumerableOp::new(vec![]);
        let b = FromEnumerableOp::new(vec![1, 2, 3]);
        let op = a.join(b, |x: &i32| *x, |y: &i32| *y, |x, y| (x, y));
        assert!(collect(op).is_empty());
    }
}

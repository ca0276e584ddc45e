//! Pull↔push bridge (§4.3, §4.8): `FromObservable` wraps an external push-style producer as a
//! pull source. The push side writes into a queue (drop-newest when a bounded queue is full);
//! the pull side is a stream that waits on the queue. An `on_error` is *not* swallowed: it is
//! forwarded as the next (and last) item of the resulting stream, surfacing as
//! [`QueryError::SourceFailure`] at the next terminal call (§9).

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::mpsc as futures_mpsc;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc as tokio_mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::{BoxStream, Operator};
use crate::config::QueryStreamConfig;
use crate::error::{BoxError, QueryError};
use crate::params::ExecParams;

/// The push side of the bridge: an external producer calls these as it makes progress.
pub trait Observer<T>: Send + Sync {
    fn on_next(&self, item: T);
    fn on_completed(&self);
    fn on_error(&self, err: BoxError);
}

/// An external push-style producer. `subscribe` is called once per enumeration; the returned
/// [`Subscription`] is dropped (releasing whatever the producer held, e.g. stopping a background
/// task) when the pulled stream is disposed.
pub trait ObservableSource<T>: Send + Sync
where
    T: Send + 'static,
{
    fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> Subscription;
}

/// An opaque unsubscribe guard: runs its cleanup closure exactly once, on drop.
pub struct Subscription(Option<Box<dyn FnOnce() + Send>>);

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Subscription(Some(Box::new(unsubscribe)))
    }

    pub fn noop() -> Self {
        Subscription(None)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

enum ChannelSender<T> {
    Bounded(tokio_mpsc::Sender<Result<T, QueryError>>),
    Unbounded(futures_mpsc::UnboundedSender<Result<T, QueryError>>),
}

/// The concrete [`Observer`] used by [`FromObservableOp`]: forwards into whichever channel
/// flavor `max_buffer` selected, dropping the newest item on a full bounded channel.
struct ChannelObserver<T> {
    sender: Mutex<Option<ChannelSender<T>>>,
}

impl<T: Send + 'static> Observer<T> for ChannelObserver<T> {
    fn on_next(&self, item: T) {
        let guard = self.sender.lock();
        if let Some(sender) = guard.as_ref() {
            match sender {
                // drop-newest: a full bounded queue silently discards this item (§4.3, §9).
                ChannelSender::Bounded(tx) => {
                    let _ = tx.try_send(Ok(item));
                }
                ChannelSender::Unbounded(tx) => {
                    let _ = tx.unbounded_send(Ok(item));
                }
            }
        }
    }

    fn on_completed(&self) {
        // Dropping the sender closes the channel; the pull side sees `None` next.
        self.sender.lock().take();
    }

    fn on_error(&self, err: BoxError) {
        let mut guard = self.sender.lock();
        if let Some(sender) = guard.as_ref() {
            let item = Err(QueryError::SourceFailure(err));
            match sender {
                ChannelSender::Bounded(tx) => {
                    let _ = tx.try_send(item);
                }
                ChannelSender::Unbounded(tx) => {
                    let _ = tx.unbounded_send(item);
                }
            }
        }
        *guard = None;
    }
}

enum ChannelReceiver<T> {
    Bounded(ReceiverStream<Result<T, QueryError>>),
    Unbounded(futures_mpsc::UnboundedReceiver<Result<T, QueryError>>),
}

/// The stream returned by [`FromObservableOp::iterate`]: wraps the receiving half of the
/// bridge's queue, keeps the [`Subscription`] alive for as long as the stream is, and stops
/// eagerly once the external cancellation token trips or an error item has been produced.
struct ObservableStream<T> {
    receiver: ChannelReceiver<T>,
    _subscription: Subscription,
    cancel: CancellationToken,
    done: bool,
}

impl<T: Send + 'static> Stream for ObservableStream<T> {
    type Item = Result<T, QueryError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if this.cancel.is_cancelled() {
            this.done = true;
            return Poll::Ready(Some(Err(QueryError::Canceled)));
        }
        let poll = match &mut this.receiver {
            ChannelReceiver::Bounded(rx) => Pin::new(rx).poll_next(cx),
            ChannelReceiver::Unbounded(rx) => Pin::new(rx).poll_next(cx),
        };
        match &poll {
            Poll::Ready(Some(Err(_))) | Poll::Ready(None) => this.done = true,
            _ => {}
        }
        poll
    }
}

/// Bridges an [`ObservableSource`] into the pull-based pipeline. `max_buffer <= 0` means
/// unbounded; a positive value bounds the internal queue and drops the newest item on overflow.
#[derive(Clone)]
pub struct FromObservableOp<T> {
    source: Arc<dyn ObservableSource<T>>,
    max_buffer: i64,
    params: ExecParams,
}

impl<T: Send + 'static> FromObservableOp<T> {
    /// `max_buffer <= 0` is unbounded, per the public contract described on [`QueryStreamConfig`].
    pub fn new(source: Arc<dyn ObservableSource<T>>, max_buffer: i64) -> Self {
        Self::with_config(source, max_buffer, QueryStreamConfig::default())
    }

    /// As [`Self::new`], but a non-positive `max_buffer` defers to
    /// `config.default_observable_buffer` instead of going straight to unbounded.
    pub fn with_config(source: Arc<dyn ObservableSource<T>>, max_buffer: i64, config: QueryStreamConfig) -> Self {
        let max_buffer = if max_buffer > 0 {
            max_buffer
        } else {
            match config.default_observable_buffer {
                Some(n) => n as i64,
                None => max_buffer,
            }
        };
        FromObservableOp {
            source,
            max_buffer,
            params: ExecParams::sequential(),
        }
    }
}

impl<T: Send + 'static> Operator<T> for FromObservableOp<T> {
    fn params(&self) -> ExecParams {
        self.params
    }

    fn with_params(&self, params: ExecParams) -> Self {
        FromObservableOp {
            source: self.source.clone(),
            max_buffer: self.max_buffer,
            params,
        }
    }

    fn iterate(&self, cancel: CancellationToken) -> BoxStream<T> {
        let (observer, receiver): (Arc<dyn Observer<T>>, ChannelReceiver<T>) = if self.max_buffer > 0 {
            let (tx, rx) = tokio_mpsc::channel(self.max_buffer as usize);
            let observer = ChannelObserver {
                sender: Mutex::new(Some(ChannelSender::Bounded(tx))),
            };
            (Arc::new(observer), ChannelReceiver::Bounded(ReceiverStream::new(rx)))
        } else {
            let (tx, rx) = futures_mpsc::unbounded();
            let observer = ChannelObserver {
                sender: Mutex::new(Some(ChannelSender::Unbounded(tx))),
            };
            (Arc::new(observer), ChannelReceiver::Unbounded(rx))
        };
        let subscription = self.source.subscribe(observer);
        Box::pin(ObservableStream {
            receiver,
            _subscription: subscription,
            cancel,
            done: false,
        })
    }
}

/// An [`ObservableSource`] built from a plain closure, handy for tests and simple producers:
/// the closure receives the observer and is run on a spawned task at subscribe time.
pub struct FnObservable<T> {
    producer: Arc<dyn Fn(Arc<dyn Observer<T>>) + Send + Sync>,
}

impl<T: Send + 'static> FnObservable<T> {
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(Arc<dyn Observer<T>>) + Send + Sync + 'static,
    {
        FnObservable {
            producer: Arc::new(producer),
        }
    }
}

impl<T: Send + 'static> ObservableSource<T> for FnObservable<T> {
    fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> Subscription {
        let producer = self.producer.clone();
        tokio::spawn(async move {
            producer(observer);
        });
        Subscription::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Msg;
    use futures::StreamExt;

    fn emits_then_completes(values: Vec<i32>) -> Arc<dyn ObservableSource<i32>> {
        Arc::new(FnObservable::new(move |observer: Arc<dyn Observer<i32>>| {
            for v in &values {
                observer.on_next(*v);
            }
            observer.on_completed();
        }))
    }

    #[tokio::test]
    async fn delivers_items_then_ends() {
        let op = FromObservableOp::new(emits_then_completes(vec![1, 2, 3]), -1);
        let out: Vec<_> = op.iterate(CancellationToken::new()).collect().await;
        let out: Vec<i32> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn error_surfaces_as_source_failure_after_emitted_items() {
        let source = Arc::new(FnObservable::new(|observer: Arc<dyn Observer<i32>>| {
            observer.on_next(1);
            observer.on_next(2);
            observer.on_error(Box::new(Msg::new("boom")));
        }));
        let op = FromObservableOp::new(source, -1);
        let out: Vec<_> = op.iterate(CancellationToken::new()).collect().await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap(), &1);
        assert_eq!(out[1].as_ref().unwrap(), &2);
        assert!(matches!(out[2], Err(QueryError::SourceFailure(_))));
    }

    /// Calls back into the observer synchronously at subscribe time, so every `on_next` in the
    /// closure races against a receiver that has not been polled even once yet — deterministic,
    /// unlike a spawned producer racing the consumer task.
    struct ImmediateObservable<F>(F);

    impl<T, F> ObservableSource<T> for ImmediateObservable<F>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn Observer<T>>) + Send + Sync,
    {
        fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> Subscription {
            (self.0)(observer);
            Subscription::noop()
        }
    }

    #[tokio::test]
    async fn config_default_applies_only_when_max_buffer_is_non_positive() {
        let source: Arc<dyn ObservableSource<i32>> = Arc::new(ImmediateObservable(|observer: Arc<dyn Observer<i32>>| {
            for v in 0..10 {
                observer.on_next(v);
            }
            observer.on_completed();
        }));
        let config = QueryStreamConfig {
            default_observable_buffer: Some(1),
        };
        let op = FromObservableOp::with_config(source, 0, config);
        let out: Vec<_> = op.iterate(CancellationToken::new()).collect().await;
        let out: Vec<i32> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(out, vec![0]);
    }

    #[tokio::test]
    async fn explicit_max_buffer_overrides_config_default() {
        let source: Arc<dyn ObservableSource<i32>> = Arc::new(ImmediateObservable(|observer: Arc<dyn Observer<i32>>| {
            for v in 0..10 {
                observer.on_next(v);
            }
            observer.on_completed();
        }));
        let config = QueryStreamConfig {
            default_observable_buffer: Some(1),
        };
        let op = FromObservableOp::with_config(source, 5, config);
        let out: Vec<_> = op.iterate(CancellationToken::new()).collect().await;
        assert_eq!(out.len(), 5);
    }

    #[tokio::test]
    async fn bounded_buffer_drops_newest_on_overflow() {
        let source: Arc<dyn ObservableSource<i32>> = Arc::new(ImmediateObservable(|observer: Arc<dyn Observer<i32>>| {
            for v in 0..10 {
                observer.on_next(v);
            }
            observer.on_completed();
        }));
        // max_buffer = 1 and nobody has polled yet: only the first value fits in the queue,
        // everything else is dropped-newest before the stream is ever read.
        let op = FromObservableOp::new(source, 1);
        let out: Vec<_> = op.iterate(CancellationToken::new()).collect().await;
        let out: Vec<i32> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(out, vec![0]);
    }
}

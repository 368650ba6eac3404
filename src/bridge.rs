//! Adapters between `Async<T>` and `std::future::Future`.
//!
//! [`Async::into_future`] drives a computation from any executor and resolves to
//! its [`Outcome`]. [`from_future`] goes the other way: it turns a future into a
//! leaf computation that is spawned on a `futures` [`Spawn`] implementation when
//! invoked.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    channel::oneshot,
    task::{Spawn, SpawnExt},
};
use pin_project_lite::pin_project;

use crate::{Async, CancelReason, Channels, Error, ExecutionContext, Outcome};

struct Start<T> {
    computation: Async<T>,
    sender: oneshot::Sender<Outcome<T>>,
}

pin_project! {
    /// A future that runs a computation and resolves to its [`Outcome`].
    ///
    /// The computation starts on the first poll, against a child of the context
    /// given to [`Async::into_future`]. Dropping the future before it resolves
    /// cancels that child with [`CancelReason::UserRequested`]. A computation that
    /// never resolves leaves the future pending forever.
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub struct OutcomeFuture<T> {
        start: Option<Start<T>>,
        scope: ExecutionContext,
        #[pin]
        receiver: oneshot::Receiver<Outcome<T>>,
        done: bool,
    }

    impl<T> PinnedDrop for OutcomeFuture<T> {
        fn drop(this: Pin<&mut Self>) {
            if !this.done {
                this.scope.cancel(CancelReason::UserRequested);
            }
        }
    }
}

impl<T: Send + 'static> Future for OutcomeFuture<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Some(Start {
            computation,
            sender,
        }) = this.start.take()
        {
            computation.run_with(
                this.scope,
                Channels::from_fn(move |outcome| {
                    // The receiver is gone only if the future was dropped.
                    let _ = sender.send(outcome);
                }),
            );
        }
        match this.receiver.poll(cx) {
            Poll::Ready(Ok(outcome)) => {
                *this.done = true;
                Poll::Ready(outcome)
            }
            // The channels were released without firing: the computation parked.
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Pending,
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Send + 'static> Async<T> {
    /// Turns the computation into a future resolving to its outcome.
    ///
    /// # Example
    /// ```
    /// # use asyncomp::{ExecutionContext, succeed};
    /// let ctx = ExecutionContext::new();
    /// let outcome = futures::executor::block_on(succeed(6).map(|x| x * 7).into_future(&ctx));
    /// assert_eq!(outcome.value(), Some(42));
    /// ```
    pub fn into_future(self, ctx: &ExecutionContext) -> OutcomeFuture<T> {
        let (sender, receiver) = oneshot::channel();
        OutcomeFuture {
            start: Some(Start {
                computation: self,
                sender,
            }),
            scope: ctx.child(),
            receiver,
            done: false,
        }
    }
}

/// Wraps `future` as a leaf computation spawned on `spawner` when invoked.
///
/// The context is checked before spawning and again once the future finishes; a
/// cancellation seen at either point is reported instead of the value. Spawning
/// failures are reported on the error channel. The future itself is not
/// interrupted when cancellation is requested while it runs.
pub fn from_future<S, F>(spawner: S, future: F) -> Async<F::Output>
where
    S: Spawn + Send + 'static,
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    from_try_future(spawner, async move { Ok::<_, Error>(future.await) })
}

/// Like [`from_future`] for futures resolving to a `Result`; an `Err` is
/// reported on the error channel.
pub fn from_try_future<S, F, T, E>(spawner: S, future: F) -> Async<T>
where
    S: Spawn + Send + 'static,
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<Error> + 'static,
{
    Async::from_fn(move |ctx, completion| {
        if let Err(reason) = ctx.check() {
            completion.cancelled(reason);
            return;
        }
        let spawned = completion.clone();
        let task = async move {
            let result = future.await;
            match (ctx.check(), result) {
                (Err(reason), _) => spawned.cancelled(reason),
                (Ok(()), Ok(value)) => spawned.value(value),
                (Ok(()), Err(error)) => spawned.error(error),
            }
        };
        if let Err(error) = spawner.spawn(task) {
            tracing::debug!(%error, "leaf future could not be spawned");
            completion.error(Error::new(error));
        }
    })
}

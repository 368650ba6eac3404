//! Sequencing: run one computation, feed its value to a binder, run the result.
//!
//! For `bind(a, f)` invoked with context `ctx`:
//! 1. `a` runs against `ctx`;
//! 2. its error or cancellation is forwarded as is and `f` never runs;
//! 3. on a value, `ctx` is checked again, and a cancellation requested meanwhile
//!    is reported instead of calling `f`;
//! 4. `f(value)` builds the next computation, which runs against the same `ctx`
//!    and reports straight to the caller's channels;
//! 5. a panic in `f` (or an `Err` from a `try_bind` binder) is reported on the
//!    error channel.
//!
//! Every step is submitted to the context's work-list rather than called
//! directly, so neither deeply nested binds nor long chains of binders grow the
//! stack. If `a` parks, the bind parks too, again through the work-list.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::{
    Async, Channels, Completion, Computation, Error, ExecutionContext, Outcome,
    reclaim::defer_drop,
};

struct Bind<A: Send + 'static, F: Send + 'static> {
    // Taken on invoke; still present here means the bind is dropped unrun.
    parts: Option<(Async<A>, F)>,
}

impl<A: Send + 'static, F: Send + 'static> Drop for Bind<A, F> {
    fn drop(&mut self) {
        if let Some(parts) = self.parts.take() {
            defer_drop(parts);
        }
    }
}

impl<A, B, F> Computation<B> for Bind<A, F>
where
    A: Send + 'static,
    B: Send + 'static,
    F: FnOnce(A) -> Result<Async<B>, Error> + Send + 'static,
{
    fn invoke(mut self: Box<Self>, ctx: ExecutionContext, out: Completion<B>) {
        let Some((left, binder)) = self.parts.take() else {
            return;
        };
        let derived = Completion::new(forward_park(
            &ctx,
            out.clone(),
            Channels::from_fn({
                let resume_ctx = ctx.clone();
                move |outcome: Outcome<A>| {
                    let job_ctx = resume_ctx.clone();
                    resume_ctx.submit(move || match outcome {
                        Outcome::Value(value) => resume(job_ctx, value, binder, out),
                        Outcome::Error(error) => out.error(error),
                        Outcome::Cancelled(reason) => out.cancelled(reason),
                    });
                }
            }),
        ));
        let left_ctx = ctx.clone();
        ctx.submit(move || left.invoke(left_ctx, derived));
    }
}

/// Parks `out` through `ctx`'s work-list once `channels` are parked.
pub(crate) fn forward_park<A: 'static, B: Send + 'static>(
    ctx: &ExecutionContext,
    out: Completion<B>,
    channels: Channels<A>,
) -> Channels<A> {
    let ctx = ctx.clone();
    channels.on_park(move || ctx.submit(move || out.park()))
}

fn resume<A, B, F>(ctx: ExecutionContext, value: A, binder: F, out: Completion<B>)
where
    B: Send + 'static,
    F: FnOnce(A) -> Result<Async<B>, Error>,
{
    if let Some(reason) = ctx.cancellation_reason() {
        tracing::trace!(%reason, "bind: context cancelled, binder skipped");
        drop(value);
        out.cancelled(reason);
        return;
    }
    match catch_unwind(AssertUnwindSafe(move || binder(value))) {
        Ok(Ok(next)) => next.invoke(ctx, out),
        Ok(Err(error)) => out.error(error),
        Err(payload) => {
            let error = Error::from_panic(payload);
            tracing::debug!(%error, "bind: binder panicked");
            out.error(error);
        }
    }
}

impl<A: Send + 'static> Async<A> {
    /// Sequences `self` with `binder`. See [`bind`].
    pub fn bind<B, F>(self, binder: F) -> Async<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> Async<B> + Send + 'static,
    {
        self.try_bind(move |value| Ok(binder(value)))
    }

    /// Sequences `self` with a fallible `binder`. See [`try_bind`].
    pub fn try_bind<B, F>(self, binder: F) -> Async<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> Result<Async<B>, Error> + Send + 'static,
    {
        Async::from_computation(Bind {
            parts: Some((self, binder)),
        })
    }
}

/// Runs `a`, then the computation `binder` builds from its value.
///
/// Errors and cancellations of `a` skip `binder`. The context is checked once
/// more right before `binder` runs. A panicking `binder` is reported as
/// [`Error::BinderPanicked`].
///
/// # Example
/// ```
/// # use std::sync::mpsc;
/// # use asyncomp::{ExecutionContext, Outcome, Channels, bind, fail};
/// let (tx, rx) = mpsc::channel();
/// let chain = bind(fail::<u32>("boom"), |x| asyncomp::succeed(x + 1));
/// chain.run_with(&ExecutionContext::new(), Channels::from_fn(move |o| tx.send(o).unwrap()));
/// match rx.recv().unwrap() {
///     Outcome::Error(error) => assert_eq!(error.to_string(), "boom"),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub fn bind<A, B, F>(a: Async<A>, binder: F) -> Async<B>
where
    A: Send + 'static,
    B: Send + 'static,
    F: FnOnce(A) -> Async<B> + Send + 'static,
{
    a.bind(binder)
}

/// Like [`bind`], with a binder that may refuse to build the next computation.
///
/// An `Err` from `binder` is reported on the error channel.
pub fn try_bind<A, B, F>(a: Async<A>, binder: F) -> Async<B>
where
    A: Send + 'static,
    B: Send + 'static,
    F: FnOnce(A) -> Result<Async<B>, Error> + Send + 'static,
{
    a.try_bind(binder)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{CancelReason, fail, from_fn, succeed};

    fn outcome_of<T: Send + 'static>(
        computation: Async<T>,
        ctx: &ExecutionContext,
    ) -> Option<Outcome<T>> {
        let slot = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);
        computation.run_with(
            ctx,
            Channels::from_fn(move |outcome| *sink.lock().unwrap() = Some(outcome)),
        );
        slot.lock().unwrap().take()
    }

    #[test]
    fn value_flows_through_binder() {
        let outcome = outcome_of(succeed(2).bind(|x| succeed(x * 10)), &ExecutionContext::new());
        assert_eq!(outcome.and_then(Outcome::value), Some(20));
    }

    #[test]
    fn try_bind_err_goes_to_error_channel() {
        let outcome = outcome_of(
            succeed(1).try_bind(|_| Err::<Async<u8>, _>(Error::msg("refused"))),
            &ExecutionContext::new(),
        );
        assert_eq!(
            outcome.and_then(Outcome::error).map(|e| e.to_string()),
            Some("refused".to_owned())
        );
    }

    #[test]
    fn cancellation_between_left_and_binder_skips_binder() {
        let ctx = ExecutionContext::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        // The left leaf produces a value, but cancellation lands first.
        let left = from_fn(|ctx: ExecutionContext, completion| {
            ctx.cancel(CancelReason::UserRequested);
            completion.value(1);
        });
        let chain = left.bind(move |x: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            succeed(x)
        });
        let outcome = outcome_of(chain, &ctx);
        assert_eq!(
            outcome.and_then(|o| o.cancel_reason()),
            Some(CancelReason::UserRequested)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn left_failure_never_reaches_binder() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let chain = fail::<i32>("left").bind(move |x| {
            counter.fetch_add(1, Ordering::SeqCst);
            succeed(x)
        });
        let outcome = outcome_of(chain, &ExecutionContext::new());
        assert!(outcome.is_some_and(|o| o.is_error()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

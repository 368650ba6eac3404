//! Value and error transformations.
//!
//! `map` is `bind` followed by `succeed`, so everything bind guarantees (the
//! cancellation check before the user function, panic containment) carries
//! over. `recover` is the mirror image of bind on the error channel, and
//! `map_err` is `recover` followed by `fail`.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::{
    Async, Channels, Completion, Computation, Error, ExecutionContext, Outcome,
    bind::forward_park, reclaim::defer_drop,
};

impl<T: Send + 'static> Async<T> {
    /// Transforms the value with `f`. See [`map`].
    pub fn map<U, F>(self, f: F) -> Async<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.bind(move |value| Async::succeed(f(value)))
    }

    /// Transforms the error with `f`. See [`map_err`].
    pub fn map_err<F>(self, f: F) -> Async<T>
    where
        F: FnOnce(Error) -> Error + Send + 'static,
    {
        self.recover(move |error| Async::fail(f(error)))
    }

    /// Replaces an error with the computation `handler` builds. See [`recover`].
    pub fn recover<F>(self, handler: F) -> Async<T>
    where
        F: FnOnce(Error) -> Async<T> + Send + 'static,
    {
        Async::from_computation(Recover {
            parts: Some((self, handler)),
        })
    }
}

struct Recover<T: Send + 'static, F: Send + 'static> {
    parts: Option<(Async<T>, F)>,
}

impl<T: Send + 'static, F: Send + 'static> Drop for Recover<T, F> {
    fn drop(&mut self) {
        if let Some(parts) = self.parts.take() {
            defer_drop(parts);
        }
    }
}

impl<T, F> Computation<T> for Recover<T, F>
where
    T: Send + 'static,
    F: FnOnce(Error) -> Async<T> + Send + 'static,
{
    fn invoke(mut self: Box<Self>, ctx: ExecutionContext, out: Completion<T>) {
        let Some((inner, handler)) = self.parts.take() else {
            return;
        };
        let resume_ctx = ctx.clone();
        let channels = forward_park(
            &ctx,
            out.clone(),
            Channels::from_fn(move |outcome: Outcome<T>| {
                let job_ctx = resume_ctx.clone();
                resume_ctx.submit(move || match outcome {
                    Outcome::Error(error) => handle(job_ctx, error, handler, out),
                    other => out.complete(other),
                });
            }),
        );
        let derived = Completion::new(channels);
        let inner_ctx = ctx.clone();
        ctx.submit(move || inner.invoke(inner_ctx, derived));
    }
}

fn handle<T, F>(ctx: ExecutionContext, error: Error, handler: F, out: Completion<T>)
where
    T: Send + 'static,
    F: FnOnce(Error) -> Async<T>,
{
    if let Some(reason) = ctx.cancellation_reason() {
        tracing::trace!(%reason, %error, "recover: context cancelled, handler skipped");
        out.cancelled(reason);
        return;
    }
    match catch_unwind(AssertUnwindSafe(move || handler(error))) {
        Ok(next) => next.invoke(ctx, out),
        Err(payload) => out.error(Error::from_panic(payload)),
    }
}

/// Transforms the value of `a` with `f`; errors and cancellations pass through.
pub fn map<T, U, F>(a: Async<T>, f: F) -> Async<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
{
    a.map(f)
}

/// Transforms the error of `a` with `f`; values and cancellations pass through.
pub fn map_err<T, F>(a: Async<T>, f: F) -> Async<T>
where
    T: Send + 'static,
    F: FnOnce(Error) -> Error + Send + 'static,
{
    a.map_err(f)
}

/// Runs `a`; if it fails, runs the computation `handler` builds from the error.
///
/// Values and cancellations of `a` pass through and `handler` never runs. Like
/// a binder, `handler` is skipped when the context is cancelled, and a panic in
/// it is reported on the error channel.
pub fn recover<T, F>(a: Async<T>, handler: F) -> Async<T>
where
    T: Send + 'static,
    F: FnOnce(Error) -> Async<T> + Send + 'static,
{
    a.recover(handler)
}

//! Defines `Async<T>`, the deferred computation at the center of the crate.
//!
//! An `Async<T>` is a description of work that, once invoked with an
//! [`ExecutionContext`] and a [`Completion`], reports exactly one of a value, an
//! error, or a cancellation. Building one has no side effects. Invoking consumes
//! it, so a computation runs at most once.
//!
//! The common cases are variants of a tagged union, everything else (bind,
//! combinators, externally supplied leaves) is a boxed [`Computation`].

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::{CancelReason, Channels, Completion, Error, ExecutionContext};

/// A computation with behavior beyond the built-in constructors.
///
/// Implementors are leaves that wrap I/O, timers or other external work, or
/// combinators built from other computations. An implementation must:
/// - fire exactly one channel of `completion` exactly once, possibly later and
///   from another thread, or [`park`](Completion::park) it if it is documented
///   to never resolve;
/// - check `ctx` for cancellation before starting expensive work and report
///   [`Completion::cancelled`] instead of proceeding.
pub trait Computation<T>: Send {
    fn invoke(self: Box<Self>, ctx: ExecutionContext, completion: Completion<T>);
}

enum Kind<T> {
    Succeed(T),
    Fail(Error),
    Cancel(CancelReason),
    Never,
    Deferred(Box<dyn Computation<T>>),
}

/// A deferred computation producing a `T`, an [`Error`], or a cancellation.
#[must_use = "computations do nothing unless run"]
pub struct Async<T> {
    kind: Kind<T>,
}

impl<T: Send + 'static> Async<T> {
    /// A computation that fires the value channel with `value`.
    pub fn succeed(value: T) -> Self {
        Self {
            kind: Kind::Succeed(value),
        }
    }

    /// A computation that fires the error channel with `error`.
    pub fn fail(error: impl Into<Error>) -> Self {
        Self {
            kind: Kind::Fail(error.into()),
        }
    }

    /// A computation that fires the cancellation channel with `reason`.
    pub fn cancel(reason: CancelReason) -> Self {
        Self {
            kind: Kind::Cancel(reason),
        }
    }

    /// A computation that never resolves.
    ///
    /// Intended for placeholders and as the identity of [`race`](fn@crate::race).
    /// Its completion is parked, so none of the channels is ever called.
    pub fn never() -> Self {
        Self { kind: Kind::Never }
    }

    /// Wraps a leaf given as a closure.
    ///
    /// The closure follows the contract described on [`Computation`].
    pub fn from_fn<F>(leaf: F) -> Self
    where
        F: FnOnce(ExecutionContext, Completion<T>) + Send + 'static,
    {
        Self::from_computation(FnLeaf(leaf))
    }

    /// Wraps any [`Computation`] implementation.
    pub fn from_computation(computation: impl Computation<T> + 'static) -> Self {
        Self {
            kind: Kind::Deferred(Box::new(computation)),
        }
    }

    /// Defers building the computation until it is invoked.
    ///
    /// A panic inside `factory` is reported on the error channel.
    pub fn lazy<F>(factory: F) -> Self
    where
        F: FnOnce() -> Async<T> + Send + 'static,
    {
        Self::from_fn(move |ctx, completion| {
            match catch_unwind(AssertUnwindSafe(factory)) {
                Ok(computation) => {
                    let job_ctx = ctx.clone();
                    ctx.submit(move || computation.invoke(job_ctx, completion));
                }
                Err(payload) => completion.error(Error::from_panic(payload)),
            }
        })
    }

    /// Invokes the computation.
    ///
    /// Combinators and [`Computation`] implementations call this on the
    /// computations they wrap. Callers at the edge use [`run`] instead.
    pub fn invoke(self, ctx: ExecutionContext, completion: Completion<T>) {
        match self.kind {
            Kind::Succeed(value) => completion.value(value),
            Kind::Fail(error) => completion.error(error),
            Kind::Cancel(reason) => completion.cancelled(reason),
            Kind::Never => completion.park(),
            Kind::Deferred(computation) => computation.invoke(ctx, completion),
        }
    }

    /// Runs the computation against `ctx`, delivering the result to `channels`.
    ///
    /// See [`run`].
    pub fn run_with(self, ctx: &ExecutionContext, channels: Channels<T>) {
        let span = tracing::debug_span!("run", label = ctx.label().unwrap_or("-"));
        let _entered = span.enter();
        let completion = Completion::new(channels);
        let job_ctx = ctx.clone();
        ctx.submit(move || self.invoke(job_ctx, completion));
    }
}

struct FnLeaf<F>(F);

impl<T, F> Computation<T> for FnLeaf<F>
where
    F: FnOnce(ExecutionContext, Completion<T>) + Send,
{
    fn invoke(self: Box<Self>, ctx: ExecutionContext, completion: Completion<T>) {
        (self.0)(ctx, completion);
    }
}

/// See [`Async::succeed`].
pub fn succeed<T: Send + 'static>(value: T) -> Async<T> {
    Async::succeed(value)
}

/// See [`Async::fail`].
pub fn fail<T: Send + 'static>(error: impl Into<Error>) -> Async<T> {
    Async::fail(error)
}

/// See [`Async::cancel`].
pub fn cancel<T: Send + 'static>(reason: CancelReason) -> Async<T> {
    Async::cancel(reason)
}

/// See [`Async::never`].
pub fn never<T: Send + 'static>() -> Async<T> {
    Async::never()
}

/// See [`Async::from_fn`].
pub fn from_fn<T, F>(leaf: F) -> Async<T>
where
    T: Send + 'static,
    F: FnOnce(ExecutionContext, Completion<T>) + Send + 'static,
{
    Async::from_fn(leaf)
}

/// See [`Async::lazy`].
pub fn lazy<T, F>(factory: F) -> Async<T>
where
    T: Send + 'static,
    F: FnOnce() -> Async<T> + Send + 'static,
{
    Async::lazy(factory)
}

/// Runs `computation` against `ctx`.
///
/// Exactly one of `on_value`, `on_error` or `on_cancelled` is called exactly once,
/// unless the computation is documented to never resolve. When every leaf in the
/// chain completes synchronously, the callback has been called by the time this
/// returns; otherwise it is called later from whichever thread completes the
/// last leaf.
///
/// Called from inside a step that is already running on `ctx`, or on any
/// context sharing its work-list (a parent or child), `run` only queues the
/// computation. It starts once the current step returns, and the callback fires
/// after `run` has returned even if every leaf is synchronous.
///
/// # Example
/// ```
/// # use std::sync::mpsc;
/// # use asyncomp::{ExecutionContext, run, succeed};
/// let (tx, rx) = mpsc::channel();
/// let ctx = ExecutionContext::new();
/// run(
///     succeed(2).bind(|x| succeed(x * 10)),
///     &ctx,
///     move |value| tx.send(value).unwrap(),
///     |error| panic!("unexpected error: {error}"),
///     |reason| panic!("unexpected cancellation: {reason}"),
/// );
/// assert_eq!(rx.recv().unwrap(), 20);
/// ```
pub fn run<T: Send + 'static>(
    computation: Async<T>,
    ctx: &ExecutionContext,
    on_value: impl FnOnce(T) + Send + 'static,
    on_error: impl FnOnce(Error) + Send + 'static,
    on_cancelled: impl FnOnce(CancelReason) + Send + 'static,
) {
    computation.run_with(ctx, Channels::new(on_value, on_error, on_cancelled));
}

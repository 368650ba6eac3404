//! Running computations side by side and waiting for all of them.
//!
//! Every branch is invoked against its own child of the caller's context, so the
//! branches may make progress concurrently when their leaves suspend. The first
//! error or cancellation settles the join: the remaining branches are cancelled
//! with [`CancelReason::UpstreamFailure`] through the shared child scope, and
//! whatever they report afterwards is discarded. Only when every branch has
//! produced a value does the join fire its value channel. A join in which some
//! branch parked and every other branch produced a value can never finish, so
//! it parks as well.

use std::{
    mem,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    Async, CancelReason, Channels, Completion, Computation, ExecutionContext, Outcome,
    reclaim::defer_drop,
};

// Shared by all branches of one join or race invocation.
pub(crate) struct Settle<T> {
    claimed: AtomicBool,
    scope: ExecutionContext,
    out: Completion<T>,
}

impl<T: Send + 'static> Settle<T> {
    pub(crate) fn new(ctx: &ExecutionContext, out: Completion<T>) -> Self {
        Self {
            claimed: AtomicBool::new(false),
            scope: ctx.child(),
            out,
        }
    }

    // The single winner of the claim gets the right to fire `out`.
    fn claim(&self) -> Option<Completion<T>> {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| self.out.clone())
    }

    pub(crate) fn scope(&self) -> &ExecutionContext {
        &self.scope
    }

    // Fires `out` with `outcome` if nobody settled first, then cancels the other
    // branches with `siblings`.
    pub(crate) fn finish(&self, branch: usize, outcome: Outcome<T>, siblings: CancelReason) {
        match self.claim() {
            Some(out) => {
                tracing::trace!(
                    branch,
                    channel = %outcome.channel(),
                    "branch settled the combinator"
                );
                self.scope.cancel(siblings);
                out.complete(outcome);
            }
            None => tracing::trace!(branch, "late outcome discarded"),
        }
    }

    // Parks `out` through the work-list if nobody settled first.
    pub(crate) fn park(&self) {
        if let Some(out) = self.claim() {
            tracing::trace!("every branch settled or parked, combinator parks");
            self.scope.submit(move || out.park());
        }
    }

    fn fail_fast(&self, branch: usize, outcome: Outcome<T>) {
        self.finish(branch, outcome, CancelReason::UpstreamFailure);
    }
}

struct Combine<A: Send + 'static, B: Send + 'static> {
    parts: Option<(Async<A>, Async<B>)>,
}

impl<A: Send + 'static, B: Send + 'static> Drop for Combine<A, B> {
    fn drop(&mut self) {
        if let Some(parts) = self.parts.take() {
            defer_drop(parts);
        }
    }
}

struct PairState<A, B> {
    left: Option<A>,
    right: Option<B>,
    settled: u8,
}

struct Pair<A, B> {
    settle: Settle<(A, B)>,
    state: Mutex<PairState<A, B>>,
}

enum Side<A, B> {
    Left(A),
    Right(B),
    Parked,
}

impl<A: Send + 'static, B: Send + 'static> Pair<A, B> {
    fn settle_side(&self, side: Side<A, B>) {
        let ready = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match side {
                Side::Left(value) => state.left = Some(value),
                Side::Right(value) => state.right = Some(value),
                Side::Parked => {}
            }
            state.settled += 1;
            if state.settled < 2 {
                return;
            }
            state.left.take().zip(state.right.take())
        };
        match ready {
            Some(pair) => {
                if let Some(out) = self.settle.claim() {
                    out.value(pair);
                }
            }
            None => self.settle.park(),
        }
    }

    fn branch<V: Send + 'static>(
        pair: &Arc<Self>,
        branch: usize,
        side: fn(V) -> Side<A, B>,
    ) -> Completion<V> {
        let shared = Arc::clone(pair);
        let parked = Arc::clone(pair);
        Completion::new(
            Channels::from_fn(move |outcome: Outcome<V>| match outcome {
                Outcome::Value(value) => shared.settle_side(side(value)),
                Outcome::Error(error) => shared.settle.fail_fast(branch, Outcome::Error(error)),
                Outcome::Cancelled(reason) => {
                    shared.settle.fail_fast(branch, Outcome::Cancelled(reason));
                }
            })
            .on_park(move || parked.settle_side(Side::Parked)),
        )
    }
}

impl<A, B> Computation<(A, B)> for Combine<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    fn invoke(mut self: Box<Self>, ctx: ExecutionContext, out: Completion<(A, B)>) {
        let Some((left, right)) = self.parts.take() else {
            return;
        };
        let pair = Arc::new(Pair {
            settle: Settle::new(&ctx, out),
            state: Mutex::new(PairState {
                left: None,
                right: None,
                settled: 0,
            }),
        });

        let left_done = Pair::branch(&pair, 0, Side::Left);
        let right_done = Pair::branch(&pair, 1, Side::Right);

        let left_scope = pair.settle.scope.clone();
        ctx.submit(move || left.invoke(left_scope, left_done));
        let right_scope = pair.settle.scope.clone();
        ctx.submit(move || right.invoke(right_scope, right_done));
    }
}

struct JoinAll<T: Send + 'static> {
    branches: Vec<Async<T>>,
}

impl<T: Send + 'static> Drop for JoinAll<T> {
    fn drop(&mut self) {
        defer_drop(mem::take(&mut self.branches));
    }
}

struct CollectState<T> {
    values: Vec<Option<T>>,
    remaining: usize,
    parked: bool,
}

struct Collect<T> {
    settle: Settle<Vec<T>>,
    state: Mutex<CollectState<T>>,
}

impl<T: Send + 'static> Collect<T> {
    fn lock(&self) -> MutexGuard<'_, CollectState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // `value` is `None` for a parked branch.
    fn store(&self, branch: usize, value: Option<T>) {
        let ready = {
            let mut state = self.lock();
            match value {
                Some(value) => state.values[branch] = Some(value),
                None => state.parked = true,
            }
            state.remaining -= 1;
            if state.remaining > 0 {
                return;
            }
            (!state.parked).then(|| state.values.drain(..).flatten().collect::<Vec<_>>())
        };
        match ready {
            Some(values) => {
                if let Some(out) = self.settle.claim() {
                    out.value(values);
                }
            }
            None => self.settle.park(),
        }
    }
}

impl<T: Send + 'static> Computation<Vec<T>> for JoinAll<T> {
    fn invoke(mut self: Box<Self>, ctx: ExecutionContext, out: Completion<Vec<T>>) {
        let branches = mem::take(&mut self.branches);
        let count = branches.len();
        if count == 0 {
            out.value(Vec::new());
            return;
        }
        let collect = Arc::new(Collect {
            settle: Settle::new(&ctx, out),
            state: Mutex::new(CollectState {
                values: (0..count).map(|_| None).collect(),
                remaining: count,
                parked: false,
            }),
        });
        for (branch, computation) in branches.into_iter().enumerate() {
            let shared = Arc::clone(&collect);
            let parked = Arc::clone(&collect);
            let channels = Channels::from_fn(move |outcome: Outcome<T>| match outcome {
                Outcome::Value(value) => shared.store(branch, Some(value)),
                Outcome::Error(error) => {
                    shared.settle.fail_fast(branch, Outcome::Error(error));
                }
                Outcome::Cancelled(reason) => {
                    shared.settle.fail_fast(branch, Outcome::Cancelled(reason));
                }
            })
            .on_park(move || parked.store(branch, None));
            let done = Completion::new(channels);
            let scope = collect.settle.scope.clone();
            ctx.submit(move || computation.invoke(scope, done));
        }
    }
}

/// Runs `left` and `right` side by side and produces both values.
///
/// The first error or cancellation from either side is reported, and the other
/// side is cancelled with [`CancelReason::UpstreamFailure`].
pub fn combine<A, B>(left: Async<A>, right: Async<B>) -> Async<(A, B)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    Async::from_computation(Combine {
        parts: Some((left, right)),
    })
}

/// Runs every computation side by side and produces their values in order.
///
/// An empty input produces an empty vector. The first error or cancellation is
/// reported and the remaining branches are cancelled.
pub fn join_all<T, I>(computations: I) -> Async<Vec<T>>
where
    T: Send + 'static,
    I: IntoIterator<Item = Async<T>>,
{
    Async::from_computation(JoinAll {
        branches: computations.into_iter().collect(),
    })
}

impl<A: Send + 'static> Async<A> {
    /// Runs `self` and `other` side by side. See [`combine`].
    pub fn combine<B: Send + 'static>(self, other: Async<B>) -> Async<(A, B)> {
        combine(self, other)
    }
}

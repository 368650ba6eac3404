//! Race combinator: run several computations, the first to settle wins.
//!
//! Whatever the first branch reports, a value, an error or a cancellation,
//! becomes the outcome of the race. The claim is an atomic compare-and-swap, so
//! exactly one branch wins even when several leaves complete at the same time
//! on different threads. The losers run against a child scope that is cancelled
//! with [`CancelReason::RaceLost`] as soon as the winner is known; what they
//! report afterwards is discarded.
//!
//! [`never`](crate::never) is the identity: `race(a, never())` behaves as `a`.
//! A race whose branches all park parks too.

use std::{
    mem,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{
    Async, CancelReason, Channels, Completion, Computation, ExecutionContext, Outcome,
    join::Settle, reclaim::defer_drop,
};

struct Race<T: Send + 'static> {
    branches: Vec<Async<T>>,
}

impl<T: Send + 'static> Drop for Race<T> {
    fn drop(&mut self) {
        defer_drop(mem::take(&mut self.branches));
    }
}

struct Contest<T> {
    settle: Settle<T>,
    unparked: AtomicUsize,
}

impl<T: Send + 'static> Computation<T> for Race<T> {
    fn invoke(mut self: Box<Self>, ctx: ExecutionContext, out: Completion<T>) {
        let branches = mem::take(&mut self.branches);
        if branches.is_empty() {
            out.park();
            return;
        }
        let contest = Arc::new(Contest {
            settle: Settle::new(&ctx, out),
            unparked: AtomicUsize::new(branches.len()),
        });
        for (branch, computation) in branches.into_iter().enumerate() {
            let shared = Arc::clone(&contest);
            let parked = Arc::clone(&contest);
            let channels = Channels::from_fn(move |outcome: Outcome<T>| {
                shared.settle.finish(branch, outcome, CancelReason::RaceLost);
            })
            .on_park(move || {
                if parked.unparked.fetch_sub(1, Ordering::AcqRel) == 1 {
                    parked.settle.park();
                }
            });
            let done = Completion::new(channels);
            let scope = contest.settle.scope().clone();
            ctx.submit(move || computation.invoke(scope, done));
        }
    }
}

/// Runs `a` and `b` side by side; the first outcome wins.
pub fn race<T: Send + 'static>(a: Async<T>, b: Async<T>) -> Async<T> {
    race_all([a, b])
}

/// Runs every computation side by side; the first outcome wins.
///
/// Racing nothing never resolves, matching `never` as the identity of `race`.
pub fn race_all<T, I>(computations: I) -> Async<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Async<T>>,
{
    Async::from_computation(Race {
        branches: computations.into_iter().collect(),
    })
}

impl<T: Send + 'static> Async<T> {
    /// Races `self` against `other`. See [`race`].
    pub fn race(self, other: Async<T>) -> Async<T> {
        race(self, other)
    }
}

//! Timing leaves for computation chains.
//!
//! Provides a `sleep` leaf and the `delay` and `timeout` wrappers built on it.
//! Timers run on a small thread pool created on first use. A sleeping timer
//! wakes up every [`TICK`] to check its context, so a cancelled or expired
//! context releases the timer early.

use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};

use futures::executor::{ThreadPool, ThreadPoolBuilder};

use crate::{Async, CancelReason, Error, race};

/// Number of threads backing the timer leaves.
pub const POOL_SIZE: usize = 8;

/// Longest a timer sleeps before checking its context again.
pub const TICK: Duration = Duration::from_millis(5);

static THREAD_POOL: OnceLock<Result<ThreadPool, String>> = OnceLock::new();

fn thread_pool() -> Result<&'static ThreadPool, Error> {
    THREAD_POOL
        .get_or_init(|| {
            ThreadPoolBuilder::new()
                .pool_size(POOL_SIZE)
                .name_prefix("asyncomp-timer-")
                .create()
                .map_err(|error| error.to_string())
        })
        .as_ref()
        .map_err(|error| Error::msg(format!("timer pool unavailable: {error}")))
}

/// A computation that produces `()` once `duration` has elapsed.
///
/// Reports the context's cancellation reason instead if the context is
/// cancelled, or its deadline passes, before the time is up.
pub fn sleep(duration: Duration) -> Async<()> {
    Async::from_fn(move |ctx, completion| {
        if let Err(reason) = ctx.check() {
            completion.cancelled(reason);
            return;
        }
        let pool = match thread_pool() {
            Ok(pool) => pool,
            Err(error) => {
                completion.error(error);
                return;
            }
        };
        let due = Instant::now() + duration;
        tracing::trace!(?duration, "timer scheduled");
        pool.spawn_ok(async move {
            loop {
                if let Err(reason) = ctx.check() {
                    completion.cancelled(reason);
                    return;
                }
                let now = Instant::now();
                if now >= due {
                    completion.value(());
                    return;
                }
                std::thread::sleep((due - now).min(TICK));
            }
        });
    })
}

/// Starts `computation` only after `duration` has elapsed.
pub fn delay<T: Send + 'static>(computation: Async<T>, duration: Duration) -> Async<T> {
    sleep(duration).bind(move |()| computation)
}

/// Runs `computation` with a time limit.
///
/// If it has not settled within `limit`, the result is a cancellation with
/// [`CancelReason::Timeout`], and `computation` itself is cancelled with
/// [`CancelReason::RaceLost`]. The countdown starts when the computation is
/// invoked, not when this function is called.
pub fn timeout<T: Send + 'static>(computation: Async<T>, limit: Duration) -> Async<T> {
    race(
        computation,
        sleep(limit).bind(|()| Async::cancel(CancelReason::Timeout)),
    )
}

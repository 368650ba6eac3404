use std::time::Duration;

use futures::task::Spawn;

use crate::{
    Async,
    bridge::{from_future, from_try_future},
    timing,
};

/// Extend `Async` with time-based operations.
pub trait TimingExt<T> {
    fn delay(self, due: Duration) -> Async<T>;

    fn timeout(self, time_limit: Duration) -> Async<T>;
}

impl<T: Send + 'static> TimingExt<T> for Async<T> {
    fn delay(self, due: Duration) -> Async<T> {
        timing::delay(self, due)
    }

    fn timeout(self, time_limit: Duration) -> Async<T> {
        timing::timeout(self, time_limit)
    }
}

/// Extend `Future` with conversion into a leaf computation.
pub trait IntoAsync: Future {
    fn into_async<S>(self, spawner: S) -> Async<Self::Output>
    where
        Self: Sized + Send + 'static,
        Self::Output: Send + 'static,
        S: Spawn + Send + 'static,
    {
        from_future(spawner, self)
    }

    fn try_into_async<S, T, E>(self, spawner: S) -> Async<T>
    where
        Self: Future<Output = Result<T, E>> + Sized + Send + 'static,
        T: Send + 'static,
        E: Into<crate::Error> + 'static,
        S: Spawn + Send + 'static,
    {
        from_try_future(spawner, self)
    }
}

impl<F> IntoAsync for F where F: Future {}

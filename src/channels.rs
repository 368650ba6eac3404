//! Completion channels and the single-fire guard around them.
//!
//! A computation reports its result through exactly one of three channels:
//! value, error or cancellation. The caller supplies the channels as a
//! [`Channels`] triple; the computation only ever sees a [`Completion`], a guarded
//! handle that enforces the rule that one channel fires exactly once per
//! invocation.
//!
//! [`Completion`] is cheap to clone so a leaf can hand it to a timer thread or an
//! I/O callback. Firing consumes the handle, and the guard shared between clones
//! turns a second fire into a [`ContractViolation`] panic instead of silently
//! invoking another callback.

use std::{
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU8, Ordering},
    },
};

use crate::{
    CancelReason, Error,
    error::{ContractViolation, raise},
};

/// One of the three completion channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Value,
    Error,
    Cancelled,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Value => write!(f, "value"),
            Channel::Error => write!(f, "error"),
            Channel::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The terminal result of one invocation.
#[derive(Clone, Debug)]
pub enum Outcome<T> {
    Value(T),
    Error(Error),
    Cancelled(CancelReason),
}

impl<T> Outcome<T> {
    /// The channel this outcome is delivered on.
    #[must_use]
    pub fn channel(&self) -> Channel {
        match self {
            Outcome::Value(_) => Channel::Value,
            Outcome::Error(_) => Channel::Error,
            Outcome::Cancelled(_) => Channel::Cancelled,
        }
    }

    #[must_use]
    pub fn is_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled(_))
    }

    /// Returns the produced value, discarding errors and cancellations.
    pub fn value(self) -> Option<T> {
        match self {
            Outcome::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the error, if this outcome is one.
    pub fn error(self) -> Option<Error> {
        match self {
            Outcome::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Returns the cancellation reason, if this outcome is one.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            Outcome::Cancelled(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Maps the value, leaving errors and cancellations as they are.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Value(value) => Outcome::Value(f(value)),
            Outcome::Error(error) => Outcome::Error(error),
            Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
        }
    }
}

type Sink<T> = Box<dyn FnOnce(Outcome<T>) + Send>;
type ParkHook = Box<dyn FnOnce() + Send>;

/// The three callbacks a caller hands to [`run`](crate::run).
///
/// Internally the triple collapses into a single sink taking an [`Outcome`], so
/// at most one of the callbacks can ever be reached. An optional park hook is
/// told when the computation declares it will never complete.
pub struct Channels<T> {
    sink: Sink<T>,
    on_park: Option<ParkHook>,
}

impl<T: 'static> Channels<T> {
    /// Builds channels from separate value, error and cancellation callbacks.
    pub fn new(
        on_value: impl FnOnce(T) + Send + 'static,
        on_error: impl FnOnce(Error) + Send + 'static,
        on_cancelled: impl FnOnce(CancelReason) + Send + 'static,
    ) -> Self {
        Self::from_fn(move |outcome| match outcome {
            Outcome::Value(value) => on_value(value),
            Outcome::Error(error) => on_error(error),
            Outcome::Cancelled(reason) => on_cancelled(reason),
        })
    }

    /// Builds channels from one callback that receives the whole outcome.
    pub fn from_fn(sink: impl FnOnce(Outcome<T>) + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            on_park: None,
        }
    }

    /// Calls `hook` if the computation parks instead of firing a channel.
    ///
    /// Combinators use this to pass "pending forever" on to their own
    /// completion, so a parked chain is not mistaken for an abandoned one.
    pub fn on_park(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_park = Some(Box::new(hook));
        self
    }
}

const PENDING: u8 = 0;
const FIRED_VALUE: u8 = 1;
const FIRED_ERROR: u8 = 2;
const FIRED_CANCELLED: u8 = 3;
const PARKED: u8 = 4;

fn fired_state(channel: Channel) -> u8 {
    match channel {
        Channel::Value => FIRED_VALUE,
        Channel::Error => FIRED_ERROR,
        Channel::Cancelled => FIRED_CANCELLED,
    }
}

fn fired_channel(state: u8) -> Option<Channel> {
    match state {
        FIRED_VALUE => Some(Channel::Value),
        FIRED_ERROR => Some(Channel::Error),
        FIRED_CANCELLED => Some(Channel::Cancelled),
        _ => None,
    }
}

struct Slot<T> {
    state: AtomicU8,
    channels: Mutex<Option<Channels<T>>>,
}

impl<T> Slot<T> {
    fn take_channels(&self) -> Option<Channels<T>> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == PENDING {
            tracing::warn!(violation = %ContractViolation::Abandoned, "computation never resolved");
        }
    }
}

/// Guarded handle through which a computation reports its single outcome.
///
/// Clones share one guard: whichever clone fires first wins, and any later fire
/// through any clone is a [`ContractViolation`].
pub struct Completion<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("state", &self.slot.state.load(Ordering::Acquire))
            .finish()
    }
}

impl<T> Completion<T> {
    /// Arms a guard around the given channels.
    pub fn new(channels: Channels<T>) -> Self {
        Self {
            slot: Arc::new(Slot {
                state: AtomicU8::new(PENDING),
                channels: Mutex::new(Some(channels)),
            }),
        }
    }

    /// Fires the value channel.
    pub fn value(self, value: T) {
        self.complete(Outcome::Value(value));
    }

    /// Fires the error channel.
    pub fn error(self, error: impl Into<Error>) {
        self.complete(Outcome::Error(error.into()));
    }

    /// Fires the cancellation channel.
    pub fn cancelled(self, reason: CancelReason) {
        self.complete(Outcome::Cancelled(reason));
    }

    /// Delivers `outcome` on its channel.
    ///
    /// # Panics
    ///
    /// Panics with a [`ContractViolation`] if a channel already fired for this
    /// invocation or the completion was parked.
    #[track_caller]
    pub fn complete(self, outcome: Outcome<T>) {
        let channel = outcome.channel();
        match self.slot.state.compare_exchange(
            PENDING,
            fired_state(channel),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                if let Some(Channels { sink, on_park }) = self.slot.take_channels() {
                    drop(on_park);
                    sink(outcome);
                }
            }
            Err(PARKED) => raise(ContractViolation::FiredAfterPark(channel)),
            Err(previous) => raise(ContractViolation::DoubleFire {
                first: fired_channel(previous).unwrap_or(channel),
                second: channel,
            }),
        }
    }

    /// Declares that this invocation will never complete.
    ///
    /// Only computations documented as pending forever, such as
    /// [`never`](crate::never), may park. The channels are released without
    /// being called, and their park hook, if any, runs instead.
    ///
    /// # Panics
    ///
    /// Panics with a [`ContractViolation`] if a channel already fired.
    #[track_caller]
    pub fn park(self) {
        match self.slot.state.compare_exchange(
            PENDING,
            PARKED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                if let Some(Channels { sink, on_park }) = self.slot.take_channels() {
                    drop(sink);
                    if let Some(hook) = on_park {
                        hook();
                    }
                }
            }
            Err(PARKED) => {}
            Err(previous) => raise(ContractViolation::ParkedAfterFire(
                fired_channel(previous).unwrap_or(Channel::Value),
            )),
        }
    }

    /// Returns `true` once a channel has fired or the completion was parked.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.state.load(Ordering::Acquire) != PENDING
    }
}

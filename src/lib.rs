//! Deferred, continuation-driven computations with cooperative cancellation.
//!
//! `asyncomp` provides a small algebra for describing work that completes later
//! without blocking a thread. A computation of type [`Async<T>`] eventually
//! reports exactly one of three outcomes, through exactly one of three channels:
//! a value, an [`Error`], or a cancellation with a [`CancelReason`].
//!
//! The crate is designed to work independently of any specific async runtime.
//! Leaves may complete synchronously on the caller's thread or later from any
//! other thread; the algebra only relies on the contract they obey.
//!
//! Features include:
//! - Constructors for every outcome: [`succeed`], [`fail`], [`cancel`](fn@cancel), and
//!   [`never`] for computations that deliberately never resolve
//! - [`bind`](fn@bind) for sequencing, with panics in binders contained on the error
//!   channel and cancellation re-checked before each binder runs
//! - Derived combinators: [`map`](fn@map), [`map_err`], [`recover`], [`combine`],
//!   [`join_all`], [`race`](fn@race) and [`race_all`]
//! - An [`ExecutionContext`] carrying the cancellation signal, deadlines and
//!   child scopes through a chain
//! - A single-fire guard on every [`Completion`] that turns a double completion
//!   into a loud [`ContractViolation`]
//! - Bridges to `std::future::Future` and timing leaves ([`timing`])
//!
//! Steps run through a per-context work-list instead of nested calls, so chains
//! of any length run in constant stack depth.
//!
//! # Example
//! ```
//! # use std::sync::mpsc;
//! use asyncomp::{CancelReason, ExecutionContext, run, succeed};
//!
//! let (tx, rx) = mpsc::channel();
//! let ctx = ExecutionContext::new();
//! ctx.cancel(CancelReason::UserRequested);
//!
//! let tx_value = tx.clone();
//! let tx_error = tx.clone();
//! run(
//!     succeed(1).bind(|x| succeed(x + 1)),
//!     &ctx,
//!     move |value| tx_value.send(format!("value {value}")).unwrap(),
//!     move |error| tx_error.send(format!("error {error}")).unwrap(),
//!     move |reason| tx.send(format!("cancelled {reason}")).unwrap(),
//! );
//! assert_eq!(rx.recv().unwrap(), "cancelled user requested");
//! ```

pub mod async_ext;
pub mod bind;
pub mod bridge;
pub mod cancel;
pub mod channels;
pub mod computation;
pub mod context;
pub mod error;
pub mod join;
pub mod map;
pub mod race;
mod reclaim;
pub mod timing;

pub use bind::{bind, try_bind};
pub use bridge::{OutcomeFuture, from_future, from_try_future};
pub use cancel::CancelReason;
pub use channels::{Channel, Channels, Completion, Outcome};
pub use computation::{Async, Computation, cancel, fail, from_fn, lazy, never, run, succeed};
pub use context::{CancelHandle, ContextBuilder, ExecutionContext};
pub use error::{ContractViolation, Error};
pub use join::{combine, join_all};
pub use map::{map, map_err, recover};
pub use race::{race, race_all};

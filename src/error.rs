//! Error types.
//!
//! Two kinds of failure are kept strictly apart. [`Error`] is a domain error: it
//! travels through the error channel, combinators forward it untouched, and the
//! caller may recover from it. [`ContractViolation`] is a programming defect in a
//! computation (for example a completion fired twice); it is never delivered
//! through a channel and is raised as a panic instead.

use std::{any::Any, borrow::Cow, sync::Arc};

use crate::channels::Channel;

/// A domain error delivered through the error channel.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A plain error message.
    #[error("{0}")]
    Message(Cow<'static, str>),

    /// An error produced by some other library.
    #[error(transparent)]
    Source(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// A binder (or recovery handler) panicked while building the next
    /// computation. The panic was caught and turned into this error.
    #[error("binder panicked: {0}")]
    BinderPanicked(String),
}

impl Error {
    /// Creates an error from a message.
    pub fn msg(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Message(message.into())
    }

    /// Wraps any error type.
    pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Source(Arc::new(error))
    }

    /// Returns `true` if this error was produced by a panicking binder.
    #[must_use]
    pub fn is_binder_panic(&self) -> bool {
        matches!(self, Error::BinderPanicked(_))
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Error::BinderPanicked(message)
    }
}

impl From<&'static str> for Error {
    fn from(message: &'static str) -> Self {
        Error::Message(Cow::Borrowed(message))
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Message(Cow::Owned(message))
    }
}

/// A breach of the single-completion contract.
///
/// These are bugs in a computation, not conditions a caller can handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ContractViolation {
    /// A second channel fired for an invocation that had already completed.
    #[error("completion fired twice: first on `{first}`, then on `{second}`")]
    DoubleFire { first: Channel, second: Channel },

    /// A channel fired after the computation parked its completion as
    /// pending forever.
    #[error("completion fired on `{0}` after it was parked")]
    FiredAfterPark(Channel),

    /// A completion was parked after one of its channels had already fired.
    #[error("completion parked after firing on `{0}`")]
    ParkedAfterFire(Channel),

    /// Every handle to a completion was dropped while none of its channels had
    /// fired. Reported as a warning only, since the owner may be gone.
    #[error("completion dropped before any channel fired")]
    Abandoned,
}

/// Reports a contract violation and aborts the current computation.
#[track_caller]
pub(crate) fn raise(violation: ContractViolation) -> ! {
    tracing::error!(%violation, "async contract violated");
    panic!("async contract violated: {violation}");
}

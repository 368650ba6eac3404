//! Reasons a computation can terminate through its cancellation channel.

use std::fmt;

/// Why a computation ended on its cancellation channel instead of producing a
/// value or an error.
///
/// Cancellation is not an error: it is a distinct terminal outcome. The set of
/// reasons is open for extension, so matching on it needs a wildcard arm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CancelReason {
    /// No cause was recorded.
    #[default]
    Unknown,

    /// A deadline attached to the execution context elapsed, or a
    /// [`timeout`](crate::timing::timeout) fired.
    Timeout,

    /// Cancellation was requested explicitly by the caller.
    UserRequested,

    /// A sibling computation failed and the enclosing combinator gave up on the
    /// remaining work.
    UpstreamFailure,

    /// Another branch of a [`race`](fn@crate::race) settled first.
    RaceLost,
}

impl CancelReason {
    /// Stable numeric code for this reason, suitable for logs and FFI.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            CancelReason::Unknown => 0x0001,
            CancelReason::Timeout => 0x0002,
            CancelReason::UserRequested => 0x0004,
            CancelReason::UpstreamFailure => 0x0008,
            CancelReason::RaceLost => 0x0010,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Unknown => write!(f, "unknown"),
            CancelReason::Timeout => write!(f, "timeout"),
            CancelReason::UserRequested => write!(f, "user requested"),
            CancelReason::UpstreamFailure => write!(f, "upstream failure"),
            CancelReason::RaceLost => write!(f, "race lost"),
        }
    }
}

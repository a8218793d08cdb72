//! Error types of the time sync

use core::{convert::Infallible, fmt};

use ssmarshal;

use crate::util::TimeoutError;


/// An error that can occur while running the time sync
///
/// `E` is the error type of the [`Scheduler`] implementation. Errors reported
/// by the scheduler are passed through unchanged.
///
/// [`Scheduler`]: ../scheduler/trait.Scheduler.html
#[derive(Debug)]
pub enum Error<E> {
    /// A configuration value is malformed, or the requested sync frequency is
    /// not supported by the scheduler
    InvalidParameter,

    /// The operation is not allowed in the current lifecycle phase, or the
    /// reference clock is misconfigured
    InvalidState,

    /// The operation is not supported
    NotSupported,

    /// The scheduler rejected a request
    Scheduler(E),

    /// A bounded busy-wait on a hardware flag expired
    Timeout,

    /// A sync packet could not be serialized or deserialized
    Encoding(ssmarshal::Error),

    /// The scheduler contract was violated
    ///
    /// This is never recovered from. The callback entry points of
    /// [`TimeSync`] panic with this value.
    ///
    /// [`TimeSync`]: ../hl/struct.TimeSync.html
    Fatal(Fatal),
}

impl<E> From<ssmarshal::Error> for Error<E> {
    fn from(error: ssmarshal::Error) -> Self {
        Error::Encoding(error)
    }
}

impl<E> From<TimeoutError<Infallible>> for Error<E> {
    fn from(_: TimeoutError<Infallible>) -> Self {
        Error::Timeout
    }
}

impl<E> From<Fatal> for Error<E> {
    fn from(fatal: Fatal) -> Self {
        Error::Fatal(fatal)
    }
}


/// A violation of the scheduler contract, with the place it was detected
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Fatal {
    /// What went wrong
    pub kind: FatalKind,

    /// The source file that detected the violation
    pub file: &'static str,

    /// The line that detected the violation
    pub line: u32,
}

/// The kinds of scheduler contract violations
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FatalKind {
    /// The scheduler delivered a signal type that doesn't exist
    UnknownSignal(u8),

    /// The scheduler reported that a value returned from the signal callback
    /// was invalid
    InvalidCallbackReturn,
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} at {}:{}", self.kind, self.file, self.line)
    }
}


/// Creates a [`Fatal`] that points at the invocation site
macro_rules! fatal {
    ($kind:expr) => {
        $crate::error::Fatal {
            kind: $kind,
            file: file!(),
            line: line!(),
        }
    };
}


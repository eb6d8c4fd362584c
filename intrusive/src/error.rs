use std::fmt::{self, Display};

use crate::config;

/// Source position of the access that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: &'static str,
    pub line: u32,
}

impl Location {
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Every error this crate reports. None of them are retried internally;
/// they always surface at the call that detected them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A handle that owns nothing was dereferenced.
    #[error("{location}: NullAccess")]
    NullAccess { location: Location },
    /// `dec_ref` on an object whose count was already zero (or below).
    #[error("{location}: RefCountUnderflow: decrement of a count at {observed}")]
    RefCountUnderflow { location: Location, observed: i32 },
    /// `inc_ref` on a corrupted (negative) or saturated count.
    #[error("{location}: RefCountOverflow: increment of a count at {observed}")]
    RefCountOverflow { location: Location, observed: i32 },
    #[error("Config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// What [`Error::raise`] does with an error it cannot return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Panic with the error as the payload.
    Raise,
    /// Log the error and abort the process.
    Abort,
}

impl Error {
    #[track_caller]
    pub fn null_access() -> Self {
        Error::NullAccess {
            location: Location::caller(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Error::NullAccess { .. } => "NullAccess",
            Error::RefCountUnderflow { .. } => "RefCountUnderflow",
            Error::RefCountOverflow { .. } => "RefCountOverflow",
            Error::Config(_) => "Config",
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            Error::NullAccess { location }
            | Error::RefCountUnderflow { location, .. }
            | Error::RefCountOverflow { location, .. } => Some(*location),
            Error::Config(_) => None,
        }
    }

    /// True for the errors that mean a count was corrupted, as opposed to a
    /// caller touching a null handle.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::RefCountUnderflow { .. } | Error::RefCountOverflow { .. }
        )
    }

    /// Signals the error from a path that has no `Result` to return it through.
    ///
    /// Depending on the installed [`Config`](crate::Config) this either aborts
    /// the process or panics with `self` as the payload, which callers can
    /// recover with `std::panic::catch_unwind` and `downcast_ref::<Error>()`.
    pub fn raise(self) -> ! {
        match config::current().disposition(&self) {
            Disposition::Abort => {
                log::error!("aborting on {}", self);
                std::process::abort()
            }
            Disposition::Raise => std::panic::panic_any(self),
        }
    }
}

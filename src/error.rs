//! Diagnostic error wrapping.
//!
//! [`TracedError`] attaches the call site at which an error entered the
//! dispatch layer without changing its display or identity. Wrapping is
//! idempotent: an already-traced error passes through unchanged, so repeated
//! wrapping across layers never replaces the first-captured origin with a
//! less useful one.

use std::error::Error;
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Boxed error type used at handler boundaries.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Errors raised while composing the route table, before serving begins.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("route '{pattern}' registered without handlers")]
    EmptyRoute { pattern: String },
}

impl BuildError {
    pub fn invalid_pattern(pattern: impl ToString, reason: impl ToString) -> Self {
        Self::InvalidPattern { pattern: pattern.to_string(), reason: reason.to_string() }
    }

    pub fn empty_route<S: ToString>(pattern: S) -> Self {
        Self::EmptyRoute { pattern: pattern.to_string() }
    }
}

/// The call site captured when an error was first wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    file: &'static str,
    line: u32,
    function: Option<&'static str>,
}

impl Origin {
    pub fn file(&self) -> &'static str {
        self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn function(&self) -> Option<&'static str> {
        self.function
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.function {
            Some(function) => write!(f, "{}:{} in {}", self.file, self.line, function),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// An error annotated with the origin at which it was wrapped.
///
/// Displays exactly like the underlying error; the origin only surfaces
/// through [`TracedError::origin`] and the end-of-request log.
#[derive(Debug)]
pub struct TracedError {
    source: BoxError,
    origin: Origin,
}

impl TracedError {
    /// Wraps `err` with the immediate caller's file and line. If `err` is
    /// already traced it is returned unchanged.
    #[track_caller]
    pub fn wrap(err: BoxError) -> BoxError {
        Self::wrap_named(err, None)
    }

    /// Like [`TracedError::wrap`], additionally recording the enclosing
    /// function name. Usually invoked through the [`traced!`] macro.
    #[track_caller]
    pub fn wrap_in(err: BoxError, function: &'static str) -> BoxError {
        Self::wrap_named(err, Some(function))
    }

    #[track_caller]
    fn wrap_named(err: BoxError, function: Option<&'static str>) -> BoxError {
        if err.is::<TracedError>() {
            return err;
        }
        let location = Location::caller();
        Box::new(TracedError {
            source: err,
            origin: Origin { file: location.file(), line: location.line(), function },
        })
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }
}

impl fmt::Display for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl Error for TracedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Wraps an error with file, line, and the enclosing function name.
#[macro_export]
macro_rules! traced {
    ($err:expr) => {{
        fn here() {}
        fn name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let function = name_of(here).trim_end_matches("::here");
        $crate::error::TracedError::wrap_in(::std::convert::Into::into($err), function)
    }};
}

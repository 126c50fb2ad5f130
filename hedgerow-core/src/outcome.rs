//! Outcome of a single execution attempt.
//!
//! An [`Outcome`] is either the value produced by the user callback or the
//! failure it ended with. Strategies never raise attempt failures as errors;
//! they carry them as outcomes so a race can continue past a failed attempt.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Shared failure value carried by [`Outcome::Failure`].
pub type Failure = Arc<dyn StdError + Send + Sync + 'static>;

/// Failures produced by the toolkit itself rather than by user callbacks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// The attempt was cancelled before it produced a value.
    #[error("execution was cancelled")]
    Cancelled,
    /// User code panicked while running the attempt.
    #[error("execution panicked: {0}")]
    Panicked(String),
    /// The attempt task went away without storing an outcome.
    #[error("execution was abandoned before completion")]
    Abandoned,
}

impl ExecutionError {
    /// Builds a [`ExecutionError::Panicked`] from a panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

/// Result of one attempt: either a success value or a failure.
pub enum Outcome<T> {
    /// The callback produced a value.
    Success(T),
    /// The callback failed.
    Failure(Failure),
}

impl<T> Outcome<T> {
    /// Creates a success outcome.
    pub fn from_result(result: T) -> Self {
        Self::Success(result)
    }

    /// Creates a failure outcome from any error value.
    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Failure(Arc::new(error))
    }

    /// Creates a failure outcome from an already shared failure.
    pub fn from_failure(failure: Failure) -> Self {
        Self::Failure(failure)
    }

    /// Returns `true` if the outcome holds a success value.
    pub fn has_result(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the success value, if any.
    pub fn result(&self) -> Option<&T> {
        match self {
            Self::Success(result) => Some(result),
            Self::Failure(_) => None,
        }
    }

    /// Returns the failure, if any.
    pub fn error(&self) -> Option<&Failure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Returns `true` if the failure is of type `E`.
    pub fn is_error<E>(&self) -> bool
    where
        E: StdError + 'static,
    {
        self.error().is_some_and(|failure| failure.is::<E>())
    }

    /// Converts the outcome into a standard `Result`.
    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            Self::Success(result) => Ok(result),
            Self::Failure(failure) => Err(failure),
        }
    }

    /// Maps the success value, leaving failures untouched.
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(result) => Outcome::Success(f(result)),
            Self::Failure(failure) => Outcome::Failure(failure),
        }
    }

    /// Reinterprets a failure outcome as an outcome of another result type.
    ///
    /// Only failures can change their result type. A success outcome is
    /// handed back unchanged in `Err`; callers treat that as a contract
    /// violation.
    pub fn try_cast<U>(self) -> Result<Outcome<U>, Self> {
        match self {
            Self::Failure(failure) => Ok(Outcome::Failure(failure)),
            success => Err(success),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T>
where
    E: StdError + Send + Sync + 'static,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(result) => Self::from_result(result),
            Err(error) => Self::from_error(error),
        }
    }
}

impl<T: Clone> Clone for Outcome<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Success(result) => Self::Success(result.clone()),
            Self::Failure(failure) => Self::Failure(Arc::clone(failure)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(result) => f.debug_tuple("Success").field(result).finish(),
            Self::Failure(failure) => f
                .debug_tuple("Failure")
                .field(&format_args!("{failure}"))
                .finish(),
        }
    }
}

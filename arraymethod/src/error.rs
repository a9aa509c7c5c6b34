/*
 * Copyright (c) Microsoft Corporation.
 * Licensed under the MIT license.
 */

use std::fmt::{Debug, Display};

use arraymethod_dtype::{CastingLevel, DTypeError};
use thiserror::Error;

use crate::{CallError, LoopError, MethodFlags, RegistrationError};

/// Convenience alias for a `Result<T, MethodError>`.
pub type MethodResult<T> = Result<T, MethodError>;

/// The error type returned by array method construction, resolution and calls.
///
/// The [`MethodErrorKind`] tells which layer the error originated in. The concrete cause
/// can be retrieved with [`MethodError::downcast_ref`].
/// ```rust
/// use arraymethod::{MethodError, MethodErrorKind, RegistrationError};
///
/// let err = MethodError::from(RegistrationError::MissingStridedLoop {
///     method: "add".into(),
/// });
/// assert_eq!(err.kind(), MethodErrorKind::Registration);
/// assert!(matches!(
///     err.downcast_ref::<RegistrationError>(),
///     Some(RegistrationError::MissingStridedLoop { .. })
/// ));
/// ```
///
/// Errors record the file and line where they were first constructed.
#[derive(Debug)]
pub struct MethodError {
    kind: MethodErrorKind,
    error: anyhow::Error,
}

impl MethodError {
    /// Construct a new `MethodError` encapsulating `err`.
    ///
    /// # Attributes
    ///
    /// - `track_caller`: The error is wrapped in a `Located` recording the caller.
    /// - `inline(never)`: Keeps error construction out of the happy path.
    #[track_caller]
    #[inline(never)]
    pub fn new<E>(kind: MethodErrorKind, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            error: anyhow::Error::new(Located::new(err)),
        }
    }

    /// Attempt to downcast the error object by reference.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: Display + Debug + Send + Sync + 'static,
    {
        match self.error.downcast_ref::<E>() {
            Some(err) => Some(err),
            None => self.error.downcast_ref::<Located<E>>().map(|e| &e.err),
        }
    }

    /// Attach the context to `Self` and return a new error.
    #[track_caller]
    #[inline(never)]
    pub fn context<C>(self, context: C) -> Self
    where
        C: Display + Debug + Send + Sync + 'static,
    {
        Self {
            kind: self.kind,
            error: self.error.context(Located::new(context)),
        }
    }

    /// Return the kind of the originally constructed error.
    pub fn kind(&self) -> MethodErrorKind {
        self.kind
    }
}

impl Display for MethodError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The alternate form of `anyhow::Error` prints the whole context chain.
        write!(formatter, "{} error: {:#}", self.kind, self.error)
    }
}

impl std::error::Error for MethodError {
    // Don't implement `source` because we print the whole chain in our `Display`
    // implementation.
}

/// The layer an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodErrorKind {
    /// A malformed method specification. Raised at construction time.
    Registration,
    /// Invalid arguments to one of the direct call entry points.
    Call,
    /// An invariant was violated by a resolver, selector or the core itself.
    Internal,
    /// An inner loop reported failure.
    Execution,
    /// A type class operation failed.
    DType,
}

impl MethodErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            MethodErrorKind::Registration => "registration",
            MethodErrorKind::Call => "call",
            MethodErrorKind::Internal => "internal",
            MethodErrorKind::Execution => "execution",
            MethodErrorKind::DType => "dtype",
        }
    }
}

impl Display for MethodErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invariant violations. These indicate a bug in a resolver, a selector or a
/// registration, never a user error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum InternalFault {
    #[error(
        "invalid use of the default resolver without inputs or with an input DType \
         missing (method: {method})"
    )]
    DefaultResolverWithoutInputs { method: String },

    #[error(
        "the default resolver cannot instantiate the parametric DType {dtype} for a \
         deferred output (method: {method})"
    )]
    ParametricDeferredOutput { method: String, dtype: String },

    #[error("the default resolver requires a declared casting level (method: {method})")]
    UndeclaredCasting { method: String },

    #[error(
        "resolved casting level {got} is safer than the declared level {declared} \
         (method: {method})"
    )]
    CastingMismatch {
        method: String,
        declared: CastingLevel,
        got: CastingLevel,
    },

    #[error(
        "resolved casting level changed from {declared} to {got} even though the method \
         is not parametric; only equivalent may change to no casting (method: {method})"
    )]
    NonParametricCastingChanged {
        method: String,
        declared: CastingLevel,
        got: CastingLevel,
    },

    #[error("expected {expected} {what}, got {got} (method: {method})")]
    ArgumentCount {
        method: String,
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error(
        "the selected loop reports flags {got:?} that are not among the declared runtime \
         flags {declared:?} (method: {method})"
    )]
    FlagsMismatch {
        method: String,
        declared: MethodFlags,
        got: MethodFlags,
    },

    #[error("the default loop selector requires registered loops (method: {method})")]
    MissingLoops { method: String },

    #[error("no unaligned loops are registered (method: {method})")]
    UnalignedNotSupported { method: String },
}

macro_rules! impl_from {
    ($err:ty, $kind:ident) => {
        impl From<$err> for MethodError {
            #[track_caller]
            fn from(err: $err) -> Self {
                MethodError::new(MethodErrorKind::$kind, err)
            }
        }
    };
}

impl_from!(RegistrationError, Registration);
impl_from!(CallError, Call);
impl_from!(InternalFault, Internal);
impl_from!(LoopError, Execution);
impl_from!(DTypeError, DType);

/// An internal wrapper for error types that also tracks the file and line information
/// for where the error was first converted and where context was propagated.
#[derive(Debug)]
struct Located<T>
where
    T: Debug,
{
    err: T,
    location: &'static std::panic::Location<'static>,
}

impl<T> Located<T>
where
    T: Debug,
{
    #[track_caller]
    fn new(err: T) -> Self {
        Self {
            err,
            location: std::panic::Location::caller(),
        }
    }
}

impl<T> Display for Located<T>
where
    T: Display + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -- ({}:{})",
            self.err,
            self.location.file(),
            self.location.line()
        )
    }
}

impl<T> std::error::Error for Located<T>
where
    T: std::error::Error + Debug,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.err.source()
    }
}

/// Add context to a returned error that will be included in the error chain.
pub trait ErrorContext<T> {
    /// Attach the provided context to the error part of the result.
    fn context<C>(self, context: C) -> MethodResult<T>
    where
        C: Display + Debug + Send + Sync + 'static;

    /// Attach the context returned by `f` to the error part of the result.
    ///
    /// `f` is only evaluated if `self` is an `Err`.
    fn with_context<F, C>(self, f: F) -> MethodResult<T>
    where
        C: Display + Debug + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    MethodError: From<E>,
{
    #[track_caller]
    fn context<C>(self, context: C) -> MethodResult<T>
    where
        C: Display + Debug + Send + Sync + 'static,
    {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(MethodError::from(error).context(context)),
        }
    }

    #[track_caller]
    fn with_context<F, C>(self, f: F) -> MethodResult<T>
    where
        C: Display + Debug + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(MethodError::from(error).context(f())),
        }
    }
}

///////////
// Tests //
///////////

//! Tether Response Types
//!
//! This module defines what travels back to the caller after a call.

use serde::{Deserialize, Serialize};

use super::error::{Result, TetherError};
use super::marshal::{Marshal, Payload};

/// Category of a per-call failure reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    NoImplementationFound,
    AmbiguousImplementation,
    MethodNotFound,
    TypeMismatch,
    ServiceFailure,
    MalformedRequest,
}

/// A structured per-call failure, delivered instead of closing the
/// connection so the blocked caller wakes up deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFault {
    pub kind: FaultKind,
    pub message: String,
}

impl From<&TetherError> for RemoteFault {
    fn from(err: &TetherError) -> Self {
        let kind = match err {
            TetherError::NoImplementationFound(_) => FaultKind::NoImplementationFound,
            TetherError::AmbiguousImplementation { .. } => FaultKind::AmbiguousImplementation,
            TetherError::MethodNotFound { .. } => FaultKind::MethodNotFound,
            TetherError::TypeMismatch { .. } => FaultKind::TypeMismatch,
            TetherError::Serialization(_) => FaultKind::MalformedRequest,
            _ => FaultKind::ServiceFailure,
        };
        RemoteFault {
            kind,
            message: err.to_string(),
        }
    }
}

/// Outcome of a call as seen on the wire.
///
/// # Invariant
///
/// `Value` never carries a sentinel payload; build results with
/// [`CallResult::returned`] so that `Null` becomes `ExplicitNull` and
/// `Absent` becomes `NoReturn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallResult {
    Value(Payload),
    /// A non-void method returned null
    ExplicitNull,
    /// The method is declared void
    NoReturn,
    Error(RemoteFault),
}

impl CallResult {
    /// Wraps a method's return payload, mapping sentinels to their variants.
    pub fn returned(payload: Payload) -> Self {
        match payload {
            Payload::Null => CallResult::ExplicitNull,
            Payload::Absent => CallResult::NoReturn,
            value => CallResult::Value(value),
        }
    }

    pub fn fault(err: &TetherError) -> Self {
        CallResult::Error(RemoteFault::from(err))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CallResult::Error(_))
    }

    /// Decodes the result into the caller's declared return type.
    ///
    /// `ExplicitNull` and `NoReturn` both reach `R` as a null-equivalent
    /// payload, so a nullable `R` sees `None` either way.
    pub fn into_value<R: Marshal>(self) -> Result<R> {
        match self {
            CallResult::Value(payload) => R::from_payload(payload),
            CallResult::ExplicitNull => R::from_payload(Payload::Null),
            CallResult::NoReturn => R::from_payload(Payload::Absent),
            CallResult::Error(fault) => Err(fault.into()),
        }
    }

    /// Completes a void call; any non-error result is accepted.
    pub fn into_unit(self) -> Result<()> {
        match self {
            CallResult::Error(fault) => Err(fault.into()),
            _ => Ok(()),
        }
    }
}

impl From<RemoteFault> for TetherError {
    fn from(fault: RemoteFault) -> Self {
        TetherError::Remote {
            kind: fault.kind,
            message: fault.message,
        }
    }
}

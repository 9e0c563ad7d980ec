// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use miette::Diagnostic;
use thiserror::Error;

/// Which side of a validation check failed: the circuit's own op-set, or
/// the noise model attached to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpSide {
    Circuit,
    Noise,
}

impl std::fmt::Display for OpSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpSide::Circuit => write!(f, "circuit"),
            OpSide::Noise => write!(f, "noise model"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    /// The job document could not be decoded as JSON, or was missing a
    /// required field.
    ///
    /// ✅ This does not contain user data and can be logged
    #[error("failed to parse job document: {0}")]
    #[diagnostic(code("BatchController.ParseError.InvalidJson"))]
    InvalidJson(String),
}

#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    /// A circuit's or noise model's op-set is not a subset of the
    /// back-end's supported op-set.
    #[error("back-end '{backend}' does not support this {side}'s instructions: {missing:?}")]
    #[diagnostic(code("BatchController.ValidationError.UnsupportedOps"))]
    UnsupportedOps {
        backend: String,
        side: OpSide,
        missing: Vec<String>,
    },
    /// The memory required to run a circuit on one process exceeds the
    /// configured budget.
    #[error(
        "circuit '{circuit}' requires more memory than the {max_memory_mb} MiB budget allows on back-end '{backend}'"
    )]
    #[diagnostic(code("BatchController.ValidationError.MemoryBudgetExceeded"))]
    MemoryBudgetExceeded {
        circuit: String,
        backend: String,
        max_memory_mb: u64,
    },
}

#[derive(Debug, Error, Diagnostic)]
pub enum OutOfMemoryError {
    /// No single experiment fits within the configured memory budget, even
    /// alone.
    #[error("no experiment fits within the {max_memory_mb} MiB memory budget")]
    #[diagnostic(code("BatchController.OutOfMemoryError.NoExperimentFits"))]
    NoExperimentFits { max_memory_mb: u64 },
}

#[derive(Debug, Error, Diagnostic)]
pub enum BackendError {
    /// A back-end invocation for one shot (or shot bucket) failed.
    ///
    /// ❌ May contain user data surfaced by the back-end and cannot be
    /// logged as-is.
    #[error("{0}")]
    #[diagnostic(code("BatchController.BackendError.ExecutionFailed"))]
    ExecutionFailed(String),
}

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(ParseError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(ValidationError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    OutOfMemory(OutOfMemoryError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Backend(BackendError),
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<ValidationError> for Error {
    fn from(error: ValidationError) -> Self {
        Self::Validation(error)
    }
}

impl From<OutOfMemoryError> for Error {
    fn from(error: OutOfMemoryError) -> Self {
        Self::OutOfMemory(error)
    }
}

impl From<BackendError> for Error {
    fn from(error: BackendError) -> Self {
        Self::Backend(error)
    }
}

//! Error types for the density tensor engine.

use ptmsim_core::PtmError;
use thiserror::Error;

/// Errors that can occur while operating on a density tensor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateError {
    /// Error from the PTM layer.
    #[error(transparent)]
    Ptm(#[from] PtmError),

    /// Subsystem index out of range.
    #[error("Subsystem {index} out of range for a state with {count} subsystems")]
    SubsystemOutOfRange {
        /// The requested subsystem.
        index: usize,
        /// Number of subsystems in the state.
        count: usize,
    },

    /// The same subsystem was given twice for a two-subsystem operation.
    #[error("Subsystem {0} used twice in one two-subsystem operation")]
    DuplicateSubsystem(usize),

    /// A matrix or tensor does not fit the axes it is applied to.
    #[error("{context}: expected shape {expected:?}, got {got:?}")]
    MatrixShapeMismatch {
        /// The operation that failed.
        context: &'static str,
        /// The shape the state requires.
        expected: Vec<usize>,
        /// The shape that was supplied.
        got: Vec<usize>,
    },

    /// An operation changes an axis length but no new basis was supplied.
    #[error(
        "Subsystem {subsystem}: output dimension {dim_out} differs from current {dim_current}, a new basis is required"
    )]
    MissingOutputBasis {
        /// The subsystem whose axis changes.
        subsystem: usize,
        /// Output dimension of the matrix.
        dim_out: usize,
        /// Current axis length.
        dim_current: usize,
    },

    /// Caller-supplied output buffer is too small.
    #[error("Target buffer holds {got} values, at least {required} required")]
    TargetTooSmall {
        /// Required number of values.
        required: usize,
        /// Capacity of the supplied buffer.
        got: usize,
    },

    /// Engine settings failed validation.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// The contraction backend failed.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for density tensor operations.
pub type StateResult<T> = Result<T, StateError>;

//! Error types for the operation compiler.

use ptmsim_core::PtmError;
use thiserror::Error;

/// Errors that can occur while compiling an operation stream.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompileError {
    /// Error from the PTM layer.
    #[error(transparent)]
    Ptm(#[from] PtmError),

    /// A measurement or diagonal request names no subsystems.
    #[error("Request {0} names no subsystems")]
    EmptySubsystems(usize),

    /// A subsystem appears twice in one request.
    #[error("Subsystem {0} appears twice in one request")]
    DuplicateSubsystem(String),

    /// Nothing fixes the Hilbert dimension of a subsystem.
    #[error("Hilbert dimension of subsystem {0} is unknown; supply an initial basis or a default dimension")]
    UnknownDimension(String),

    /// An operation disagrees with a subsystem's Hilbert dimension.
    #[error("Subsystem {subsystem}: expected Hilbert dimension {expected}, got {got}")]
    DimensionMismatch {
        /// The subsystem label.
        subsystem: String,
        /// Dimension established earlier.
        expected: usize,
        /// Dimension required by the offending operation.
        got: usize,
    },

    /// A compiler stage was requested out of order.
    #[error("Cannot run {requested} in stage {current}")]
    InvalidStage {
        /// The stage the compiler is in.
        current: &'static str,
        /// The step that was requested.
        requested: &'static str,
    },

    /// Compiler settings failed validation.
    #[error("Invalid compiler configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for compiler operations.
pub type CompileResult<T> = Result<T, CompileError>;

//! Error types for the simulation facade.

use ptmsim_compile::CompileError;
use ptmsim_core::PtmError;
use ptmsim_state::StateError;
use thiserror::Error;

/// Errors raised while compiling or executing a simulation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SimError {
    /// PTM construction or evaluation failed.
    #[error("PTM error: {0}")]
    Ptm(#[from] PtmError),

    /// The density tensor rejected an operation.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// The operation stream could not be compiled.
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// A block names a subsystem the simulation does not hold.
    #[error("Unknown subsystem {0}")]
    UnknownSubsystem(String),

    /// A subsystem label was registered twice.
    #[error("Subsystem {0} registered twice")]
    DuplicateSubsystem(String),

    /// Number of labels differs from the number of tensor subsystems.
    #[error("{labels} labels given for a state with {subsystems} subsystems")]
    LabelCountMismatch {
        /// Number of labels supplied.
        labels: usize,
        /// Number of subsystems in the tensor.
        subsystems: usize,
    },

    /// A block expects a different input basis than the state carries.
    #[error("Subsystem {subsystem}: block expects basis [{expected}], state is in [{actual}]")]
    BasisMismatch {
        /// The subsystem label.
        subsystem: String,
        /// Basis element names the block was compiled for.
        expected: String,
        /// Basis element names the state currently uses.
        actual: String,
    },
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;

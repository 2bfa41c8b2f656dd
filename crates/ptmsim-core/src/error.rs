//! Error types for the core crate.

use thiserror::Error;

/// Errors produced while building bases or evaluating Pauli transfer matrices.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PtmError {
    /// A matrix that must be square is not.
    #[error("{context}: matrix must be square, got {rows}x{cols}")]
    NonSquareMatrix {
        /// What was being constructed.
        context: &'static str,
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },

    /// An array has the wrong shape for the basis it is used with.
    #[error("{context}: expected shape {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// What was being constructed or evaluated.
        context: &'static str,
        /// The required shape.
        expected: Vec<usize>,
        /// The shape that was supplied.
        got: Vec<usize>,
    },

    /// Hilbert space dimensions of composed operands disagree.
    #[error("{context}: incompatible Hilbert dimensions {expected} and {got}")]
    DimensionMismatch {
        /// The composition that failed.
        context: &'static str,
        /// Dimension of the first operand.
        expected: usize,
        /// Dimension of the offending operand.
        got: usize,
    },

    /// No basis element is aligned with a computational basis state.
    #[error("basis {basis} has no element aligned with a computational basis state")]
    NoClassicalSubbasis {
        /// Display form of the basis.
        basis: String,
    },

    /// A computational basis state is not a single element of the basis.
    #[error("state |{state}> is not representable by a single element of basis {basis}")]
    UnrepresentableState {
        /// The computational basis state.
        state: usize,
        /// Display form of the basis.
        basis: String,
    },

    /// Basis element index out of range.
    #[error("basis element {index} out of range for basis with {dim_pauli} elements")]
    BasisIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of basis elements.
        dim_pauli: usize,
    },

    /// An algebraic expression has nothing to evaluate.
    #[error("{0} has no elements")]
    EmptyExpression(&'static str),

    /// A channel parameter is outside its admissible range.
    #[error("invalid parameter {name} = {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Supplied value.
        value: f64,
    },

    /// The PTM variant has no embedding into a larger Hilbert space.
    #[error("{0} cannot be embedded into a larger Hilbert space")]
    NotEmbeddable(&'static str),

    /// A PTM evaluated to a matrix with a non-negligible imaginary part.
    #[error("{context}: PTM matrix has imaginary part up to {max_imag:e}")]
    NonRealMatrix {
        /// The evaluation that produced the matrix.
        context: &'static str,
        /// Largest absolute imaginary part found.
        max_imag: f64,
    },

    /// Basis elements are not trace-orthonormal.
    #[error("basis is not orthonormal (max deviation {deviation:e})")]
    NotOrthonormal {
        /// Largest deviation from the identity Gram matrix.
        deviation: f64,
    },
}

/// Result type for basis and PTM operations.
pub type PtmResult<T> = Result<T, PtmError>;

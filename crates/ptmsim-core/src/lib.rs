//! `ptmsim-core`: Pauli bases and Pauli transfer matrix algebra.
//!
//! Density matrices of a multi-level subsystem are expanded in an orthonormal
//! basis of Hermitian matrices ([`PauliBasis`]). Linear maps on density
//! matrices are then real matrices, the Pauli transfer matrices:
//!
//! - [`Ptm`] describes a superoperator on one subsystem as a typed value
//!   (explicit matrix, linear combination, product, unitary conjugation,
//!   Hamiltonian and Lindblad generators, integrated generators) and renders
//!   it in any pair of input/output bases.
//! - [`TwoPtm`] does the same for a pair of subsystems.
//! - [`channels`] provides the usual qubit gates and noise channels.
//!
//! # Quick start
//!
//! ```rust
//! use ptmsim_core::{channels, OutputBasis, PauliBasis};
//!
//! let basis = PauliBasis::general(2);
//! let damping = channels::amplitude_damping(0.1).unwrap();
//!
//! // Only keep populations on the output side.
//! let classical = basis.get_classical_subbasis().unwrap();
//! let m = damping.get_matrix(&basis, OutputBasis::from(&classical)).unwrap();
//! assert_eq!(m.dim(), (2, 4));
//! ```

pub mod basis;
pub mod channels;
pub mod error;
pub mod linalg;
pub mod ptm;
pub mod two;

pub use basis::{basis_transform, PauliBasis};
pub use error::{PtmError, PtmResult};
pub use ptm::{OutputBasis, Ptm};
pub use two::{rebase4, OutputBases, TwoPtm, TwoPtmFactor};

//! # ptmsim
//!
//! Density-matrix simulation of qudit circuits, with operations stored as
//! Pauli transfer matrices and the state kept in a per-subsystem adaptive
//! Pauli basis.
//!
//! The pieces live in separate crates and are re-exported here:
//!
//! - [`ptm`]: Pauli bases, the PTM algebra and channel constructors
//! - [`state`]: the density tensor engine
//! - [`compile`]: fusion of operation streams into two-subsystem blocks
//!
//! [`Simulation`] ties them together.
//!
//! ## Example
//!
//! ```rust
//! use std::f64::consts::PI;
//! use ptmsim::ptm::channels::{cphase, hadamard};
//! use ptmsim::{BlockOutcome, PauliBasis, Request, Simulation};
//!
//! let mut sim = Simulation::new([
//!     ("q0", PauliBasis::general(2)),
//!     ("q1", PauliBasis::general(2)),
//! ])
//! .unwrap();
//!
//! let outcomes = sim
//!     .execute(vec![
//!         Request::single("q0", hadamard()),
//!         Request::single("q1", hadamard()),
//!         Request::two("q0", "q1", cphase(PI)),
//!         Request::single("q1", hadamard()),
//!         Request::Diagonal(vec!["q0", "q1"]),
//!     ])
//!     .unwrap();
//!
//! let BlockOutcome::Diagonal(diag) = outcomes.last().unwrap() else {
//!     unreachable!()
//! };
//! let p = diag.as_slice().unwrap();
//! assert!((p[0] - 0.5).abs() < 1e-10 && (p[3] - 0.5).abs() < 1e-10);
//! ```

pub mod config;
pub mod error;
pub mod simulation;
pub mod tracing_config;

pub use ptmsim_compile as compile;
pub use ptmsim_core as ptm;
pub use ptmsim_state as state;

pub use config::{ConfigError, LoggingConfig, SimConfig};
pub use error::{SimError, SimResult};
pub use ptmsim_compile::{BlockKind, CompiledBlock, CompilerConfig, Request, TwoPtmCompiler};
pub use ptmsim_core::{PauliBasis, Ptm, TwoPtm};
pub use ptmsim_state::{DensityTensor, StateConfig};
pub use simulation::{BlockOutcome, Simulation};
pub use tracing_config::{TracingConfig, TracingFormat, init_tracing};

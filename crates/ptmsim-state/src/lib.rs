//! `ptmsim-state`: the density tensor engine.
//!
//! A [`DensityTensor`] keeps an N-subsystem density matrix as a dense real
//! tensor, one axis per subsystem, in an adaptively chosen [`PauliBasis`]
//! per axis. Pauli transfer matrices are applied by contracting one or two
//! axes; populations are read back with a gather over the classical basis
//! elements.
//!
//! The numeric work is delegated to a [`TensorBackend`]. [`CpuBackend`]
//! runs it on the rayon thread pool.
//!
//! # Example
//!
//! ```rust
//! use ptmsim_core::{channels, PauliBasis};
//! use ptmsim_state::DensityTensor;
//!
//! let mut state = DensityTensor::new(vec![PauliBasis::general(2)]).unwrap();
//! state.apply_ptm(&channels::hadamard(), 0).unwrap();
//! let p = state.partial_trace(0).unwrap();
//! assert!((p[0] - 0.5).abs() < 1e-10);
//! ```
//!
//! [`PauliBasis`]: ptmsim_core::PauliBasis

pub mod backend;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod cpu;
pub mod density;
pub mod error;
pub mod geometry;

pub use backend::{ConstantData, ContractionSpec, IndexMap, TensorBackend};
pub use buffer::BufferStats;
pub use cache::CacheStats;
pub use config::StateConfig;
pub use cpu::CpuBackend;
pub use density::DensityTensor;
pub use error::{StateError, StateResult};
pub use geometry::LaunchGeometry;

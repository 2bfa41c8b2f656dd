//! `ptmsim-compile`: fuses an operation stream into contracted blocks.
//!
//! The [`TwoPtmCompiler`] takes an ordered stream of [`Request`]s on
//! labelled subsystems and produces [`CompiledBlock`]s acting on at most two
//! subsystems each. For every block it picks output bases that drop the
//! basis directions the fused operation never reaches, which keeps the
//! density tensor small.
//!
//! ```rust
//! use ptmsim_compile::{Request, TwoPtmCompiler};
//! use ptmsim_core::channels::{cphase, hadamard};
//!
//! let blocks = TwoPtmCompiler::new(vec![
//!     Request::single("q0", hadamard()),
//!     Request::single("q1", hadamard()),
//!     Request::two("q0", "q1", cphase(std::f64::consts::PI)),
//!     Request::Measure(vec!["q1"]),
//! ])
//! .compile()
//! .unwrap();
//!
//! assert_eq!(blocks.len(), 2);
//! ```

pub mod block;
pub mod compiler;
pub mod config;
pub mod error;
pub mod request;

pub use block::{BlockKind, CompiledBlock};
pub use compiler::{Stage, TwoPtmCompiler};
pub use config::CompilerConfig;
pub use error::{CompileError, CompileResult};
pub use request::Request;

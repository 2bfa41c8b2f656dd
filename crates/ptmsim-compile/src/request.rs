//! Requests making up an operation stream.

use ptmsim_core::{Ptm, TwoPtm};

/// One entry of the operation stream fed to the compiler.
///
/// Subsystems are identified by caller-chosen labels of type `S`.
#[derive(Debug, Clone)]
pub enum Request<S> {
    /// A superoperator on one subsystem.
    Single {
        /// Target subsystem.
        subsystem: S,
        /// The operation.
        ptm: Ptm,
    },
    /// A superoperator on two subsystems; `subsystems[0]` is the PTM's
    /// subsystem 0.
    Two {
        /// Target subsystems.
        subsystems: [S; 2],
        /// The operation.
        ptm: TwoPtm,
    },
    /// Dephase the subsystems and report their outcome probabilities.
    Measure(Vec<S>),
    /// Dephase the subsystems and report the full diagonal.
    Diagonal(Vec<S>),
}

impl<S> Request<S> {
    /// Subsystems the request touches, in argument order.
    pub fn subsystems(&self) -> Vec<&S> {
        match self {
            Request::Single { subsystem, .. } => vec![subsystem],
            Request::Two { subsystems, .. } => subsystems.iter().collect(),
            Request::Measure(subsystems) | Request::Diagonal(subsystems) => {
                subsystems.iter().collect()
            }
        }
    }

    /// Whether the request closes its subsystems into a block of its own.
    pub fn is_readout(&self) -> bool {
        matches!(self, Request::Measure(_) | Request::Diagonal(_))
    }

    /// Shorthand for [`Request::Single`].
    pub fn single(subsystem: S, ptm: Ptm) -> Self {
        Request::Single { subsystem, ptm }
    }

    /// Shorthand for [`Request::Two`].
    pub fn two(a: S, b: S, ptm: TwoPtm) -> Self {
        Request::Two {
            subsystems: [a, b],
            ptm,
        }
    }
}

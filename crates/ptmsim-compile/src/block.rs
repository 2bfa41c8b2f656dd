//! Compiled blocks, ready to hand to the density tensor engine.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, Array4};
use ptmsim_core::PauliBasis;

/// What a compiled block does.
#[derive(Debug, Clone)]
pub enum BlockKind {
    /// A `(p_out, p_in)` matrix for one subsystem.
    Single(Array2<f64>),
    /// A `(p0_out, p1_out, p0_in, p1_in)` matrix for two subsystems.
    Two(Array4<f64>),
    /// Per subsystem, the map onto its classical subbasis; then report
    /// outcome probabilities.
    Measure(Vec<Array2<f64>>),
    /// Per subsystem, the map onto its classical subbasis; then report the
    /// diagonal.
    Diagonal(Vec<Array2<f64>>),
}

impl BlockKind {
    fn label(&self) -> &'static str {
        match self {
            BlockKind::Single(_) | BlockKind::Two(_) => "ptm",
            BlockKind::Measure(_) => "measure",
            BlockKind::Diagonal(_) => "diagonal",
        }
    }
}

/// A fused block with resolved bases.
#[derive(Debug, Clone)]
pub struct CompiledBlock<S> {
    /// Subsystems the block acts on, in matrix axis order.
    pub subsystems: Vec<S>,
    /// The operation.
    pub kind: BlockKind,
    /// Basis of each subsystem before the block.
    pub in_bases: Vec<Arc<PauliBasis>>,
    /// Basis of each subsystem after the block.
    pub out_bases: Vec<Arc<PauliBasis>>,
}

impl<S: fmt::Debug> fmt::Display for CompiledBlock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |bases: &[Arc<PauliBasis>]| {
            bases
                .iter()
                .map(|b| b.names().join(" "))
                .collect::<Vec<_>>()
                .join("|")
        };
        write!(
            f,
            "<CompiledBlock: {} on {:?} in:{} out:{}>",
            self.kind.label(),
            self.subsystems,
            names(&self.in_bases),
            names(&self.out_bases)
        )
    }
}

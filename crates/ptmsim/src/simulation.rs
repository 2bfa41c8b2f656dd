//! Executes compiled blocks on a density tensor.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use ndarray::{Array2, ArrayD};
use ptmsim_compile::{BlockKind, CompiledBlock, CompilerConfig, Request, TwoPtmCompiler};
use ptmsim_core::PauliBasis;
use ptmsim_state::{DensityTensor, StateConfig};
use rustc_hash::FxHashMap;
use tracing::{debug, info, instrument};

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};

/// What executing one block produced.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockOutcome<S> {
    /// A PTM was applied; nothing to report.
    Applied,
    /// Outcome probabilities of each measured subsystem, in block order.
    Measured(Vec<(S, Vec<f64>)>),
    /// The joint diagonal of the whole state after the block.
    Diagonal(ArrayD<f64>),
}

/// A density-matrix simulation over labelled subsystems.
///
/// Subsystem `k` of the underlying tensor belongs to the `k`-th label given
/// at construction.
#[derive(Debug, Clone)]
pub struct Simulation<S> {
    labels: Vec<S>,
    index: FxHashMap<S, usize>,
    state: DensityTensor,
    compiler: CompilerConfig,
}

impl<S: Clone + Eq + Hash + Debug> Simulation<S> {
    /// Ground state of the given subsystems with default settings.
    pub fn new(subsystems: impl IntoIterator<Item = (S, Arc<PauliBasis>)>) -> SimResult<Self> {
        Self::with_config(subsystems, &SimConfig::default())
    }

    /// Ground state of the given subsystems.
    pub fn with_config(
        subsystems: impl IntoIterator<Item = (S, Arc<PauliBasis>)>,
        config: &SimConfig,
    ) -> SimResult<Self> {
        let (labels, bases): (Vec<S>, Vec<Arc<PauliBasis>>) = subsystems.into_iter().unzip();
        let index = index_labels(&labels)?;
        let state = DensityTensor::with_config(bases, config.state.clone())?;
        Ok(Simulation {
            labels,
            index,
            state,
            compiler: config.compiler.clone(),
        })
    }

    /// Wrap an existing tensor; `labels[k]` names its subsystem `k`.
    pub fn from_state(labels: Vec<S>, state: DensityTensor) -> SimResult<Self> {
        if labels.len() != state.n_subsystems() {
            return Err(SimError::LabelCountMismatch {
                labels: labels.len(),
                subsystems: state.n_subsystems(),
            });
        }
        let index = index_labels(&labels)?;
        Ok(Simulation {
            labels,
            index,
            state,
            compiler: CompilerConfig::default(),
        })
    }

    /// Settings used by [`Simulation::compile`].
    #[must_use]
    pub fn with_compiler_config(mut self, config: CompilerConfig) -> Self {
        self.compiler = config;
        self
    }

    /// Subsystem labels in tensor axis order.
    pub fn labels(&self) -> &[S] {
        &self.labels
    }

    /// Tensor axis of a label.
    pub fn subsystem_index(&self, label: &S) -> SimResult<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| SimError::UnknownSubsystem(format!("{label:?}")))
    }

    /// The underlying density tensor.
    pub fn state(&self) -> &DensityTensor {
        &self.state
    }

    /// Mutable access to the underlying density tensor.
    pub fn state_mut(&mut self) -> &mut DensityTensor {
        &mut self.state
    }

    /// Consume the simulation, keeping the tensor.
    pub fn into_state(self) -> DensityTensor {
        self.state
    }

    /// Engine settings in effect.
    pub fn state_config(&self) -> &StateConfig {
        self.state.config()
    }

    /// Compile `requests` starting from the bases the state is in now.
    pub fn compile(&self, requests: Vec<Request<S>>) -> SimResult<Vec<CompiledBlock<S>>> {
        let initial = self
            .labels
            .iter()
            .cloned()
            .zip(self.state.bases().iter().cloned());
        let blocks = TwoPtmCompiler::new(requests)
            .with_config(self.compiler.clone())
            .with_initial_bases(initial)
            .compile()?;
        Ok(blocks)
    }

    /// Compile and run `requests` in one go.
    pub fn execute(&mut self, requests: Vec<Request<S>>) -> SimResult<Vec<BlockOutcome<S>>> {
        let blocks = self.compile(requests)?;
        self.run(&blocks)
    }

    /// Apply `blocks` in order.
    ///
    /// Each block must have been compiled for the bases the state is in when
    /// the block is reached. On error the state holds every block before the
    /// failing one.
    #[instrument(skip(self, blocks), fields(blocks = blocks.len()))]
    pub fn run(&mut self, blocks: &[CompiledBlock<S>]) -> SimResult<Vec<BlockOutcome<S>>> {
        let mut outcomes = Vec::with_capacity(blocks.len());
        let mut n_readouts = 0;

        for block in blocks {
            let axes = block
                .subsystems
                .iter()
                .map(|s| self.subsystem_index(s))
                .collect::<SimResult<Vec<_>>>()?;
            for ((label, &axis), expected) in block.subsystems.iter().zip(&axes).zip(&block.in_bases)
            {
                self.check_basis(label, axis, expected)?;
            }
            debug!(subsystems = ?block.subsystems, "Applying block");

            let outcome = match &block.kind {
                BlockKind::Single(matrix) => {
                    self.state.apply_single_ptm(
                        axes[0],
                        matrix.view(),
                        Some(Arc::clone(&block.out_bases[0])),
                    )?;
                    BlockOutcome::Applied
                }
                BlockKind::Two(matrix) => {
                    self.state.apply_two_ptm(
                        axes[0],
                        axes[1],
                        matrix.view(),
                        Some([
                            Arc::clone(&block.out_bases[0]),
                            Arc::clone(&block.out_bases[1]),
                        ]),
                    )?;
                    BlockOutcome::Applied
                }
                BlockKind::Measure(maps) => {
                    n_readouts += 1;
                    self.apply_readout_maps(&axes, maps, &block.out_bases)?;
                    let probabilities = block
                        .subsystems
                        .iter()
                        .zip(&axes)
                        .map(|(label, &axis)| -> SimResult<(S, Vec<f64>)> {
                            Ok((label.clone(), self.state.partial_trace(axis)?))
                        })
                        .collect::<SimResult<Vec<_>>>()?;
                    BlockOutcome::Measured(probabilities)
                }
                BlockKind::Diagonal(maps) => {
                    n_readouts += 1;
                    self.apply_readout_maps(&axes, maps, &block.out_bases)?;
                    BlockOutcome::Diagonal(self.state.diagonal()?)
                }
            };
            outcomes.push(outcome);
        }

        info!(
            "Executed {} blocks ({} readouts), state shape {:?}",
            blocks.len(),
            n_readouts,
            self.state.shape()
        );
        Ok(outcomes)
    }

    fn apply_readout_maps(
        &mut self,
        axes: &[usize],
        maps: &[Array2<f64>],
        out_bases: &[Arc<PauliBasis>],
    ) -> SimResult<()> {
        for ((&axis, map), basis) in axes.iter().zip(maps).zip(out_bases) {
            self.state
                .apply_single_ptm(axis, map.view(), Some(Arc::clone(basis)))?;
        }
        Ok(())
    }

    fn check_basis(&self, label: &S, axis: usize, expected: &Arc<PauliBasis>) -> SimResult<()> {
        let actual = self.state.basis(axis)?;
        if Arc::ptr_eq(actual, expected) || **actual == **expected {
            return Ok(());
        }
        Err(SimError::BasisMismatch {
            subsystem: format!("{label:?}"),
            expected: expected.names().join(" "),
            actual: actual.names().join(" "),
        })
    }
}

fn index_labels<S: Clone + Eq + Hash + Debug>(labels: &[S]) -> SimResult<FxHashMap<S, usize>> {
    let mut index = FxHashMap::default();
    for (axis, label) in labels.iter().enumerate() {
        if index.insert(label.clone(), axis).is_some() {
            return Err(SimError::DuplicateSubsystem(format!("{label:?}")));
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptmsim_core::channels::{hadamard, rotate_x};
    use std::f64::consts::PI;

    fn qubits(labels: &[&'static str]) -> Vec<(&'static str, Arc<PauliBasis>)> {
        labels.iter().map(|&l| (l, PauliBasis::general(2))).collect()
    }

    #[test]
    fn test_duplicate_label() {
        let result = Simulation::new(qubits(&["a", "a"]));
        assert!(matches!(result, Err(SimError::DuplicateSubsystem(_))));
    }

    #[test]
    fn test_unknown_label() {
        let sim = Simulation::new(qubits(&["a"])).unwrap();
        assert!(matches!(
            sim.subsystem_index(&"b"),
            Err(SimError::UnknownSubsystem(label)) if label == "\"b\""
        ));
    }

    #[test]
    fn test_block_for_other_subsystem_is_rejected() {
        let mut sim = Simulation::new(qubits(&["a"])).unwrap();
        let blocks = TwoPtmCompiler::new(vec![Request::single("b", hadamard())])
            .compile()
            .unwrap();
        assert!(matches!(
            sim.run(&blocks),
            Err(SimError::UnknownSubsystem(_))
        ));
    }

    #[test]
    fn test_stale_blocks_are_rejected() {
        let mut sim = Simulation::new(qubits(&["a"])).unwrap();
        let blocks = sim
            .compile(vec![Request::single("a", rotate_x(PI)), Request::Measure(vec!["a"])])
            .unwrap();
        sim.run(&blocks).unwrap();
        // Compiled against the general basis; the state is now classical.
        assert!(matches!(
            sim.run(&blocks),
            Err(SimError::BasisMismatch { .. })
        ));
    }

    #[test]
    fn test_from_state_checks_label_count() {
        let state = DensityTensor::new(vec![PauliBasis::general(2)]).unwrap();
        assert!(matches!(
            Simulation::from_state(vec!["a", "b"], state),
            Err(SimError::LabelCountMismatch { labels: 2, subsystems: 1 })
        ));
    }
}

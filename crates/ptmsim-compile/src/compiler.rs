//! Fusion of an operation stream into two-subsystem blocks.
//!
//! The compiler moves through four stages:
//!
//! 1. [`Stage::Uncompiled`] → [`Stage::Blocked`]: one scan over the stream
//!    groups requests into blocks acting on at most two subsystems. Readout
//!    requests get a block of their own.
//! 2. [`Stage::Blocked`] → [`Stage::BasisResolved`]: blocks are visited in
//!    order; each block's input bases are the previous output bases of its
//!    subsystems. Output bases are the directions of the full general basis
//!    that the fused operation can actually reach.
//! 3. [`Stage::BasisResolved`] → [`Stage::Ready`]: every block is rendered as
//!    one dense matrix directly from its input to its output bases.
//!
//! Blocks are never reordered across subsystems; only requests sharing a
//! block are fused.

use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::Arc;

use ndarray::{Array2, Axis};
use ptmsim_core::{basis_transform, OutputBasis, OutputBases, PauliBasis, Ptm, TwoPtm};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, instrument};

use crate::block::{BlockKind, CompiledBlock};
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::request::Request;

/// Compiler progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing done yet.
    Uncompiled,
    /// Requests are grouped into blocks.
    Blocked,
    /// Every block has input and output bases.
    BasisResolved,
    /// Every block has its dense matrix.
    Ready,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Uncompiled => "uncompiled",
            Stage::Blocked => "blocked",
            Stage::BasisResolved => "basis-resolved",
            Stage::Ready => "ready",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
enum Fused {
    Single(Ptm),
    Two(TwoPtm),
    Measure,
    Diagonal,
}

#[derive(Debug, Clone)]
struct ResolvedBlock<S> {
    subsystems: Vec<S>,
    fused: Fused,
    in_bases: Vec<Arc<PauliBasis>>,
    out_bases: Vec<Arc<PauliBasis>>,
}

/// Groups requests into blocks, tracking each subsystem's open block.
struct Blocker<S> {
    blocks: Vec<Vec<usize>>,
    active: FxHashMap<S, usize>,
    paired: FxHashSet<S>,
}

impl<S: Clone + Eq + Hash> Blocker<S> {
    fn new() -> Self {
        Blocker {
            blocks: Vec::new(),
            active: FxHashMap::default(),
            paired: FxHashSet::default(),
        }
    }

    fn fresh(&mut self, subsystem: &S) -> usize {
        let index = self.blocks.len();
        self.blocks.push(Vec::new());
        self.active.insert(subsystem.clone(), index);
        self.paired.remove(subsystem);
        index
    }

    /// Close the open block of `subsystem` for every subsystem in it.
    fn close(&mut self, subsystem: &S) {
        if let Some(block) = self.active.remove(subsystem) {
            self.active.retain(|_, b| *b != block);
        }
        self.paired.retain(|s| self.active.contains_key(s));
    }

    fn open(&mut self, subsystem: &S) -> usize {
        match self.active.get(subsystem) {
            Some(&index) => index,
            None => self.fresh(subsystem),
        }
    }

    fn push_single(&mut self, request: usize, subsystem: &S) {
        let block = self.open(subsystem);
        self.blocks[block].push(request);
    }

    fn push_two(&mut self, request: usize, a: &S, b: &S) {
        let mut block_a = self.open(a);
        let mut block_b = self.open(b);
        if block_a == block_b {
            self.blocks[block_a].push(request);
            return;
        }
        // A subsystem leaving a pair block closes it for the partner too.
        if self.paired.contains(a) {
            self.close(a);
            block_a = self.fresh(a);
        }
        if self.paired.contains(b) {
            self.close(b);
            block_b = self.fresh(b);
        }
        let (early, late) = if block_a < block_b {
            (block_a, block_b)
        } else {
            (block_b, block_a)
        };
        let moved = std::mem::take(&mut self.blocks[early]);
        self.blocks[late].extend(moved);
        self.blocks[late].push(request);
        for s in [a, b] {
            self.active.insert(s.clone(), late);
            self.paired.insert(s.clone());
        }
    }

    fn push_readout(&mut self, request: usize, subsystems: &[S]) {
        for s in subsystems {
            self.close(s);
        }
        self.blocks.push(vec![request]);
    }

    /// Still-open blocks go last, in creation order. No later block shares
    /// a subsystem with them, since leaving a block closes it.
    fn finish(mut self) -> Vec<Vec<usize>> {
        let mut open: Vec<usize> = self.active.values().copied().collect();
        open.sort_unstable();
        open.dedup();
        for index in open {
            let block = std::mem::take(&mut self.blocks[index]);
            self.blocks.push(block);
        }
        self.blocks.retain(|b| !b.is_empty());
        self.blocks
    }
}

/// Compiles a stream of [`Request`]s into [`CompiledBlock`]s.
pub struct TwoPtmCompiler<S> {
    requests: Vec<Request<S>>,
    initial_bases: FxHashMap<S, Arc<PauliBasis>>,
    config: CompilerConfig,
    stage: Stage,
    dims: FxHashMap<S, usize>,
    blocks: Vec<Vec<usize>>,
    resolved: Vec<ResolvedBlock<S>>,
    compiled: Vec<CompiledBlock<S>>,
}

impl<S: Clone + Eq + Hash + Debug> TwoPtmCompiler<S> {
    /// A compiler for `requests` with default settings.
    pub fn new(requests: Vec<Request<S>>) -> Self {
        TwoPtmCompiler {
            requests,
            initial_bases: FxHashMap::default(),
            config: CompilerConfig::default(),
            stage: Stage::Uncompiled,
            dims: FxHashMap::default(),
            blocks: Vec::new(),
            resolved: Vec::new(),
            compiled: Vec::new(),
        }
    }

    /// Use the given settings.
    #[must_use]
    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Starting bases; subsystems without one start in the general basis.
    #[must_use]
    pub fn with_initial_bases(
        mut self,
        bases: impl IntoIterator<Item = (S, Arc<PauliBasis>)>,
    ) -> Self {
        self.initial_bases.extend(bases);
        self
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The requests, in stream order.
    pub fn requests(&self) -> &[Request<S>] {
        &self.requests
    }

    /// Request indices of every block, once blocked.
    pub fn block_layout(&self) -> &[Vec<usize>] {
        &self.blocks
    }

    /// Hilbert dimension of a subsystem, once blocked.
    pub fn dim_hilbert(&self, subsystem: &S) -> Option<usize> {
        self.dims.get(subsystem).copied()
    }

    /// Compiled blocks; empty until [`Stage::Ready`].
    pub fn compiled_blocks(&self) -> &[CompiledBlock<S>] {
        &self.compiled
    }

    fn expect_stage(&self, expected: Stage, requested: &'static str) -> CompileResult<()> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(CompileError::InvalidStage {
                current: self.stage.name(),
                requested,
            })
        }
    }

    fn label(subsystem: &S) -> String {
        format!("{subsystem:?}")
    }

    fn note_dim(&mut self, subsystem: &S, dim: usize) -> CompileResult<()> {
        match self.dims.get(subsystem) {
            Some(&expected) if expected != dim => Err(CompileError::DimensionMismatch {
                subsystem: Self::label(subsystem),
                expected,
                got: dim,
            }),
            Some(_) => Ok(()),
            None => {
                self.dims.insert(subsystem.clone(), dim);
                Ok(())
            }
        }
    }

    fn dim(&self, subsystem: &S) -> CompileResult<usize> {
        self.dim_hilbert(subsystem)
            .ok_or_else(|| CompileError::UnknownDimension(Self::label(subsystem)))
    }

    fn check_requests(&mut self) -> CompileResult<()> {
        self.dims = self
            .initial_bases
            .iter()
            .map(|(s, b)| (s.clone(), b.dim_hilbert()))
            .collect();

        let requests = std::mem::take(&mut self.requests);
        let result = self.collect_dims(&requests);
        self.requests = requests;
        result?;

        for request in &self.requests {
            if let Request::Two {
                subsystems: [a, b],
                ptm,
            } = request
            {
                ptm.check_dims([self.dim(a)?, self.dim(b)?])?;
            }
        }
        Ok(())
    }

    fn collect_dims(&mut self, requests: &[Request<S>]) -> CompileResult<()> {
        for (index, request) in requests.iter().enumerate() {
            let subsystems = request.subsystems();
            if subsystems.is_empty() {
                return Err(CompileError::EmptySubsystems(index));
            }
            let mut seen = FxHashSet::default();
            for s in &subsystems {
                if !seen.insert(*s) {
                    return Err(CompileError::DuplicateSubsystem(Self::label(s)));
                }
            }
            match request {
                Request::Single { subsystem, ptm } => {
                    self.note_dim(subsystem, ptm.dim_hilbert()?)?;
                }
                Request::Two { subsystems, ptm } => {
                    for (s, dim) in subsystems.iter().zip(ptm.dim_hilbert()) {
                        if let Some(dim) = dim {
                            self.note_dim(s, dim)?;
                        }
                    }
                }
                Request::Measure(_) | Request::Diagonal(_) => {}
            }
        }

        for request in requests {
            for s in request.subsystems() {
                if self.dims.contains_key(s) {
                    continue;
                }
                let dim = self
                    .config
                    .default_dim_hilbert
                    .ok_or_else(|| CompileError::UnknownDimension(Self::label(s)))?;
                self.dims.insert(s.clone(), dim);
            }
        }
        Ok(())
    }

    /// Group the stream into blocks.
    pub fn block(&mut self) -> CompileResult<()> {
        self.expect_stage(Stage::Uncompiled, "blocking")?;
        self.config.validate().map_err(CompileError::InvalidConfig)?;
        self.check_requests()?;

        let mut blocker = Blocker::new();
        for (index, request) in self.requests.iter().enumerate() {
            match request {
                Request::Single { subsystem, .. } => blocker.push_single(index, subsystem),
                Request::Two {
                    subsystems: [a, b], ..
                } => blocker.push_two(index, a, b),
                Request::Measure(subsystems) | Request::Diagonal(subsystems) => {
                    blocker.push_readout(index, subsystems)
                }
            }
        }
        self.blocks = blocker.finish();
        self.stage = Stage::Blocked;
        debug!(
            requests = self.requests.len(),
            blocks = self.blocks.len(),
            "operation stream blocked"
        );
        Ok(())
    }

    /// Pick input and output bases for every block.
    pub fn resolve_bases(&mut self) -> CompileResult<()> {
        self.expect_stage(Stage::Blocked, "basis resolution")?;
        let mut current = self.initial_bases.clone();
        let mut resolved = Vec::with_capacity(self.blocks.len());

        for (index, block) in self.blocks.iter().enumerate() {
            let (subsystems, fused) = self.fuse(block)?;
            let in_bases = subsystems
                .iter()
                .map(|s| -> CompileResult<Arc<PauliBasis>> {
                    Ok(match current.get(s) {
                        Some(b) => Arc::clone(b),
                        None => PauliBasis::general(self.dim(s)?),
                    })
                })
                .collect::<CompileResult<Vec<_>>>()?;
            let out_bases = self.output_bases(&fused, &in_bases)?;

            debug!(
                block = index,
                subsystems = ?subsystems,
                dim_in = ?in_bases.iter().map(|b| b.dim_pauli()).collect::<Vec<_>>(),
                dim_out = ?out_bases.iter().map(|b| b.dim_pauli()).collect::<Vec<_>>(),
                "block bases resolved"
            );

            for (s, b) in subsystems.iter().zip(&out_bases) {
                current.insert(s.clone(), Arc::clone(b));
            }
            resolved.push(ResolvedBlock {
                subsystems,
                fused,
                in_bases,
                out_bases,
            });
        }

        self.resolved = resolved;
        self.stage = Stage::BasisResolved;
        Ok(())
    }

    fn fuse(&self, block: &[usize]) -> CompileResult<(Vec<S>, Fused)> {
        let mut order: Vec<S> = Vec::with_capacity(2);
        for &i in block {
            match &self.requests[i] {
                Request::Measure(subsystems) => return Ok((subsystems.clone(), Fused::Measure)),
                Request::Diagonal(subsystems) => {
                    return Ok((subsystems.clone(), Fused::Diagonal));
                }
                request => {
                    for s in request.subsystems() {
                        if !order.contains(s) {
                            order.push(s.clone());
                        }
                    }
                }
            }
        }

        if order.len() == 1 {
            let factors: Vec<Ptm> = block
                .iter()
                .rev()
                .filter_map(|&i| match &self.requests[i] {
                    Request::Single { ptm, .. } => Some(ptm.clone()),
                    _ => None,
                })
                .collect();
            let fused = match <[Ptm; 1]>::try_from(factors) {
                Ok([ptm]) => ptm,
                Err(factors) => Ptm::product(factors)?,
            };
            return Ok((order, Fused::Single(fused)));
        }

        let position = |s: &S| order.iter().position(|o| o == s);
        let mut product = TwoPtm::product();
        for &i in block {
            match &self.requests[i] {
                Request::Single { subsystem, ptm } => {
                    if let Some(target) = position(subsystem) {
                        product = product.then_single(target, ptm.clone());
                    }
                }
                Request::Two {
                    subsystems: [a, _],
                    ptm,
                } => {
                    product = product.then_two(position(a) == Some(1), ptm.clone());
                }
                Request::Measure(_) | Request::Diagonal(_) => {}
            }
        }
        product.check_dims([self.dim(&order[0])?, self.dim(&order[1])?])?;
        Ok((order, Fused::Two(product)))
    }

    fn output_bases(
        &self,
        fused: &Fused,
        in_bases: &[Arc<PauliBasis>],
    ) -> CompileResult<Vec<Arc<PauliBasis>>> {
        let tol = self.config.sparsity_tolerance;
        match fused {
            Fused::Measure | Fused::Diagonal => Ok(in_bases
                .iter()
                .map(|b| b.get_classical_subbasis())
                .collect::<Result<_, _>>()?),
            Fused::Single(ptm) => {
                let full = PauliBasis::general(in_bases[0].dim_hilbert());
                let m = ptm.get_matrix(&in_bases[0], OutputBasis::from(&full))?;
                let kept = significant(m.mapv(|v| v * v).sum_axis(Axis(1)).iter(), tol);
                Ok(vec![full.get_subbasis(&kept)?])
            }
            Fused::Two(ptm) => {
                let full = [
                    PauliBasis::general(in_bases[0].dim_hilbert()),
                    PauliBasis::general(in_bases[1].dim_hilbert()),
                ];
                let m = ptm.get_matrix(
                    [&*in_bases[0], &*in_bases[1]],
                    OutputBases::Explicit([&*full[0], &*full[1]]),
                )?;
                let weights = m.mapv(|v| v * v).sum_axis(Axis(3)).sum_axis(Axis(2));
                let kept_0 = significant(weights.sum_axis(Axis(1)).iter(), tol);
                let kept_1 = significant(weights.sum_axis(Axis(0)).iter(), tol);
                Ok(vec![
                    full[0].get_subbasis(&kept_0)?,
                    full[1].get_subbasis(&kept_1)?,
                ])
            }
        }
    }

    /// Render the dense matrix of every block.
    pub fn finalize(&mut self) -> CompileResult<()> {
        self.expect_stage(Stage::BasisResolved, "finalization")?;
        let mut compiled = Vec::with_capacity(self.resolved.len());
        for block in &self.resolved {
            let (ins, outs) = (&block.in_bases, &block.out_bases);
            let kind = match &block.fused {
                Fused::Single(ptm) => {
                    BlockKind::Single(ptm.get_matrix(&ins[0], OutputBasis::from(&outs[0]))?)
                }
                Fused::Two(ptm) => BlockKind::Two(ptm.get_matrix(
                    [&*ins[0], &*ins[1]],
                    OutputBases::Explicit([&*outs[0], &*outs[1]]),
                )?),
                Fused::Measure => BlockKind::Measure(readout_maps(ins, outs)?),
                Fused::Diagonal => BlockKind::Diagonal(readout_maps(ins, outs)?),
            };
            compiled.push(CompiledBlock {
                subsystems: block.subsystems.clone(),
                kind,
                in_bases: ins.clone(),
                out_bases: outs.clone(),
            });
        }
        self.compiled = compiled;
        self.stage = Stage::Ready;
        info!(
            requests = self.requests.len(),
            blocks = self.compiled.len(),
            "operation stream compiled"
        );
        Ok(())
    }

    /// Run every remaining stage.
    pub fn run(&mut self) -> CompileResult<&[CompiledBlock<S>]> {
        if self.stage == Stage::Uncompiled {
            self.block()?;
        }
        if self.stage == Stage::Blocked {
            self.resolve_bases()?;
        }
        if self.stage == Stage::BasisResolved {
            self.finalize()?;
        }
        Ok(&self.compiled)
    }

    /// Run every stage and return the compiled blocks.
    #[instrument(skip(self))]
    pub fn compile(mut self) -> CompileResult<Vec<CompiledBlock<S>>> {
        self.run()?;
        Ok(self.compiled)
    }
}

fn significant<'a>(weights: impl Iterator<Item = &'a f64>, tol: f64) -> Vec<usize> {
    weights
        .enumerate()
        .filter(|(_, w)| **w > tol)
        .map(|(i, _)| i)
        .collect()
}

fn readout_maps(
    ins: &[Arc<PauliBasis>],
    outs: &[Arc<PauliBasis>],
) -> CompileResult<Vec<Array2<f64>>> {
    ins.iter()
        .zip(outs)
        .map(|(i, o)| basis_transform(o, i).map_err(CompileError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptmsim_core::channels::{cphase, hadamard, rotate_x};

    #[test]
    fn test_independent_gates_stay_separate() {
        let requests = (0..4).map(|q| Request::single(q, hadamard())).collect();
        let mut compiler = TwoPtmCompiler::new(requests);
        compiler.block().unwrap();
        assert_eq!(compiler.block_layout().len(), 4);
    }

    #[test]
    fn test_same_subsystem_fuses() {
        let requests = vec![
            Request::single("a", hadamard()),
            Request::single("a", rotate_x(0.3)),
        ];
        let mut compiler = TwoPtmCompiler::new(requests);
        compiler.block().unwrap();
        assert_eq!(compiler.block_layout(), &[vec![0, 1]]);
    }

    #[test]
    fn test_pair_splits_for_new_partner() {
        let requests = vec![
            Request::two("a", "b", cphase(1.0)),
            Request::two("b", "c", cphase(1.0)),
        ];
        let mut compiler = TwoPtmCompiler::new(requests);
        compiler.block().unwrap();
        assert_eq!(compiler.block_layout(), &[vec![0], vec![1]]);
    }

    #[test]
    fn test_stage_order_enforced() {
        let mut compiler = TwoPtmCompiler::new(vec![Request::single(0, hadamard())]);
        assert!(matches!(
            compiler.resolve_bases(),
            Err(CompileError::InvalidStage { current: "uncompiled", .. })
        ));
        compiler.run().unwrap();
        assert_eq!(compiler.stage(), Stage::Ready);
        assert!(compiler.block().is_err());
    }

    #[test]
    fn test_single_block_keeps_full_basis_for_rotation() {
        let compiled = TwoPtmCompiler::new(vec![Request::single(0, rotate_x(0.4))])
            .compile()
            .unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].out_bases[0].dim_pauli(), 4);
        let BlockKind::Single(m) = &compiled[0].kind else {
            panic!("expected a single-subsystem block");
        };
        assert_eq!(m.dim(), (4, 4));
    }

    #[test]
    fn test_blocker_finish_moves_open_blocks_last() {
        let mut blocker = Blocker::new();
        blocker.push_single(0, &"a");
        blocker.push_readout(1, &["b"]);
        blocker.push_single(2, &"a");
        assert_eq!(blocker.finish(), vec![vec![1], vec![0, 2]]);
    }

    #[test]
    fn test_repaired_block_runs_before_measurement() {
        // cz(a,b); cz(a,c); measure(a); x(b): the first pair block must not
        // stay open through `b` and end up after the measurement.
        let mut blocker = Blocker::new();
        blocker.push_two(0, &"a", &"b");
        blocker.push_two(1, &"a", &"c");
        blocker.push_readout(2, &["a"]);
        blocker.push_single(3, &"b");
        assert_eq!(blocker.finish(), vec![vec![0], vec![1], vec![2], vec![3]]);
    }
}

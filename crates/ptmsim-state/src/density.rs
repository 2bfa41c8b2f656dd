//! The density tensor.
//!
//! An N-subsystem density matrix is stored as an N-axis real tensor: axis `k`
//! indexes the elements of subsystem `k`'s [`PauliBasis`], so that
//!
//! ```text
//! ρ = Σ data[x0, x1, ..] · B0[x0] ⊗ B1[x1] ⊗ ..
//! ```
//!
//! with subsystem 0 the most significant factor. Every mutating operation
//! reads the current tensor, writes the work slot of a [`DoubleBuffer`] and
//! then flips it.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, ArrayD, ArrayView2, ArrayView4, Axis, IxDyn};
use num_complex::Complex64;
use ptmsim_core::linalg::kron;
use ptmsim_core::{OutputBasis, OutputBases, PauliBasis, Ptm, PtmError, TwoPtm};
use tracing::{debug, warn};

use crate::backend::{ConstantData, ContractionSpec, IndexMap, TensorBackend};
use crate::buffer::{BufferStats, DoubleBuffer};
use crate::cache::{CacheStats, ConstantCache};
use crate::config::StateConfig;
use crate::cpu::CpuBackend;
use crate::error::{StateError, StateResult};
use crate::geometry::LaunchGeometry;

/// A multi-subsystem density matrix in per-subsystem Pauli bases.
#[derive(Clone)]
pub struct DensityTensor<B: TensorBackend = CpuBackend> {
    bases: Vec<Arc<PauliBasis>>,
    buffer: DoubleBuffer,
    backend: B,
    cache: ConstantCache<B::Constant>,
    config: StateConfig,
}

impl DensityTensor<CpuBackend> {
    /// All subsystems in their ground state `|0⟩`, on the CPU backend.
    pub fn new(bases: Vec<Arc<PauliBasis>>) -> StateResult<Self> {
        Self::with_backend(bases, CpuBackend::new(), StateConfig::default())
    }

    /// Like [`new`](Self::new) with explicit engine settings.
    pub fn with_config(bases: Vec<Arc<PauliBasis>>, config: StateConfig) -> StateResult<Self> {
        Self::with_backend(bases, CpuBackend::new(), config)
    }

    /// Wrap existing coordinates; `data` must have one axis per basis.
    pub fn from_array(bases: Vec<Arc<PauliBasis>>, data: ArrayD<f64>) -> StateResult<Self> {
        Self::from_parts(bases, data, CpuBackend::new(), StateConfig::default())
    }
}

impl<B: TensorBackend> DensityTensor<B> {
    /// Ground state on an arbitrary backend.
    pub fn with_backend(
        bases: Vec<Arc<PauliBasis>>,
        backend: B,
        config: StateConfig,
    ) -> StateResult<Self> {
        let shape: Vec<usize> = bases.iter().map(|b| b.dim_pauli()).collect();
        let mut data = ArrayD::zeros(IxDyn(&shape));
        let ground = bases
            .iter()
            .map(|b| b.require_comp_basis_index(0))
            .collect::<Result<Vec<_>, PtmError>>()?;
        data[IxDyn(&ground)] = 1.0;
        Self::from_parts(bases, data, backend, config)
    }

    /// Build from coordinates, a backend and settings.
    pub fn from_parts(
        bases: Vec<Arc<PauliBasis>>,
        data: ArrayD<f64>,
        backend: B,
        config: StateConfig,
    ) -> StateResult<Self> {
        config.validate().map_err(StateError::InvalidConfig)?;
        let shape: Vec<usize> = bases.iter().map(|b| b.dim_pauli()).collect();
        if data.shape() != shape.as_slice() {
            return Err(StateError::MatrixShapeMismatch {
                context: "density tensor data",
                expected: shape,
                got: data.shape().to_vec(),
            });
        }
        let flat: Vec<f64> = data.iter().copied().collect();
        Ok(DensityTensor {
            bases,
            buffer: DoubleBuffer::new(flat, shape),
            backend,
            cache: ConstantCache::new(config.cache_capacity),
            config,
        })
    }

    /// Number of subsystems.
    pub fn n_subsystems(&self) -> usize {
        self.bases.len()
    }

    /// Current basis of every subsystem.
    pub fn bases(&self) -> &[Arc<PauliBasis>] {
        &self.bases
    }

    /// Current basis of one subsystem.
    pub fn basis(&self, subsystem: usize) -> StateResult<&Arc<PauliBasis>> {
        self.check_subsystem(subsystem)?;
        Ok(&self.bases[subsystem])
    }

    /// Current tensor shape, one axis per subsystem.
    pub fn shape(&self) -> &[usize] {
        self.buffer.shape()
    }

    /// Engine settings.
    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// The execution backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Constant cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Double buffer counters.
    pub fn buffer_stats(&self) -> BufferStats {
        self.buffer.stats()
    }

    fn check_subsystem(&self, index: usize) -> StateResult<()> {
        if index < self.bases.len() {
            Ok(())
        } else {
            Err(StateError::SubsystemOutOfRange {
                index,
                count: self.bases.len(),
            })
        }
    }

    fn check_output_basis(
        &self,
        subsystem: usize,
        dim_out: usize,
        basis: Option<&Arc<PauliBasis>>,
    ) -> StateResult<()> {
        let current = &self.bases[subsystem];
        match basis {
            Some(b) => {
                if b.dim_pauli() != dim_out {
                    return Err(StateError::MatrixShapeMismatch {
                        context: "output basis",
                        expected: vec![dim_out],
                        got: vec![b.dim_pauli()],
                    });
                }
                if b.dim_hilbert() != current.dim_hilbert() {
                    return Err(PtmError::DimensionMismatch {
                        context: "output basis",
                        expected: current.dim_hilbert(),
                        got: b.dim_hilbert(),
                    }
                    .into());
                }
                Ok(())
            }
            None if dim_out != current.dim_pauli() => Err(StateError::MissingOutputBasis {
                subsystem,
                dim_out,
                dim_current: current.dim_pauli(),
            }),
            None => Ok(()),
        }
    }

    fn upload(&mut self, data: ConstantData) -> StateResult<B::Constant> {
        let backend = &self.backend;
        self.cache.get_or_upload(data, |d| backend.upload(d))
    }

    fn contract(
        &mut self,
        matrix: ConstantData,
        spec: ContractionSpec,
        geometry: LaunchGeometry,
        new_shape: Vec<usize>,
    ) -> StateResult<()> {
        let handle = self.upload(matrix)?;
        let out_len = spec.output_len();
        debug!(
            backend = self.backend.name(),
            ?spec,
            ?geometry,
            out_len,
            "contraction"
        );
        self.buffer.reserve_work(out_len, true);
        let (input, output) = self.buffer.split(out_len);
        self.backend
            .contract(input, output, &handle, &spec, &geometry)?;
        self.buffer.flip(new_shape);
        Ok(())
    }

    /// Apply a `(dim_out, dim_in)` matrix to one subsystem's axis.
    ///
    /// `dim_in` must equal the current axis length. When `dim_out` differs
    /// from it, `new_basis` is required and describes the output axis.
    pub fn apply_single_ptm(
        &mut self,
        subsystem: usize,
        matrix: ArrayView2<'_, f64>,
        new_basis: Option<Arc<PauliBasis>>,
    ) -> StateResult<()> {
        self.check_subsystem(subsystem)?;
        let (dim_out, dim_in) = matrix.dim();
        let shape = self.shape().to_vec();
        if dim_in != shape[subsystem] {
            return Err(StateError::MatrixShapeMismatch {
                context: "single-subsystem PTM",
                expected: vec![dim_out, shape[subsystem]],
                got: vec![dim_out, dim_in],
            });
        }
        self.check_output_basis(subsystem, dim_out, new_basis.as_ref())?;

        let spec = ContractionSpec::single(&shape, subsystem, dim_out);
        let mut new_shape = shape;
        new_shape[subsystem] = dim_out;
        let geometry = LaunchGeometry::single_axis(
            spec.input_len(),
            spec.output_len(),
            (dim_out, dim_in),
            self.config.max_spectators_single,
        );
        let data = ConstantData::F64(matrix.iter().copied().collect());
        self.contract(data, spec, geometry, new_shape)?;

        if let Some(basis) = new_basis {
            self.bases[subsystem] = basis;
        }
        Ok(())
    }

    /// Apply a `(a_out, b_out, a_in, b_in)` matrix jointly to two axes.
    ///
    /// The arguments may be given in either order; the matrix and bases are
    /// permuted so that the lower axis is always the leading one.
    pub fn apply_two_ptm(
        &mut self,
        subsystem_a: usize,
        subsystem_b: usize,
        matrix: ArrayView4<'_, f64>,
        new_bases: Option<[Arc<PauliBasis>; 2]>,
    ) -> StateResult<()> {
        self.check_subsystem(subsystem_a)?;
        self.check_subsystem(subsystem_b)?;
        if subsystem_a == subsystem_b {
            return Err(StateError::DuplicateSubsystem(subsystem_a));
        }

        let (a, b, matrix, new_bases) = if subsystem_a < subsystem_b {
            (subsystem_a, subsystem_b, matrix, new_bases)
        } else {
            (
                subsystem_b,
                subsystem_a,
                matrix.permuted_axes([1, 0, 3, 2]),
                new_bases.map(|[x, y]| [y, x]),
            )
        };

        let (a_out, b_out, a_in, b_in) = matrix.dim();
        let shape = self.shape().to_vec();
        if (a_in, b_in) != (shape[a], shape[b]) {
            return Err(StateError::MatrixShapeMismatch {
                context: "two-subsystem PTM",
                expected: vec![a_out, b_out, shape[a], shape[b]],
                got: vec![a_out, b_out, a_in, b_in],
            });
        }
        self.check_output_basis(a, a_out, new_bases.as_ref().map(|[x, _]| x))?;
        self.check_output_basis(b, b_out, new_bases.as_ref().map(|[_, y]| y))?;

        let spec = ContractionSpec::pair(&shape, a, b, (a_out, b_out));
        let mut new_shape = shape;
        new_shape[a] = a_out;
        new_shape[b] = b_out;
        let geometry = LaunchGeometry::two_axis(
            &new_shape,
            (a, b),
            (a_out, b_out),
            (a_in, b_in),
            self.config.max_threads_per_group,
        );
        let data = ConstantData::F64(matrix.iter().copied().collect());
        self.contract(data, spec, geometry, new_shape)?;

        if let Some([basis_a, basis_b]) = new_bases {
            self.bases[a] = basis_a;
            self.bases[b] = basis_b;
        }
        Ok(())
    }

    /// Render `ptm` in the current basis of `subsystem` and apply it.
    pub fn apply_ptm(&mut self, ptm: &Ptm, subsystem: usize) -> StateResult<()> {
        self.check_subsystem(subsystem)?;
        let matrix = ptm.get_matrix(&self.bases[subsystem], OutputBasis::SameAsInput)?;
        self.apply_single_ptm(subsystem, matrix.view(), None)
    }

    /// Render `ptm` in the current bases of `a` and `b` and apply it.
    pub fn apply_two_ptm_op(&mut self, ptm: &TwoPtm, a: usize, b: usize) -> StateResult<()> {
        self.check_subsystem(a)?;
        self.check_subsystem(b)?;
        let matrix = ptm.get_matrix([&*self.bases[a], &*self.bases[b]], OutputBases::SameAsInput)?;
        self.apply_two_ptm(a, b, matrix.view(), None)
    }

    fn gather(
        &mut self,
        map: IndexMap,
        target: Option<&mut [f64]>,
        lazy: bool,
    ) -> StateResult<Vec<usize>> {
        let out_shape = map.out_shape();
        let out_len: usize = out_shape.iter().product();
        let geometry = LaunchGeometry::gather(&out_shape);
        let handle = self.upload(map.pack())?;
        debug!(
            backend = self.backend.name(),
            in_shape = ?map.in_shape,
            ?out_shape,
            ?geometry,
            "gather"
        );
        match target {
            Some(target) => {
                self.backend.gather(
                    self.buffer.current(),
                    &mut target[..out_len],
                    &handle,
                    &geometry,
                )?;
            }
            None => {
                self.buffer.reserve_work(out_len, lazy);
                let (input, output) = self.buffer.split(out_len);
                self.backend.gather(input, output, &handle, &geometry)?;
                self.buffer.flip(out_shape.clone());
            }
        }
        Ok(out_shape)
    }

    fn diagonal_map(&self) -> StateResult<IndexMap> {
        let indices = self
            .bases
            .iter()
            .map(|b| {
                let idx = b.classical_indices();
                if idx.is_empty() {
                    Err(PtmError::NoClassicalSubbasis {
                        basis: b.to_string(),
                    })
                } else {
                    Ok(idx)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IndexMap {
            in_shape: self.shape().to_vec(),
            indices,
        })
    }

    /// Populations of every computational-basis outcome.
    ///
    /// One axis per subsystem, holding that subsystem's classical elements in
    /// computational-state order.
    pub fn diagonal(&mut self) -> StateResult<ArrayD<f64>> {
        let map = self.diagonal_map()?;
        let mut out = vec![0.0; map.out_shape().iter().product()];
        let shape = self.diagonal_into(&mut out)?;
        ArrayD::from_shape_vec(IxDyn(&shape), out)
            .map_err(|e| StateError::Backend(e.to_string()))
    }

    /// Write the diagonal into `target`, returning its shape.
    ///
    /// `target` may be longer than needed; only the leading elements are
    /// written.
    pub fn diagonal_into(&mut self, target: &mut [f64]) -> StateResult<Vec<usize>> {
        let map = self.diagonal_map()?;
        let required: usize = map.out_shape().iter().product();
        if target.len() < required {
            return Err(StateError::TargetTooSmall {
                required,
                got: target.len(),
            });
        }
        self.gather(map, Some(target), true)
    }

    /// Outcome probabilities of one subsystem, summed over all others.
    pub fn partial_trace(&mut self, subsystem: usize) -> StateResult<Vec<f64>> {
        self.check_subsystem(subsystem)?;
        let diag = self.diagonal()?;
        Ok(diag.axis_iter(Axis(subsystem)).map(|v| v.sum()).collect())
    }

    /// `Tr ρ`.
    pub fn trace(&self) -> f64 {
        let mut values = self.buffer.current().to_vec();
        for basis in self.bases.iter().rev() {
            let traces = basis.computational_basis_vectors().sum_axis(Axis(0));
            values = values
                .chunks(traces.len())
                .map(|chunk| chunk.iter().zip(traces.iter()).map(|(v, t)| v * t).sum())
                .collect();
        }
        values.first().copied().unwrap_or(0.0)
    }

    /// Scale to unit trace, returning the trace before scaling.
    ///
    /// A trace at or below the configured threshold is left alone.
    pub fn renormalize(&mut self) -> f64 {
        let trace = self.trace();
        if trace > self.config.renormalize_threshold {
            let factor = trace.recip();
            self.buffer.current_mut().iter_mut().for_each(|v| *v *= factor);
        } else {
            warn!(
                trace,
                threshold = self.config.renormalize_threshold,
                "density matrix trace is negligible, not renormalizing"
            );
        }
        trace
    }

    /// Collapse `subsystem` onto computational state `outcome`.
    ///
    /// The axis shrinks to one element and the basis becomes the
    /// one-element subbasis `|outcome⟩⟨outcome|`. The result is not
    /// renormalized.
    pub fn project(&mut self, subsystem: usize, outcome: usize) -> StateResult<()> {
        self.check_subsystem(subsystem)?;
        let index = self.bases[subsystem].require_comp_basis_index(outcome)?;
        let subbasis = self.bases[subsystem].get_subbasis(&[index])?;

        let indices = self
            .shape()
            .iter()
            .enumerate()
            .map(|(k, &d)| {
                if k == subsystem {
                    vec![index]
                } else {
                    (0..d).collect()
                }
            })
            .collect();
        let map = IndexMap {
            in_shape: self.shape().to_vec(),
            indices,
        };
        let lazy = self.config.lazy_alloc;
        self.gather(map, None, lazy)?;
        self.bases[subsystem] = subbasis;
        Ok(())
    }

    /// Prepend a subsystem in computational state `outcome`.
    ///
    /// The new subsystem becomes index 0; all others shift up by one.
    pub fn add_subsystem(&mut self, basis: Arc<PauliBasis>, outcome: usize) -> StateResult<()> {
        let index = basis.require_comp_basis_index(outcome)?;
        let dim_pauli = basis.dim_pauli();
        let mut projector = vec![0.0; dim_pauli];
        projector[index] = 1.0;

        let mut old_shape = vec![1];
        old_shape.extend_from_slice(self.shape());
        let spec = ContractionSpec::single(&old_shape, 0, dim_pauli);
        let mut new_shape = old_shape;
        new_shape[0] = dim_pauli;
        let geometry = LaunchGeometry::single_axis(
            spec.input_len(),
            spec.output_len(),
            (dim_pauli, 1),
            self.config.max_spectators_single,
        );
        self.contract(ConstantData::F64(projector), spec, geometry, new_shape)?;
        self.bases.insert(0, basis);
        Ok(())
    }

    /// Copy of the coordinates, one axis per subsystem.
    pub fn to_array(&self) -> StateResult<ArrayD<f64>> {
        ArrayD::from_shape_vec(IxDyn(self.shape()), self.buffer.current().to_vec())
            .map_err(|e| StateError::Backend(e.to_string()))
    }

    /// The dense Hilbert-space density matrix `Σ data[x] · B0[x0] ⊗ ..`.
    pub fn to_density_matrix(&self) -> Array2<Complex64> {
        self.expand(0, self.buffer.current())
    }

    fn expand(&self, axis: usize, data: &[f64]) -> Array2<Complex64> {
        let Some(basis) = self.bases.get(axis) else {
            return Array2::from_elem((1, 1), Complex64::new(data[0], 0.0));
        };
        let stride = data.len() / basis.dim_pauli().max(1);
        let d_rest: usize = self.bases[axis + 1..]
            .iter()
            .map(|b| b.dim_hilbert())
            .product();
        let d = basis.dim_hilbert() * d_rest;
        let mut rho = Array2::zeros((d, d));
        for (x, chunk) in data.chunks(stride.max(1)).enumerate() {
            if chunk.iter().all(|v| *v == 0.0) {
                continue;
            }
            let rest = self.expand(axis + 1, chunk);
            rho += &kron(&basis.vector(x), &rest.view());
        }
        rho
    }
}

impl<B: TensorBackend> fmt::Debug for DensityTensor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DensityTensor")
            .field("backend", &self.backend.name())
            .field("shape", &self.shape())
            .field(
                "bases",
                &self.bases.iter().map(|b| b.to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptmsim_core::channels;

    fn qubits(n: usize) -> Vec<Arc<PauliBasis>> {
        (0..n).map(|_| PauliBasis::general(2)).collect()
    }

    #[test]
    fn test_ground_state() {
        let state = DensityTensor::new(qubits(2)).unwrap();
        assert_eq!(state.shape(), &[4, 4]);
        assert!((state.trace() - 1.0).abs() < 1e-12);
        let rho = state.to_density_matrix();
        assert!((rho[[0, 0]].re - 1.0).abs() < 1e-12);
        assert!(rho.iter().skip(1).all(|v| v.norm() < 1e-12));
    }

    #[test]
    fn test_empty_state_is_scalar() {
        let mut state = DensityTensor::new(vec![]).unwrap();
        assert_eq!(state.trace(), 1.0);
        assert_eq!(state.diagonal().unwrap().len(), 1);
    }

    #[test]
    fn test_subsystem_out_of_range() {
        let mut state = DensityTensor::new(qubits(1)).unwrap();
        let m = Array2::<f64>::eye(4);
        assert!(matches!(
            state.apply_single_ptm(1, m.view(), None),
            Err(StateError::SubsystemOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_shape_change_needs_basis() {
        let mut state = DensityTensor::new(qubits(1)).unwrap();
        let m = Array2::<f64>::zeros((2, 4));
        assert!(matches!(
            state.apply_single_ptm(0, m.view(), None),
            Err(StateError::MissingOutputBasis { dim_out: 2, dim_current: 4, .. })
        ));
    }

    #[test]
    fn test_wrong_input_dim() {
        let mut state = DensityTensor::new(qubits(1)).unwrap();
        let m = Array2::<f64>::eye(3);
        assert!(matches!(
            state.apply_single_ptm(0, m.view(), None),
            Err(StateError::MatrixShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_two_ptm_subsystem() {
        let mut state = DensityTensor::new(qubits(2)).unwrap();
        let m = ndarray::Array4::<f64>::zeros((4, 4, 4, 4));
        assert!(matches!(
            state.apply_two_ptm(1, 1, m.view(), None),
            Err(StateError::DuplicateSubsystem(1))
        ));
    }

    #[test]
    fn test_x_rotation_flips_population() {
        let mut state = DensityTensor::new(qubits(1)).unwrap();
        state
            .apply_ptm(&channels::rotate_x(std::f64::consts::PI), 0)
            .unwrap();
        let p = state.partial_trace(0).unwrap();
        assert!(p[0].abs() < 1e-10);
        assert!((p[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_diagonal_into_too_small() {
        let mut state = DensityTensor::new(qubits(2)).unwrap();
        let mut target = [0.0; 3];
        assert!(matches!(
            state.diagonal_into(&mut target),
            Err(StateError::TargetTooSmall { required: 4, got: 3 })
        ));
    }

    #[test]
    fn test_diagonal_needs_classical_elements() {
        let mut state =
            DensityTensor::from_array(vec![PauliBasis::gell_mann(2)], ArrayD::zeros(IxDyn(&[4])))
                .unwrap();
        assert!(matches!(
            state.diagonal(),
            Err(StateError::Ptm(PtmError::NoClassicalSubbasis { .. }))
        ));
    }

    #[test]
    fn test_from_array_shape_mismatch() {
        let result = DensityTensor::from_array(qubits(1), ArrayD::zeros(IxDyn(&[3])));
        assert!(matches!(result, Err(StateError::MatrixShapeMismatch { .. })));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = StateConfig {
            cache_capacity: 0,
            ..StateConfig::default()
        };
        assert!(matches!(
            DensityTensor::with_config(qubits(1), config),
            Err(StateError::InvalidConfig(_))
        ));
    }
}

//! Multi-threaded CPU implementation of [`TensorBackend`].

use std::sync::Arc;

use rayon::prelude::*;

use crate::backend::{ConstantData, ContractionSpec, IndexMap, TensorBackend};
use crate::error::{StateError, StateResult};
use crate::geometry::LaunchGeometry;

/// Runs contractions and gathers on the rayon thread pool, one task per group.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl CpuBackend {
    /// Create a new CPU backend.
    pub fn new() -> Self {
        CpuBackend
    }
}

fn check_len(what: &str, expected: usize, got: usize) -> StateResult<()> {
    if expected == got {
        Ok(())
    } else {
        Err(StateError::Backend(format!(
            "{what}: expected {expected} elements, got {got}"
        )))
    }
}

impl TensorBackend for CpuBackend {
    type Constant = Arc<ConstantData>;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn upload(&self, data: &ConstantData) -> StateResult<Self::Constant> {
        Ok(Arc::new(data.clone()))
    }

    fn contract(
        &self,
        input: &[f64],
        output: &mut [f64],
        matrix: &Self::Constant,
        spec: &ContractionSpec,
        geometry: &LaunchGeometry,
    ) -> StateResult<()> {
        let ConstantData::F64(m) = matrix.as_ref() else {
            return Err(StateError::Backend(
                "contraction matrix must be f64".to_string(),
            ));
        };
        check_len("contraction input", spec.input_len(), input.len())?;
        check_len("contraction output", spec.output_len(), output.len())?;
        check_len("contraction matrix", spec.matrix_len(), m.len())?;

        let ContractionSpec {
            dim_a_in,
            dim_a_out,
            middle,
            dim_b_in,
            dim_b_out,
            inner,
            ..
        } = *spec;

        let group = geometry.group_size().min(output.len().max(1));
        output
            .par_chunks_mut(group)
            .enumerate()
            .for_each(|(g, chunk)| {
                for (k, out) in chunk.iter_mut().enumerate() {
                    let idx = g * group + k;
                    let i = idx % inner;
                    let rest = idx / inner;
                    let bo = rest % dim_b_out;
                    let rest = rest / dim_b_out;
                    let mid = rest % middle;
                    let rest = rest / middle;
                    let ao = rest % dim_a_out;
                    let o = rest / dim_a_out;

                    let row = (ao * dim_b_out + bo) * dim_a_in * dim_b_in;
                    let mut acc = 0.0;
                    for ai in 0..dim_a_in {
                        let base = ((o * dim_a_in + ai) * middle + mid) * dim_b_in;
                        for bi in 0..dim_b_in {
                            acc += m[row + ai * dim_b_in + bi] * input[(base + bi) * inner + i];
                        }
                    }
                    *out = acc;
                }
            });
        Ok(())
    }

    fn gather(
        &self,
        input: &[f64],
        output: &mut [f64],
        index_map: &Self::Constant,
        geometry: &LaunchGeometry,
    ) -> StateResult<()> {
        if let LaunchGeometry::WholeCopy = geometry {
            let n = output.len();
            let src = input.get(..n).ok_or_else(|| {
                StateError::Backend(format!(
                    "whole copy of {n} elements from a tensor of {}",
                    input.len()
                ))
            })?;
            output.copy_from_slice(src);
            return Ok(());
        }

        let ConstantData::U32(packed) = index_map.as_ref() else {
            return Err(StateError::Backend("index map must be u32".to_string()));
        };
        let map = IndexMap::unpack(packed)?;
        let out_shape = map.out_shape();
        check_len("gather input", map.in_shape.iter().product(), input.len())?;
        check_len("gather output", out_shape.iter().product(), output.len())?;

        let mut in_strides = vec![1usize; map.in_shape.len()];
        for k in (0..map.in_shape.len().saturating_sub(1)).rev() {
            in_strides[k] = in_strides[k + 1] * map.in_shape[k + 1];
        }

        let group = geometry.group_size().min(output.len().max(1));
        output
            .par_chunks_mut(group)
            .enumerate()
            .for_each(|(g, chunk)| {
                for (k, out) in chunk.iter_mut().enumerate() {
                    let mut rest = g * group + k;
                    let mut src = 0;
                    for axis in (0..out_shape.len()).rev() {
                        let coord = rest % out_shape[axis];
                        rest /= out_shape[axis];
                        src += map.indices[axis][coord] * in_strides[axis];
                    }
                    *out = input[src];
                }
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(backend: &CpuBackend, data: ConstantData) -> Arc<ConstantData> {
        backend.upload(&data).unwrap()
    }

    #[test]
    fn test_single_axis_contraction_matches_matmul() {
        // Tensor of shape (2, 3, 2); apply a 1x3 row-sum on the middle axis.
        let backend = CpuBackend::new();
        let input: Vec<f64> = (0..12).map(f64::from).collect();
        let spec = ContractionSpec::single(&[2, 3, 2], 1, 1);
        let matrix = upload(&backend, ConstantData::F64(vec![1.0, 1.0, 1.0]));
        let geometry = LaunchGeometry::single_axis(12, 4, (1, 3), 64);
        let mut output = vec![0.0; 4];
        backend
            .contract(&input, &mut output, &matrix, &spec, &geometry)
            .unwrap();
        // out[o, i] = Σ_a in[o, a, i]
        assert_eq!(output, vec![0.0 + 2.0 + 4.0, 1.0 + 3.0 + 5.0, 6.0 + 8.0 + 10.0, 7.0 + 9.0 + 11.0]);
    }

    #[test]
    fn test_pair_contraction_swap() {
        // Swap the two axes of a 2x2 tensor via a permutation matrix.
        let backend = CpuBackend::new();
        let mut m = vec![0.0; 16];
        for a in 0..2 {
            for b in 0..2 {
                // out[a, b] = in[b, a]
                m[((a * 2 + b) * 2 + b) * 2 + a] = 1.0;
            }
        }
        let matrix = upload(&backend, ConstantData::F64(m));
        let spec = ContractionSpec::pair(&[2, 2], 0, 1, (2, 2));
        let geometry = LaunchGeometry::two_axis(&[2, 2], (0, 1), (2, 2), (2, 2), 256);
        let input = vec![1.0, 2.0, 3.0, 4.0];
        let mut output = vec![0.0; 4];
        backend
            .contract(&input, &mut output, &matrix, &spec, &geometry)
            .unwrap();
        assert_eq!(output, vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_gather_selects_per_axis() {
        let backend = CpuBackend::new();
        let map = IndexMap {
            in_shape: vec![2, 3],
            indices: vec![vec![1], vec![0, 2]],
        };
        let packed = upload(&backend, map.pack());
        let input: Vec<f64> = (0..6).map(f64::from).collect();
        let mut output = vec![0.0; 2];
        backend
            .gather(&input, &mut output, &packed, &LaunchGeometry::gather(&[1, 2]))
            .unwrap();
        assert_eq!(output, vec![3.0, 5.0]);
    }

    #[test]
    fn test_whole_copy() {
        let backend = CpuBackend::new();
        let packed = upload(&backend, IndexMap { in_shape: vec![], indices: vec![] }.pack());
        let mut output = vec![0.0; 1];
        backend
            .gather(&[0.75], &mut output, &packed, &LaunchGeometry::WholeCopy)
            .unwrap();
        assert_eq!(output, vec![0.75]);
    }

    #[test]
    fn test_contract_rejects_wrong_lengths() {
        let backend = CpuBackend::new();
        let matrix = upload(&backend, ConstantData::F64(vec![1.0; 4]));
        let spec = ContractionSpec::single(&[2], 0, 2);
        let geometry = LaunchGeometry::single_axis(2, 2, (2, 2), 64);
        let mut output = vec![0.0; 3];
        assert!(matches!(
            backend.contract(&[1.0, 0.0], &mut output, &matrix, &spec, &geometry),
            Err(StateError::Backend(_))
        ));
    }
}

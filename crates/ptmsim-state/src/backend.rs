//! The execution backend seam.
//!
//! A [`TensorBackend`] provides the two primitives the engine is built on: a
//! dense linear map over one or two axes of a row-major tensor, and a
//! multi-axis gather. Constant operands (matrices, index maps) are uploaded
//! once through [`TensorBackend::upload`] and referred to by handle.

use std::hash::{Hash, Hasher};

use crate::error::{StateError, StateResult};
use crate::geometry::LaunchGeometry;

/// Host-side contents of a constant operand.
///
/// Equality and hashing are by exact content (bit patterns for floats), so
/// the value can key a cache of uploaded handles.
#[derive(Debug, Clone)]
pub enum ConstantData {
    /// A dense matrix, row-major.
    F64(Vec<f64>),
    /// A packed index map, see [`IndexMap::pack`].
    U32(Vec<u32>),
}

impl ConstantData {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            ConstantData::F64(v) => v.len(),
            ConstantData::U32(v) => v.len(),
        }
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the contents in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            ConstantData::F64(v) => v.len() * 8,
            ConstantData::U32(v) => v.len() * 4,
        }
    }
}

impl PartialEq for ConstantData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstantData::F64(a), ConstantData::F64(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (ConstantData::U32(a), ConstantData::U32(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstantData {}

impl Hash for ConstantData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ConstantData::F64(v) => {
                0u8.hash(state);
                v.len().hash(state);
                for x in v {
                    x.to_bits().hash(state);
                }
            }
            ConstantData::U32(v) => {
                1u8.hash(state);
                v.hash(state);
            }
        }
    }
}

/// Axis decomposition of a contraction.
///
/// The input tensor is viewed as `(outer, a_in, middle, b_in, inner)` and the
/// output as `(outer, a_out, middle, b_out, inner)`. The matrix has shape
/// `(a_out, b_out, a_in, b_in)`, row-major. A single-axis contraction uses
/// `b_in = b_out = 1` and `middle = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractionSpec {
    /// Product of the axis lengths before axis `a`.
    pub outer: usize,
    /// Input length of axis `a`.
    pub dim_a_in: usize,
    /// Output length of axis `a`.
    pub dim_a_out: usize,
    /// Product of the axis lengths between `a` and `b`.
    pub middle: usize,
    /// Input length of axis `b`.
    pub dim_b_in: usize,
    /// Output length of axis `b`.
    pub dim_b_out: usize,
    /// Product of the axis lengths after `b`.
    pub inner: usize,
}

impl ContractionSpec {
    /// Contraction over axis `axis` of a tensor of shape `shape`.
    pub fn single(shape: &[usize], axis: usize, dim_out: usize) -> Self {
        ContractionSpec {
            outer: shape[..axis].iter().product(),
            dim_a_in: shape[axis],
            dim_a_out: dim_out,
            middle: 1,
            dim_b_in: 1,
            dim_b_out: 1,
            inner: shape[axis + 1..].iter().product(),
        }
    }

    /// Joint contraction over axes `a < b`.
    pub fn pair(shape: &[usize], a: usize, b: usize, dims_out: (usize, usize)) -> Self {
        debug_assert!(a < b);
        ContractionSpec {
            outer: shape[..a].iter().product(),
            dim_a_in: shape[a],
            dim_a_out: dims_out.0,
            middle: shape[a + 1..b].iter().product(),
            dim_b_in: shape[b],
            dim_b_out: dims_out.1,
            inner: shape[b + 1..].iter().product(),
        }
    }

    /// Number of input elements.
    pub fn input_len(&self) -> usize {
        self.outer * self.dim_a_in * self.middle * self.dim_b_in * self.inner
    }

    /// Number of output elements.
    pub fn output_len(&self) -> usize {
        self.outer * self.dim_a_out * self.middle * self.dim_b_out * self.inner
    }

    /// Number of matrix elements.
    pub fn matrix_len(&self) -> usize {
        self.dim_a_out * self.dim_b_out * self.dim_a_in * self.dim_b_in
    }
}

/// Per-axis selection of input coordinates for a gather.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMap {
    /// Shape of the input tensor.
    pub in_shape: Vec<usize>,
    /// For each axis, the input coordinates to keep, in output order.
    pub indices: Vec<Vec<usize>>,
}

impl IndexMap {
    /// Shape of the gathered tensor.
    pub fn out_shape(&self) -> Vec<usize> {
        self.indices.iter().map(Vec::len).collect()
    }

    /// Pack as `[ndim, in_shape.., out_shape.., offsets.., indices..]`.
    pub fn pack(&self) -> ConstantData {
        let ndim = self.in_shape.len();
        let mut packed = Vec::with_capacity(1 + 3 * ndim + self.indices.iter().map(Vec::len).sum::<usize>());
        packed.push(ndim as u32);
        packed.extend(self.in_shape.iter().map(|&d| d as u32));
        packed.extend(self.indices.iter().map(|v| v.len() as u32));
        let mut offset = 0u32;
        for v in &self.indices {
            packed.push(offset);
            offset += v.len() as u32;
        }
        for v in &self.indices {
            packed.extend(v.iter().map(|&i| i as u32));
        }
        ConstantData::U32(packed)
    }

    /// Inverse of [`pack`](Self::pack).
    pub fn unpack(packed: &[u32]) -> StateResult<Self> {
        let malformed = || StateError::Backend("malformed packed index map".to_string());
        let ndim = *packed.first().ok_or_else(malformed)? as usize;
        let header = packed.get(1..1 + 3 * ndim).ok_or_else(malformed)?;
        let in_shape: Vec<usize> = header[..ndim].iter().map(|&d| d as usize).collect();
        let out_shape = &header[ndim..2 * ndim];
        let offsets = &header[2 * ndim..];
        let flat = &packed[1 + 3 * ndim..];

        let indices = out_shape
            .iter()
            .zip(offsets)
            .map(|(&len, &off)| {
                let (start, end) = (off as usize, off as usize + len as usize);
                flat.get(start..end)
                    .map(|s| s.iter().map(|&i| i as usize).collect())
                    .ok_or_else(malformed)
            })
            .collect::<StateResult<Vec<Vec<usize>>>>()?;
        Ok(IndexMap { in_shape, indices })
    }
}

/// Execution backend for the density tensor engine.
///
/// Implementations must write every element of `output` they are given and
/// must not read from it.
pub trait TensorBackend: Send + Sync {
    /// Backend-side handle to an uploaded constant.
    type Constant: Clone + Send + Sync;

    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    /// Make a constant available to the backend.
    fn upload(&self, data: &ConstantData) -> StateResult<Self::Constant>;

    /// Apply a dense linear map; see [`ContractionSpec`] for the layout.
    fn contract(
        &self,
        input: &[f64],
        output: &mut [f64],
        matrix: &Self::Constant,
        spec: &ContractionSpec,
        geometry: &LaunchGeometry,
    ) -> StateResult<()>;

    /// Gather the coordinates selected by a packed [`IndexMap`].
    fn gather(
        &self,
        input: &[f64],
        output: &mut [f64],
        index_map: &Self::Constant,
        geometry: &LaunchGeometry,
    ) -> StateResult<()>;
}

//! Pauli bases: orthonormal bases of Hermitian matrices for one subsystem.
//!
//! A basis fixes how one axis of a density tensor is indexed. For a qubit
//! (Hilbert dimension 2) a full basis has four elements; a classical state
//! (a mixture of |0⟩ and |1⟩) only needs the two diagonal projectors, so a
//! subsystem's basis can shrink to a *subbasis* and the tensor axis with it.
//!
//! Basis elements `B_x` satisfy `Tr(B_x · B_y†) = δ_xy`.
//!
//! # Example
//!
//! ```rust
//! use ptmsim_core::PauliBasis;
//!
//! let basis = PauliBasis::general(3);
//! assert_eq!(basis.dim_pauli(), 9);
//!
//! let classical = basis.get_classical_subbasis().unwrap();
//! assert_eq!(classical.dim_pauli(), 3);
//! assert!(std::sync::Arc::ptr_eq(&classical.get_superbasis(), &basis));
//! ```

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use num_complex::Complex64;

use crate::error::{PtmError, PtmResult};
use crate::linalg::{real_part, trace_product};

const ORTHONORMALITY_TOLERANCE: f64 = 1e-8;

/// An orthonormal basis of Hermitian `d × d` matrices.
///
/// Immutable after construction; subbases keep a reference to the basis they
/// were selected from.
#[derive(Debug, Clone)]
pub struct PauliBasis {
    /// Basis elements, shape `(dim_pauli, dim_hilbert, dim_hilbert)`.
    vectors: Array3<Complex64>,
    names: Vec<String>,
    superbasis: Option<Arc<PauliBasis>>,
    /// For each computational state `|i⟩`, the element `|i⟩⟨i|` equals, if any.
    comp_basis_indices: Vec<Option<usize>>,
    /// The element proportional to the identity, if any.
    trace_index: Option<usize>,
}

impl PauliBasis {
    /// Build a basis from explicit element matrices.
    ///
    /// `vectors` must have shape `(dim_pauli, d, d)` with `dim_pauli ≤ d²`
    /// and its elements must be trace-orthonormal.
    pub fn from_vectors(vectors: Array3<Complex64>, names: Vec<String>) -> PtmResult<Arc<Self>> {
        let (dim_pauli, rows, cols) = vectors.dim();
        if rows != cols {
            return Err(PtmError::NonSquareMatrix {
                context: "basis element",
                rows,
                cols,
            });
        }
        if dim_pauli == 0 || dim_pauli > rows * rows {
            return Err(PtmError::ShapeMismatch {
                context: "basis elements",
                expected: vec![rows * rows, rows, rows],
                got: vec![dim_pauli, rows, cols],
            });
        }
        if names.len() != dim_pauli {
            return Err(PtmError::ShapeMismatch {
                context: "basis element names",
                expected: vec![dim_pauli],
                got: vec![names.len()],
            });
        }
        let basis = Self::from_parts(vectors, names, None);
        basis.check_orthonormality()?;
        Ok(Arc::new(basis))
    }

    fn from_parts(
        vectors: Array3<Complex64>,
        names: Vec<String>,
        superbasis: Option<Arc<PauliBasis>>,
    ) -> Self {
        let (dim_pauli, dim_hilbert, _) = vectors.dim();

        let comp_basis_indices = (0..dim_hilbert)
            .map(|i| {
                let v: Vec<f64> = (0..dim_pauli).map(|x| vectors[[x, i, i]].re).collect();
                to_unit_vector(&v)
            })
            .collect();

        let norm = (dim_hilbert as f64).sqrt();
        let traces: Vec<f64> = (0..dim_pauli)
            .map(|x| {
                (0..dim_hilbert)
                    .map(|i| vectors[[x, i, i]].re)
                    .sum::<f64>()
                    / norm
            })
            .collect();
        let trace_index = to_unit_vector(&traces);

        Self {
            vectors,
            names,
            superbasis,
            comp_basis_indices,
            trace_index,
        }
    }

    /// The general basis for any Hilbert dimension `d`.
    ///
    /// Elements are the `d` diagonal projectors `|i⟩⟨i|`, followed by the
    /// off-diagonal pairs: an X-like (real symmetric) and a Y-like
    /// (imaginary antisymmetric) element for each `j < i`.
    pub fn general(dim: usize) -> Arc<Self> {
        let half = 0.5_f64.sqrt();
        let mut vectors = Array3::<Complex64>::zeros((dim * dim, dim, dim));
        let mut names = Vec::with_capacity(dim * dim);

        for i in 0..dim {
            vectors[[i, i, i]] = Complex64::new(1.0, 0.0);
            names.push(i.to_string());
        }

        let mut k = dim;
        for i in 0..dim {
            for j in 0..i {
                vectors[[k, i, j]] = Complex64::new(half, 0.0);
                vectors[[k, j, i]] = Complex64::new(half, 0.0);
                names.push(format!("X{j}{i}"));
                k += 1;

                vectors[[k, i, j]] = Complex64::new(0.0, half);
                vectors[[k, j, i]] = Complex64::new(0.0, -half);
                names.push(format!("Y{j}{i}"));
                k += 1;
            }
        }

        Arc::new(Self::from_parts(vectors, names, None))
    }

    /// The restricted qubit basis: `|0⟩⟨0|`, `σx/√2`, `σy/√2`, `|1⟩⟨1|`.
    pub fn restricted_qubit() -> Arc<Self> {
        let half = 0.5_f64.sqrt();
        let c = |re: f64, im: f64| Complex64::new(re, im);
        let mut vectors = Array3::<Complex64>::zeros((4, 2, 2));
        vectors[[0, 0, 0]] = c(1.0, 0.0);
        vectors[[1, 0, 1]] = c(half, 0.0);
        vectors[[1, 1, 0]] = c(half, 0.0);
        vectors[[2, 0, 1]] = c(0.0, -half);
        vectors[[2, 1, 0]] = c(0.0, half);
        vectors[[3, 1, 1]] = c(1.0, 0.0);
        let names = ["0", "X", "Y", "1"].map(String::from).to_vec();
        Arc::new(Self::from_parts(vectors, names, None))
    }

    /// The standard Pauli basis: `I/√2`, `σx/√2`, `σy/√2`, `σz/√2`.
    pub fn standard_pauli() -> Arc<Self> {
        let half = 0.5_f64.sqrt();
        let c = |re: f64, im: f64| Complex64::new(re, im);
        let mut vectors = Array3::<Complex64>::zeros((4, 2, 2));
        vectors[[0, 0, 0]] = c(half, 0.0);
        vectors[[0, 1, 1]] = c(half, 0.0);
        vectors[[1, 0, 1]] = c(half, 0.0);
        vectors[[1, 1, 0]] = c(half, 0.0);
        vectors[[2, 0, 1]] = c(0.0, -half);
        vectors[[2, 1, 0]] = c(0.0, half);
        vectors[[3, 0, 0]] = c(half, 0.0);
        vectors[[3, 1, 1]] = c(-half, 0.0);
        let names = ["I", "X", "Y", "Z"].map(String::from).to_vec();
        Arc::new(Self::from_parts(vectors, names, None))
    }

    /// Normalised generalised Gell-Mann matrices.
    ///
    /// The first element is the identity over `√d`; the remaining ones are
    /// traceless. `gell_mann(2)` coincides with [`PauliBasis::standard_pauli`].
    pub fn gell_mann(dim: usize) -> Arc<Self> {
        let half = 0.5_f64.sqrt();
        let mut diagonals: Vec<Vec<f64>> = vec![vec![1.0 / (dim as f64).sqrt(); dim]];
        for i in 1..dim {
            let norm = ((i * (i + 1)) as f64).sqrt();
            let mut d = vec![0.0; dim];
            for v in d.iter_mut().take(i) {
                *v = 1.0 / norm;
            }
            d[i] = -(i as f64) / norm;
            diagonals.push(d);
        }

        let mut vectors = Array3::<Complex64>::zeros((dim * dim, dim, dim));
        let mut names = Vec::with_capacity(dim * dim);
        for i in 0..dim {
            for j in 0..dim {
                let k = i * dim + j;
                names.push(format!("γ{i}{j}"));
                if i == j {
                    for (l, &v) in diagonals[i].iter().enumerate() {
                        vectors[[k, l, l]] = Complex64::new(v, 0.0);
                    }
                } else if i < j {
                    vectors[[k, i, j]] = Complex64::new(half, 0.0);
                    vectors[[k, j, i]] = Complex64::new(half, 0.0);
                } else {
                    vectors[[k, i, j]] = Complex64::new(0.0, half);
                    vectors[[k, j, i]] = Complex64::new(0.0, -half);
                }
            }
        }
        Arc::new(Self::from_parts(vectors, names, None))
    }

    /// Hilbert space dimension `d`.
    pub fn dim_hilbert(&self) -> usize {
        self.vectors.dim().1
    }

    /// Number of basis elements.
    pub fn dim_pauli(&self) -> usize {
        self.vectors.dim().0
    }

    /// All basis elements, shape `(dim_pauli, d, d)`.
    pub fn vectors(&self) -> &Array3<Complex64> {
        &self.vectors
    }

    /// Basis element `index`.
    pub fn vector(&self, index: usize) -> ArrayView2<'_, Complex64> {
        self.vectors.index_axis(Axis(0), index)
    }

    /// Element names, in basis order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The basis this one was selected from, if any.
    pub fn superbasis(&self) -> Option<&Arc<PauliBasis>> {
        self.superbasis.as_ref()
    }

    /// The basis this one was selected from, or itself.
    pub fn get_superbasis(self: &Arc<Self>) -> Arc<Self> {
        self.superbasis.clone().unwrap_or_else(|| Arc::clone(self))
    }

    /// Per computational state, the basis element equal to `|i⟩⟨i|`.
    pub fn comp_basis_indices(&self) -> &[Option<usize>] {
        &self.comp_basis_indices
    }

    /// The basis element equal to `|state⟩⟨state|`, if there is one.
    pub fn comp_basis_index(&self, state: usize) -> Option<usize> {
        self.comp_basis_indices.get(state).copied().flatten()
    }

    /// Like [`comp_basis_index`](Self::comp_basis_index) but failing with a
    /// descriptive error.
    pub fn require_comp_basis_index(&self, state: usize) -> PtmResult<usize> {
        self.comp_basis_index(state)
            .ok_or_else(|| PtmError::UnrepresentableState {
                state,
                basis: self.to_string(),
            })
    }

    /// Basis element indices aligned with computational states, in state order.
    pub fn classical_indices(&self) -> Vec<usize> {
        self.comp_basis_indices.iter().filter_map(|&i| i).collect()
    }

    /// The element proportional to the identity, if any.
    pub fn trace_index(&self) -> Option<usize> {
        self.trace_index
    }

    /// Diagonals of the basis elements: entry `[i, x]` is `⟨i|B_x|i⟩`.
    pub fn computational_basis_vectors(&self) -> Array2<f64> {
        let (dim_pauli, dim_hilbert, _) = self.vectors.dim();
        Array2::from_shape_fn((dim_hilbert, dim_pauli), |(i, x)| self.vectors[[x, i, i]].re)
    }

    /// A new basis containing the selected elements, with `self` as superbasis.
    pub fn get_subbasis(self: &Arc<Self>, indices: &[usize]) -> PtmResult<Arc<Self>> {
        if indices.is_empty() {
            return Err(PtmError::EmptyExpression("subbasis"));
        }
        if let Some(&index) = indices.iter().find(|&&i| i >= self.dim_pauli()) {
            return Err(PtmError::BasisIndexOutOfRange {
                index,
                dim_pauli: self.dim_pauli(),
            });
        }
        let vectors = self.vectors.select(Axis(0), indices);
        let names = indices.iter().map(|&i| self.names[i].clone()).collect();
        Ok(Arc::new(Self::from_parts(
            vectors,
            names,
            Some(Arc::clone(self)),
        )))
    }

    /// The subbasis of elements aligned with computational basis states.
    ///
    /// Fails with [`PtmError::NoClassicalSubbasis`] when no element is aligned
    /// with any computational state (e.g. the Gell-Mann basis).
    pub fn get_classical_subbasis(self: &Arc<Self>) -> PtmResult<Arc<Self>> {
        let indices = self.classical_indices();
        if indices.is_empty() {
            return Err(PtmError::NoClassicalSubbasis {
                basis: self.to_string(),
            });
        }
        self.get_subbasis(&indices)
    }

    /// Coordinates `Tr(B_x · ρ)` of a Hilbert-space operator in this basis.
    pub fn hilbert_to_pauli_vector(&self, rho: &ArrayView2<'_, Complex64>) -> PtmResult<Array1<f64>> {
        let d = self.dim_hilbert();
        if rho.dim() != (d, d) {
            return Err(PtmError::ShapeMismatch {
                context: "density matrix",
                expected: vec![d, d],
                got: rho.shape().to_vec(),
            });
        }
        let coords: Array1<Complex64> = (0..self.dim_pauli())
            .map(|x| trace_product(&self.vector(x), rho))
            .collect();
        real_part(&coords, "pauli vector")
    }

    /// Verify `Tr(B_x · B_y†) = δ_xy`.
    pub fn check_orthonormality(&self) -> PtmResult<()> {
        let n = self.dim_pauli();
        let mut deviation = 0.0_f64;
        for x in 0..n {
            for y in 0..n {
                let by_dag = self.vector(y).t().mapv(|z| z.conj());
                let g = trace_product(&self.vector(x), &by_dag.view());
                let expected = if x == y { 1.0 } else { 0.0 };
                deviation = deviation.max((g - expected).norm());
            }
        }
        if deviation > ORTHONORMALITY_TOLERANCE {
            return Err(PtmError::NotOrthonormal { deviation });
        }
        Ok(())
    }
}

impl PartialEq for PauliBasis {
    /// Two bases are equal when they have the same elements and names,
    /// regardless of where they were selected from.
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names && self.vectors == other.vectors
    }
}

impl fmt::Display for PauliBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<PauliBasis d_hilbert={}, d_pauli={}, {}>",
            self.dim_hilbert(),
            self.dim_pauli(),
            self.names.join(" ")
        )
    }
}

/// Overlap matrix `T[x, y] = Tr(to_x · from_y)` re-expressing coordinates in
/// `from` as coordinates in `to`.
///
/// Both bases consist of Hermitian matrices, so the overlap is real.
pub fn basis_transform(to: &PauliBasis, from: &PauliBasis) -> PtmResult<Array2<f64>> {
    if to.dim_hilbert() != from.dim_hilbert() {
        return Err(PtmError::DimensionMismatch {
            context: "basis transformation",
            expected: to.dim_hilbert(),
            got: from.dim_hilbert(),
        });
    }
    let overlap = Array2::from_shape_fn((to.dim_pauli(), from.dim_pauli()), |(x, y)| {
        trace_product(&to.vector(x), &from.vector(y))
    });
    real_part(&overlap, "basis transformation")
}

/// Index of the single non-zero entry of `v`, provided the entries sum to one.
fn to_unit_vector(v: &[f64]) -> Option<usize> {
    let sum: f64 = v.iter().sum();
    if (sum - 1.0).abs() > 1e-8 + 1e-5 {
        return None;
    }
    let mut nonzero = v
        .iter()
        .enumerate()
        .filter(|&(_, x)| (x * 1e8).round() != 0.0)
        .map(|(i, _)| i);
    match (nonzero.next(), nonzero.next()) {
        (Some(i), None) => Some(i),
        _ => None,
    }
}

//! Pauli transfer matrices for a single subsystem.
//!
//! A [`Ptm`] is an immutable description of a linear superoperator. It does
//! not commit to a basis: [`Ptm::get_matrix`] renders it as a dense real
//! matrix for any pair of input and output [`PauliBasis`] values of the right
//! Hilbert dimension.
//!
//! Composite values are built with ordinary operators:
//!
//! ```rust
//! use ndarray::array;
//! use num_complex::Complex64;
//! use ptmsim_core::{OutputBasis, PauliBasis, Ptm};
//!
//! let c = |re| Complex64::new(re, 0.0);
//! let x = Ptm::conjunction(array![[c(0.0), c(1.0)], [c(1.0), c(0.0)]]).unwrap();
//! let id = Ptm::identity(2);
//!
//! // Half bit flip, then a full flip.
//! let channel = x.clone() * (0.5 * id + 0.5 * x);
//!
//! let basis = PauliBasis::general(2);
//! let m = channel.get_matrix(&basis, OutputBasis::SameAsInput).unwrap();
//! assert_eq!(m.dim(), (4, 4));
//! ```

use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;

use ndarray::{Array2, ArrayView2, Axis};
use num_complex::Complex64;

use crate::basis::{basis_transform, PauliBasis};
use crate::error::{PtmError, PtmResult};
use crate::linalg::{dagger, ensure_square, expm, real_part, trace_product};

/// Output basis selector for [`Ptm::get_matrix`].
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputBasis<'a> {
    /// Render into the input basis.
    #[default]
    SameAsInput,
    /// Render into the given basis.
    Explicit(&'a PauliBasis),
}

impl<'a> OutputBasis<'a> {
    /// Resolve against the input basis.
    pub fn resolve(self, basis_in: &'a PauliBasis) -> &'a PauliBasis {
        match self {
            OutputBasis::SameAsInput => basis_in,
            OutputBasis::Explicit(basis) => basis,
        }
    }
}

impl<'a> From<&'a PauliBasis> for OutputBasis<'a> {
    fn from(basis: &'a PauliBasis) -> Self {
        OutputBasis::Explicit(basis)
    }
}

impl<'a> From<&'a Arc<PauliBasis>> for OutputBasis<'a> {
    fn from(basis: &'a Arc<PauliBasis>) -> Self {
        OutputBasis::Explicit(basis.as_ref())
    }
}

/// A superoperator on one subsystem.
///
/// Operator matrices (`Conjunction`, `Adjunction`, `Lindblad`) are given in
/// the computational basis of the Hilbert space.
#[derive(Debug, Clone)]
pub enum Ptm {
    /// A dense matrix expressed in `basis` (same basis for input and output).
    Explicit {
        /// Square matrix of side `basis.dim_pauli()`.
        matrix: Array2<f64>,
        /// The basis `matrix` is expressed in.
        basis: Arc<PauliBasis>,
    },
    /// `Σ c_i · P_i`.
    LinearCombination(Vec<(Ptm, f64)>),
    /// Composition; the last factor is applied first.
    Product(Vec<Ptm>),
    /// `ρ ↦ U ρ U†`.
    Conjunction(Array2<Complex64>),
    /// `ρ ↦ −i [H, ρ]`, the generator of unitary evolution under `H`.
    Adjunction(Array2<Complex64>),
    /// `ρ ↦ L ρ L† − ½ {L†L, ρ}`, the dissipator of a jump operator `L`.
    Lindblad(Array2<Complex64>),
    /// `exp(G)` for a generator `G`: the channel obtained by evolving under
    /// `G` for unit time.
    Integrated(Box<Ptm>),
}

impl Ptm {
    /// An explicit matrix in `basis`.
    pub fn explicit(matrix: Array2<f64>, basis: Arc<PauliBasis>) -> PtmResult<Self> {
        let n = basis.dim_pauli();
        if matrix.dim() != (n, n) {
            return Err(PtmError::ShapeMismatch {
                context: "explicit PTM",
                expected: vec![n, n],
                got: matrix.shape().to_vec(),
            });
        }
        Ok(Ptm::Explicit { matrix, basis })
    }

    /// Conjugation by `op`.
    pub fn conjunction(op: Array2<Complex64>) -> PtmResult<Self> {
        ensure_square(&op, "conjunction operator")?;
        Ok(Ptm::Conjunction(op))
    }

    /// Commutator generator of the Hamiltonian `op`.
    pub fn adjunction(op: Array2<Complex64>) -> PtmResult<Self> {
        ensure_square(&op, "adjunction operator")?;
        Ok(Ptm::Adjunction(op))
    }

    /// Lindblad dissipator of the jump operator `op`.
    pub fn lindblad(op: Array2<Complex64>) -> PtmResult<Self> {
        ensure_square(&op, "lindblad operator")?;
        Ok(Ptm::Lindblad(op))
    }

    /// Unit-time integration of `generator`.
    pub fn integrated(generator: Ptm) -> PtmResult<Self> {
        generator.dim_hilbert()?;
        Ok(Ptm::Integrated(Box::new(generator)))
    }

    /// A validated linear combination.
    pub fn linear_combination(terms: Vec<(Ptm, f64)>) -> PtmResult<Self> {
        let ptm = Ptm::LinearCombination(terms);
        ptm.dim_hilbert()?;
        Ok(ptm)
    }

    /// A validated product; `factors[0]` is applied last.
    pub fn product(factors: Vec<Ptm>) -> PtmResult<Self> {
        let ptm = Ptm::Product(factors);
        ptm.dim_hilbert()?;
        Ok(ptm)
    }

    /// The identity channel on a `dim`-level system.
    pub fn identity(dim: usize) -> Self {
        Ptm::Conjunction(Array2::eye(dim))
    }

    /// `self ∘ other`, checking that the Hilbert dimensions agree.
    pub fn compose(&self, other: &Ptm) -> PtmResult<Ptm> {
        let lhs = self.dim_hilbert()?;
        let rhs = other.dim_hilbert()?;
        if lhs != rhs {
            return Err(PtmError::DimensionMismatch {
                context: "PTM composition",
                expected: lhs,
                got: rhs,
            });
        }
        Ok(self.clone() * other.clone())
    }

    /// Hilbert space dimension the PTM acts on.
    ///
    /// Composite values are checked recursively; empty composites and
    /// factors of mixed dimension are rejected.
    pub fn dim_hilbert(&self) -> PtmResult<usize> {
        match self {
            Ptm::Explicit { basis, .. } => Ok(basis.dim_hilbert()),
            Ptm::Conjunction(op) | Ptm::Adjunction(op) | Ptm::Lindblad(op) => Ok(op.nrows()),
            Ptm::Integrated(generator) => generator.dim_hilbert(),
            Ptm::LinearCombination(terms) => {
                common_dim(terms.iter().map(|(p, _)| p), "linear combination")
            }
            Ptm::Product(factors) => common_dim(factors.iter(), "product"),
        }
    }

    /// Dense matrix of shape `(out.dim_pauli, basis_in.dim_pauli)`.
    ///
    /// Fails before any contraction if the bases do not match the PTM's
    /// Hilbert dimension.
    pub fn get_matrix(&self, basis_in: &PauliBasis, out: OutputBasis<'_>) -> PtmResult<Array2<f64>> {
        let basis_out = out.resolve(basis_in);
        let dim = self.dim_hilbert()?;
        for (context, basis) in [("PTM input basis", basis_in), ("PTM output basis", basis_out)] {
            if basis.dim_hilbert() != dim {
                return Err(PtmError::DimensionMismatch {
                    context,
                    expected: dim,
                    got: basis.dim_hilbert(),
                });
            }
        }
        self.evaluate(basis_in, basis_out)
    }

    /// Freeze into an explicit matrix in `basis`.
    pub fn to_explicit(&self, basis: Arc<PauliBasis>) -> PtmResult<Ptm> {
        let matrix = self.get_matrix(&basis, OutputBasis::SameAsInput)?;
        Ok(Ptm::Explicit { matrix, basis })
    }

    fn evaluate(&self, basis_in: &PauliBasis, basis_out: &PauliBasis) -> PtmResult<Array2<f64>> {
        match self {
            Ptm::Explicit { matrix, basis } => {
                let t_out = basis_transform(basis_out, basis)?;
                let t_in = basis_transform(basis, basis_in)?;
                Ok(t_out.dot(matrix).dot(&t_in))
            }
            Ptm::LinearCombination(terms) => {
                let mut result = Array2::zeros((basis_out.dim_pauli(), basis_in.dim_pauli()));
                for (ptm, coefficient) in terms {
                    result.scaled_add(*coefficient, &ptm.evaluate(basis_in, basis_out)?);
                }
                Ok(result)
            }
            Ptm::Product(factors) => {
                // Compose in the full general basis so no intermediate
                // truncation can drop probability.
                let general = PauliBasis::general(basis_in.dim_hilbert());
                let mut result = Array2::<f64>::eye(general.dim_pauli());
                for factor in factors.iter().rev() {
                    result = factor.evaluate(&general, &general)?.dot(&result);
                }
                rebase(&result, &general, basis_in, basis_out)
            }
            Ptm::Integrated(generator) => {
                let general = PauliBasis::general(basis_in.dim_hilbert());
                let exponent = expm(&generator.evaluate(&general, &general)?)?;
                rebase(&exponent, &general, basis_in, basis_out)
            }
            Ptm::Conjunction(u) => {
                let u_dag = dagger(&u.view());
                superop_matrix(basis_in, basis_out, |b| u.dot(b).dot(&u_dag))
            }
            Ptm::Adjunction(h) => {
                let minus_i = Complex64::new(0.0, -1.0);
                superop_matrix(basis_in, basis_out, |b| {
                    (h.dot(b) - b.dot(h)).mapv(|z| z * minus_i)
                })
            }
            Ptm::Lindblad(l) => {
                let l_dag = dagger(&l.view());
                let l_dag_l = l_dag.dot(l);
                let half = Complex64::new(0.5, 0.0);
                superop_matrix(basis_in, basis_out, |b| {
                    let jump = l.dot(b).dot(&l_dag);
                    let anti = l_dag_l.dot(b) + b.dot(&l_dag_l);
                    jump - anti.mapv(|z| z * half)
                })
            }
        }
    }

    /// Extend the PTM to a `new_dim`-level Hilbert space.
    ///
    /// `mapping[i]` is the level of the new space that old level `i` maps to;
    /// the default maps level `i` to level `i`. For a conjunction the extra
    /// levels are left untouched; generators act trivially on them.
    pub fn embed_hilbert(&self, new_dim: usize, mapping: Option<&[usize]>) -> PtmResult<Ptm> {
        let old_dim = self.dim_hilbert()?;
        let default_mapping: Vec<usize> = (0..old_dim.min(new_dim)).collect();
        let mapping = mapping.unwrap_or(&default_mapping[..]);
        if mapping.len() > old_dim {
            return Err(PtmError::ShapeMismatch {
                context: "embedding map",
                expected: vec![old_dim],
                got: vec![mapping.len()],
            });
        }

        let mut proj = Array2::<Complex64>::zeros((old_dim, new_dim));
        for (i, &j) in mapping.iter().enumerate() {
            if j >= new_dim {
                return Err(PtmError::InvalidParameter {
                    name: "embedding target level",
                    value: j as f64,
                });
            }
            proj[[i, j]] = Complex64::new(1.0, 0.0);
        }
        let proj_t = proj.t().to_owned();

        match self {
            Ptm::Conjunction(u) => {
                let op = Array2::<Complex64>::eye(new_dim) - proj_t.dot(&proj)
                    + proj_t.dot(u).dot(&proj);
                Ok(Ptm::Conjunction(op))
            }
            Ptm::Adjunction(h) => Ok(Ptm::Adjunction(proj_t.dot(h).dot(&proj))),
            Ptm::Lindblad(l) => Ok(Ptm::Lindblad(proj_t.dot(l).dot(&proj))),
            Ptm::Integrated(generator) => Ok(Ptm::Integrated(Box::new(
                generator.embed_hilbert(new_dim, Some(mapping))?,
            ))),
            Ptm::LinearCombination(terms) => terms
                .iter()
                .map(|(p, c)| Ok((p.embed_hilbert(new_dim, Some(mapping))?, *c)))
                .collect::<PtmResult<Vec<_>>>()
                .map(Ptm::LinearCombination),
            Ptm::Product(factors) => factors
                .iter()
                .map(|p| p.embed_hilbert(new_dim, Some(mapping)))
                .collect::<PtmResult<Vec<_>>>()
                .map(Ptm::Product),
            Ptm::Explicit { .. } => Err(PtmError::NotEmbeddable("explicit-basis PTM")),
        }
    }

    fn into_terms(self) -> Vec<(Ptm, f64)> {
        match self {
            Ptm::LinearCombination(terms) => terms,
            other => vec![(other, 1.0)],
        }
    }

    fn into_factors(self) -> Vec<Ptm> {
        match self {
            Ptm::Product(factors) => factors,
            other => vec![other],
        }
    }
}

fn common_dim<'a>(mut ptms: impl Iterator<Item = &'a Ptm>, context: &'static str) -> PtmResult<usize> {
    let first = ptms
        .next()
        .ok_or(PtmError::EmptyExpression(context))?
        .dim_hilbert()?;
    for ptm in ptms {
        let dim = ptm.dim_hilbert()?;
        if dim != first {
            return Err(PtmError::DimensionMismatch {
                context,
                expected: first,
                got: dim,
            });
        }
    }
    Ok(first)
}

/// `T_out · m · T_in` for a square `m` expressed in `native`.
fn rebase(
    m: &Array2<f64>,
    native: &PauliBasis,
    basis_in: &PauliBasis,
    basis_out: &PauliBasis,
) -> PtmResult<Array2<f64>> {
    let t_out = basis_transform(basis_out, native)?;
    let t_in = basis_transform(native, basis_in)?;
    Ok(t_out.dot(m).dot(&t_in))
}

/// `result[x, y] = Tr(out_x · f(in_y))`.
fn superop_matrix<F>(basis_in: &PauliBasis, basis_out: &PauliBasis, f: F) -> PtmResult<Array2<f64>>
where
    F: Fn(&ArrayView2<'_, Complex64>) -> Array2<Complex64>,
{
    let images: Vec<Array2<Complex64>> = basis_in
        .vectors()
        .axis_iter(Axis(0))
        .map(|b| f(&b))
        .collect();
    let result = Array2::from_shape_fn((basis_out.dim_pauli(), basis_in.dim_pauli()), |(x, y)| {
        trace_product(&basis_out.vector(x), &images[y].view())
    });
    real_part(&result, "superoperator")
}

impl Add for Ptm {
    type Output = Ptm;

    fn add(self, rhs: Ptm) -> Ptm {
        let mut terms = self.into_terms();
        terms.extend(rhs.into_terms());
        Ptm::LinearCombination(terms)
    }
}

impl Sub for Ptm {
    type Output = Ptm;

    fn sub(self, rhs: Ptm) -> Ptm {
        self + (-rhs)
    }
}

impl Neg for Ptm {
    type Output = Ptm;

    fn neg(self) -> Ptm {
        self * -1.0
    }
}

impl Mul<f64> for Ptm {
    type Output = Ptm;

    fn mul(self, scalar: f64) -> Ptm {
        Ptm::LinearCombination(
            self.into_terms()
                .into_iter()
                .map(|(p, c)| (p, c * scalar))
                .collect(),
        )
    }
}

impl Mul<Ptm> for f64 {
    type Output = Ptm;

    fn mul(self, ptm: Ptm) -> Ptm {
        ptm * self
    }
}

/// `a * b` is the composition `a ∘ b`: `b` acts first.
impl Mul for Ptm {
    type Output = Ptm;

    fn mul(self, rhs: Ptm) -> Ptm {
        let mut factors = self.into_factors();
        factors.extend(rhs.into_factors());
        Ptm::Product(factors)
    }
}

//! Superoperators on a pair of subsystems.
//!
//! Matrices have shape `(p0_out, p1_out, p0_in, p1_in)`, where `pi` is the
//! number of elements in subsystem `i`'s basis.

use std::sync::Arc;

use ndarray::{Array2, Array4, Axis};
use num_complex::Complex64;

use crate::basis::{basis_transform, PauliBasis};
use crate::error::{PtmError, PtmResult};
use crate::linalg::{compose4, dagger, identity4, kron, mode_product, real_part, trace_product};
use crate::ptm::{OutputBasis, Ptm};

/// Output bases selector for [`TwoPtm::get_matrix`].
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputBases<'a> {
    /// Render into the input bases.
    #[default]
    SameAsInput,
    /// Render into the given bases.
    Explicit([&'a PauliBasis; 2]),
}

impl<'a> OutputBases<'a> {
    fn resolve(self, bases_in: [&'a PauliBasis; 2]) -> [&'a PauliBasis; 2] {
        match self {
            OutputBases::SameAsInput => bases_in,
            OutputBases::Explicit(bases) => bases,
        }
    }
}

/// One step of a [`TwoPtm::Product`].
#[derive(Debug, Clone)]
pub enum TwoPtmFactor {
    /// A single-subsystem PTM acting on subsystem `target` (0 or 1).
    Single {
        /// Which of the two subsystems the PTM acts on.
        target: usize,
        /// The PTM.
        ptm: Ptm,
    },
    /// A two-subsystem PTM; `swapped` applies it with its operands exchanged.
    Two {
        /// Whether the factor's subsystem 0 is the product's subsystem 1.
        swapped: bool,
        /// The PTM.
        ptm: TwoPtm,
    },
}

/// A superoperator on two subsystems.
#[derive(Debug, Clone)]
pub enum TwoPtm {
    /// `ρ ↦ Σ_k K_k ρ K_k†`, each `K_k` of shape `(d0, d1, d0, d1)` indexed
    /// `[out0, out1, in0, in1]` in the computational basis.
    Kraus(Vec<Array4<Complex64>>),
    /// A dense matrix in the given pair of bases.
    Explicit {
        /// Shape `(p0, p1, p0, p1)`.
        matrix: Array4<f64>,
        /// Bases of subsystem 0 and 1.
        bases: [Arc<PauliBasis>; 2],
    },
    /// Factors in application order: `factors[0]` acts first.
    Product(Vec<TwoPtmFactor>),
}

impl TwoPtm {
    /// A Kraus channel; all operators must share one shape `(d0, d1, d0, d1)`.
    pub fn kraus(operators: Vec<Array4<Complex64>>) -> PtmResult<Self> {
        let first = operators
            .first()
            .ok_or(PtmError::EmptyExpression("two-subsystem Kraus channel"))?;
        let (d0, d1, e0, e1) = first.dim();
        for op in &operators {
            if op.dim() != (d0, d1, d0, d1) || (e0, e1) != (d0, d1) {
                return Err(PtmError::ShapeMismatch {
                    context: "two-subsystem Kraus operator",
                    expected: vec![d0, d1, d0, d1],
                    got: op.shape().to_vec(),
                });
            }
        }
        Ok(TwoPtm::Kraus(operators))
    }

    /// Conjugation by a single two-subsystem unitary.
    pub fn unitary(u: Array4<Complex64>) -> PtmResult<Self> {
        Self::kraus(vec![u])
    }

    /// Conjugation by a `(d0·d1) × (d0·d1)` matrix in the computational basis,
    /// with subsystem 0 as the more significant factor.
    pub fn from_matrix(u: &Array2<Complex64>, dims: [usize; 2]) -> PtmResult<Self> {
        let n = dims[0] * dims[1];
        if u.dim() != (n, n) {
            return Err(PtmError::ShapeMismatch {
                context: "two-subsystem operator",
                expected: vec![n, n],
                got: u.shape().to_vec(),
            });
        }
        let d1 = dims[1];
        let op = Array4::from_shape_fn((dims[0], d1, dims[0], d1), |(a, b, c, d)| {
            u[[a * d1 + b, c * d1 + d]]
        });
        Ok(TwoPtm::Kraus(vec![op]))
    }

    /// An explicit matrix in `bases`.
    pub fn explicit(matrix: Array4<f64>, bases: [Arc<PauliBasis>; 2]) -> PtmResult<Self> {
        let (p0, p1) = (bases[0].dim_pauli(), bases[1].dim_pauli());
        if matrix.dim() != (p0, p1, p0, p1) {
            return Err(PtmError::ShapeMismatch {
                context: "explicit two-subsystem PTM",
                expected: vec![p0, p1, p0, p1],
                got: matrix.shape().to_vec(),
            });
        }
        Ok(TwoPtm::Explicit { matrix, bases })
    }

    /// An empty product, i.e. the identity.
    pub fn product() -> Self {
        TwoPtm::Product(Vec::new())
    }

    /// Append a single-subsystem factor (applied after existing factors).
    pub fn then_single(self, target: usize, ptm: Ptm) -> Self {
        self.then(TwoPtmFactor::Single { target, ptm })
    }

    /// Append a two-subsystem factor (applied after existing factors).
    pub fn then_two(self, swapped: bool, ptm: TwoPtm) -> Self {
        self.then(TwoPtmFactor::Two { swapped, ptm })
    }

    fn then(self, factor: TwoPtmFactor) -> Self {
        match self {
            TwoPtm::Product(mut factors) => {
                factors.push(factor);
                TwoPtm::Product(factors)
            }
            other => TwoPtm::Product(vec![
                TwoPtmFactor::Two {
                    swapped: false,
                    ptm: other,
                },
                factor,
            ]),
        }
    }

    /// Hilbert dimensions fixed by the PTM itself, per subsystem.
    ///
    /// A product only fixes the dimensions of subsystems its factors touch.
    pub fn dim_hilbert(&self) -> [Option<usize>; 2] {
        match self {
            TwoPtm::Kraus(ops) => ops
                .first()
                .map(|op| [Some(op.dim().0), Some(op.dim().1)])
                .unwrap_or([None, None]),
            TwoPtm::Explicit { bases, .. } => {
                [Some(bases[0].dim_hilbert()), Some(bases[1].dim_hilbert())]
            }
            TwoPtm::Product(factors) => {
                let mut dims = [None, None];
                for factor in factors {
                    match factor {
                        TwoPtmFactor::Single { target, ptm } => {
                            if let (Some(slot), Ok(d)) = (dims.get_mut(*target), ptm.dim_hilbert()) {
                                slot.get_or_insert(d);
                            }
                        }
                        TwoPtmFactor::Two { swapped, ptm } => {
                            let mut inner = ptm.dim_hilbert();
                            if *swapped {
                                inner.swap(0, 1);
                            }
                            for (slot, d) in dims.iter_mut().zip(inner) {
                                if let Some(d) = d {
                                    slot.get_or_insert(d);
                                }
                            }
                        }
                    }
                }
                dims
            }
        }
    }

    /// Verify every component against the subsystem dimensions `dims`.
    pub fn check_dims(&self, dims: [usize; 2]) -> PtmResult<()> {
        let check = |expected: usize, got: usize| {
            if expected == got {
                Ok(())
            } else {
                Err(PtmError::DimensionMismatch {
                    context: "two-subsystem PTM",
                    expected,
                    got,
                })
            }
        };
        match self {
            TwoPtm::Product(factors) => {
                for factor in factors {
                    match factor {
                        TwoPtmFactor::Single { target, ptm } => {
                            let expected = *dims.get(*target).ok_or(PtmError::BasisIndexOutOfRange {
                                index: *target,
                                dim_pauli: 2,
                            })?;
                            check(expected, ptm.dim_hilbert()?)?;
                        }
                        TwoPtmFactor::Two { swapped, ptm } => {
                            let inner = if *swapped { [dims[1], dims[0]] } else { dims };
                            ptm.check_dims(inner)?;
                        }
                    }
                }
                Ok(())
            }
            other => {
                for (expected, got) in dims.into_iter().zip(other.dim_hilbert()) {
                    if let Some(got) = got {
                        check(expected, got)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Dense matrix of shape `(p0_out, p1_out, p0_in, p1_in)`.
    pub fn get_matrix(
        &self,
        bases_in: [&PauliBasis; 2],
        out: OutputBases<'_>,
    ) -> PtmResult<Array4<f64>> {
        let bases_out = out.resolve(bases_in);
        for i in 0..2 {
            if bases_in[i].dim_hilbert() != bases_out[i].dim_hilbert() {
                return Err(PtmError::DimensionMismatch {
                    context: "two-subsystem output basis",
                    expected: bases_in[i].dim_hilbert(),
                    got: bases_out[i].dim_hilbert(),
                });
            }
        }
        self.check_dims([bases_in[0].dim_hilbert(), bases_in[1].dim_hilbert()])?;
        self.evaluate(bases_in, bases_out)
    }

    fn evaluate(
        &self,
        bases_in: [&PauliBasis; 2],
        bases_out: [&PauliBasis; 2],
    ) -> PtmResult<Array4<f64>> {
        match self {
            TwoPtm::Kraus(ops) => kraus_matrix(ops, bases_in, bases_out),
            TwoPtm::Explicit { matrix, bases } => {
                rebase4(matrix, [&*bases[0], &*bases[1]], bases_in, bases_out)
            }
            TwoPtm::Product(factors) => {
                let general = [
                    PauliBasis::general(bases_in[0].dim_hilbert()),
                    PauliBasis::general(bases_in[1].dim_hilbert()),
                ];
                let mut result = identity4(general[0].dim_pauli(), general[1].dim_pauli());
                for factor in factors {
                    match factor {
                        TwoPtmFactor::Single { target, ptm } => {
                            let m = ptm.get_matrix(&general[*target], OutputBasis::SameAsInput)?;
                            result = mode_product(&result, &m.view(), *target);
                        }
                        TwoPtmFactor::Two { swapped, ptm } => {
                            let m = if *swapped {
                                ptm.evaluate([&*general[1], &*general[0]], [&*general[1], &*general[0]])?
                                    .permuted_axes([1, 0, 3, 2])
                            } else {
                                ptm.evaluate([&*general[0], &*general[1]], [&*general[0], &*general[1]])?
                            };
                            result = compose4(&m, &result);
                        }
                    }
                }
                rebase4(&result, [&*general[0], &*general[1]], bases_in, bases_out)
            }
        }
    }
}

/// Re-express a two-subsystem matrix given in `native` bases.
pub fn rebase4(
    m: &Array4<f64>,
    native: [&PauliBasis; 2],
    bases_in: [&PauliBasis; 2],
    bases_out: [&PauliBasis; 2],
) -> PtmResult<Array4<f64>> {
    let mut result = m.clone();
    for i in 0..2 {
        let t_out = basis_transform(bases_out[i], native[i])?;
        let t_in = basis_transform(native[i], bases_in[i])?;
        result = mode_product(&result, &t_out.view(), i);
        result = mode_product(&result, &t_in.t(), i + 2);
    }
    Ok(result)
}

fn kraus_matrix(
    ops: &[Array4<Complex64>],
    bases_in: [&PauliBasis; 2],
    bases_out: [&PauliBasis; 2],
) -> PtmResult<Array4<f64>> {
    let (d0, d1) = (bases_in[0].dim_hilbert(), bases_in[1].dim_hilbert());
    let n = d0 * d1;
    let flat: Vec<Array2<Complex64>> = ops
        .iter()
        .map(|k| Array2::from_shape_fn((n, n), |(r, c)| k[[r / d1, r % d1, c / d1, c % d1]]))
        .collect();

    let (pi0, pi1) = (bases_in[0].dim_pauli(), bases_in[1].dim_pauli());
    let (po0, po1) = (bases_out[0].dim_pauli(), bases_out[1].dim_pauli());

    let mut images = Vec::with_capacity(pi0 * pi1);
    for z in bases_in[0].vectors().axis_iter(Axis(0)) {
        for w in bases_in[1].vectors().axis_iter(Axis(0)) {
            let element = kron(&z, &w);
            let mut image = Array2::<Complex64>::zeros((n, n));
            for k in &flat {
                image = image + k.dot(&element).dot(&dagger(&k.view()));
            }
            images.push(image);
        }
    }

    let mut outs = Vec::with_capacity(po0 * po1);
    for x in bases_out[0].vectors().axis_iter(Axis(0)) {
        for y in bases_out[1].vectors().axis_iter(Axis(0)) {
            outs.push(kron(&x, &y));
        }
    }

    let result = Array4::from_shape_fn((po0, po1, pi0, pi1), |(x, y, z, w)| {
        trace_product(&outs[x * po1 + y].view(), &images[z * pi1 + w].view())
    });
    real_part(&result, "two-subsystem Kraus channel")
}

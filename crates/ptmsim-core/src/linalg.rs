//! Small dense linear-algebra helpers shared by the basis and PTM code.
//!
//! Everything here works on `ndarray` arrays of `Complex64` or `f64`. The
//! matrices involved are tiny (Hilbert dimension rarely exceeds 3 per
//! subsystem), so clarity wins over blocking or BLAS.

use ndarray::{Array, Array2, Array4, ArrayView2, Dimension};
use num_complex::Complex64;
use tracing::trace;

use crate::error::{PtmError, PtmResult};

/// Absolute tolerance on the imaginary part of a matrix that must be real.
pub const IMAG_TOLERANCE: f64 = 1e-8;

/// Conjugate transpose.
pub fn dagger(m: &ArrayView2<'_, Complex64>) -> Array2<Complex64> {
    m.t().mapv(|z| z.conj())
}

/// `Tr(a · b)` without forming the product.
pub fn trace_product(a: &ArrayView2<'_, Complex64>, b: &ArrayView2<'_, Complex64>) -> Complex64 {
    let n = a.nrows();
    let mut acc = Complex64::new(0.0, 0.0);
    for i in 0..n {
        for j in 0..a.ncols() {
            acc += a[[i, j]] * b[[j, i]];
        }
    }
    acc
}

/// Kronecker product of two square matrices.
pub fn kron(a: &ArrayView2<'_, Complex64>, b: &ArrayView2<'_, Complex64>) -> Array2<Complex64> {
    let (ar, ac) = a.dim();
    let (br, bc) = b.dim();
    let mut out = Array2::zeros((ar * br, ac * bc));
    for ((i, j), &x) in a.indexed_iter() {
        if x == Complex64::new(0.0, 0.0) {
            continue;
        }
        for ((k, l), &y) in b.indexed_iter() {
            out[[i * br + k, j * bc + l]] = x * y;
        }
    }
    out
}

/// Return the real part of `arr`, failing if any imaginary part exceeds
/// [`IMAG_TOLERANCE`].
pub fn real_part<D: Dimension>(
    arr: &Array<Complex64, D>,
    context: &'static str,
) -> PtmResult<Array<f64, D>> {
    let max_imag = arr.iter().fold(0.0_f64, |m, z| m.max(z.im.abs()));
    if max_imag > IMAG_TOLERANCE {
        return Err(PtmError::NonRealMatrix { context, max_imag });
    }
    Ok(arr.mapv(|z| z.re))
}

/// Check that `m` is square, naming the construction in the error.
pub fn ensure_square<T>(m: &Array2<T>, context: &'static str) -> PtmResult<usize> {
    let (rows, cols) = m.dim();
    if rows != cols {
        return Err(PtmError::NonSquareMatrix {
            context,
            rows,
            cols,
        });
    }
    Ok(rows)
}

/// Matrix exponential of a real square matrix.
///
/// Scaling and squaring around a truncated Taylor series: the matrix is
/// scaled by `2^-s` until its 1-norm is below one half, the series is summed
/// until the terms stop contributing, and the result is squared `s` times.
pub fn expm(a: &Array2<f64>) -> PtmResult<Array2<f64>> {
    let n = ensure_square(a, "matrix exponential")?;
    let norm = (0..n)
        .map(|j| a.column(j).iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0_f64, f64::max);

    let mut squarings = 0_u32;
    let mut scale = 1.0_f64;
    while norm * scale > 0.5 {
        scale *= 0.5;
        squarings += 1;
    }
    let scaled = a * scale;

    let mut result = Array2::<f64>::eye(n);
    let mut term = Array2::<f64>::eye(n);
    let mut terms = 0_u32;
    for k in 1..=40 {
        term = term.dot(&scaled) / f64::from(k);
        result = result + &term;
        terms = k;
        if term.iter().all(|x| x.abs() < 1e-18) {
            break;
        }
    }
    trace!(n, norm, squarings, terms, "Matrix exponential");

    for _ in 0..squarings {
        result = result.dot(&result);
    }
    Ok(result)
}

/// Multiply `t` along `axis` by `m`: `out[.., k, ..] = Σ_j m[k, j] · t[.., j, ..]`.
pub fn mode_product(t: &Array4<f64>, m: &ArrayView2<'_, f64>, axis: usize) -> Array4<f64> {
    debug_assert_eq!(m.ncols(), t.shape()[axis]);
    let mut shape = [t.shape()[0], t.shape()[1], t.shape()[2], t.shape()[3]];
    shape[axis] = m.nrows();
    let mut out = Array4::<f64>::zeros(shape);
    for ((a, b, c, d), v) in out.indexed_iter_mut() {
        let mut idx = [a, b, c, d];
        let k = idx[axis];
        let mut acc = 0.0;
        for j in 0..m.ncols() {
            idx[axis] = j;
            acc += m[[k, j]] * t[idx];
        }
        *v = acc;
    }
    out
}

/// Compose two four-index superoperators: `out[a,b,c,d] = Σ_ef lhs[a,b,e,f] · rhs[e,f,c,d]`.
pub fn compose4(lhs: &Array4<f64>, rhs: &Array4<f64>) -> Array4<f64> {
    let (a0, a1, e0, e1) = lhs.dim();
    let (_, _, c0, c1) = rhs.dim();
    debug_assert_eq!((e0, e1), (rhs.dim().0, rhs.dim().1));
    let mut out = Array4::<f64>::zeros((a0, a1, c0, c1));
    for ((a, b, c, d), v) in out.indexed_iter_mut() {
        let mut acc = 0.0;
        for e in 0..e0 {
            for f in 0..e1 {
                acc += lhs[[a, b, e, f]] * rhs[[e, f, c, d]];
            }
        }
        *v = acc;
    }
    out
}

/// The identity superoperator on two subsystems of Pauli dimensions `p0`, `p1`.
pub fn identity4(p0: usize, p1: usize) -> Array4<f64> {
    let mut out = Array4::<f64>::zeros((p0, p1, p0, p1));
    for a in 0..p0 {
        for b in 0..p1 {
            out[[a, b, a, b]] = 1.0;
        }
    }
    out
}

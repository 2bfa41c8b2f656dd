//! Standard qubit channels and Kraus conversions.
//!
//! Constructors return basis-agnostic [`Ptm`] / [`TwoPtm`] values; render
//! them with `get_matrix` in whatever basis the state uses. Channels that
//! are naturally written as a matrix in the `I, X, Y, Z` basis are returned
//! as [`Ptm::Explicit`] in [`PauliBasis::standard_pauli`].

use std::f64::consts::FRAC_1_SQRT_2;

use ndarray::{array, s, Array2, Array4};
use num_complex::Complex64;

use crate::basis::PauliBasis;
use crate::error::{PtmError, PtmResult};
use crate::ptm::{OutputBasis, Ptm};
use crate::two::{OutputBases, TwoPtm};

fn c(re: f64) -> Complex64 {
    Complex64::new(re, 0.0)
}

fn probability(name: &'static str, value: f64) -> PtmResult<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(PtmError::InvalidParameter { name, value })
    }
}

fn pauli_x() -> Array2<Complex64> {
    array![[c(0.0), c(1.0)], [c(1.0), c(0.0)]]
}

fn pauli_y() -> Array2<Complex64> {
    let i = Complex64::new(0.0, 1.0);
    array![[c(0.0), -i], [i, c(0.0)]]
}

fn pauli_z() -> Array2<Complex64> {
    array![[c(1.0), c(0.0)], [c(0.0), c(-1.0)]]
}

// ----------------------------------------------------------------------------
// Kraus conversions
// ----------------------------------------------------------------------------

/// PTM of conjugation by one Kraus operator, in `basis`.
pub fn single_kraus_to_ptm(kraus: &Array2<Complex64>, basis: &PauliBasis) -> PtmResult<Array2<f64>> {
    Ptm::conjunction(kraus.clone())?.get_matrix(basis, OutputBasis::SameAsInput)
}

/// Two-subsystem PTM of conjugation by one `(d0·d1)²` Kraus operator.
pub fn double_kraus_to_ptm(
    kraus: &Array2<Complex64>,
    bases: [&PauliBasis; 2],
) -> PtmResult<Array4<f64>> {
    TwoPtm::from_matrix(kraus, [bases[0].dim_hilbert(), bases[1].dim_hilbert()])?
        .get_matrix(bases, OutputBases::SameAsInput)
}

/// `ρ ↦ Σ_k K_k ρ K_k†`.
pub fn kraus_channel(operators: Vec<Array2<Complex64>>) -> PtmResult<Ptm> {
    let terms = operators
        .into_iter()
        .map(|k| Ok((Ptm::conjunction(k)?, 1.0)))
        .collect::<PtmResult<Vec<_>>>()?;
    Ptm::linear_combination(terms)
}

// ----------------------------------------------------------------------------
// Unitaries
// ----------------------------------------------------------------------------

/// Hadamard gate.
pub fn hadamard() -> Ptm {
    let h = FRAC_1_SQRT_2;
    Ptm::Conjunction(array![[c(h), c(h)], [c(h), c(-h)]])
}

/// Rotation about the x axis of the Bloch sphere.
pub fn rotate_x(angle: f64) -> Ptm {
    let (s, co) = ((angle / 2.0).sin(), (angle / 2.0).cos());
    let mi = Complex64::new(0.0, -s);
    Ptm::Conjunction(array![[c(co), mi], [mi, c(co)]])
}

/// Rotation about the y axis of the Bloch sphere.
pub fn rotate_y(angle: f64) -> Ptm {
    let (s, co) = ((angle / 2.0).sin(), (angle / 2.0).cos());
    Ptm::Conjunction(array![[c(co), c(-s)], [c(s), c(co)]])
}

/// Rotation about the z axis of the Bloch sphere.
pub fn rotate_z(angle: f64) -> Ptm {
    let z = Complex64::from_polar(1.0, -angle / 2.0);
    Ptm::Conjunction(array![[z, c(0.0)], [c(0.0), z.conj()]])
}

/// Controlled phase `diag(1, 1, 1, e^{iφ})` on two qubits.
pub fn cphase(angle: f64) -> TwoPtm {
    let mut u = Array4::<Complex64>::zeros((2, 2, 2, 2));
    for a in 0..2 {
        for b in 0..2 {
            u[[a, b, a, b]] = c(1.0);
        }
    }
    u[[1, 1, 1, 1]] = Complex64::from_polar(1.0, angle);
    TwoPtm::Kraus(vec![u])
}

// ----------------------------------------------------------------------------
// Damping
// ----------------------------------------------------------------------------

/// Amplitude damping: `|1⟩` relaxes to `|0⟩` with probability `gamma`.
pub fn amplitude_damping(gamma: f64) -> PtmResult<Ptm> {
    let gamma = probability("gamma", gamma)?;
    kraus_channel(vec![
        array![[c(1.0), c(0.0)], [c(0.0), c((1.0 - gamma).sqrt())]],
        array![[c(0.0), c(gamma.sqrt())], [c(0.0), c(0.0)]],
    ])
}

/// Phase damping with parameter `lambda`.
pub fn phase_damping(lambda: f64) -> PtmResult<Ptm> {
    let lambda = probability("lambda", lambda)?;
    kraus_channel(vec![
        array![[c(1.0), c(0.0)], [c(0.0), c((1.0 - lambda).sqrt())]],
        array![[c(0.0), c(0.0)], [c(0.0), c(lambda.sqrt())]],
    ])
}

/// Amplitude damping followed by phase damping.
pub fn amp_ph_damping(gamma: f64, lambda: f64) -> PtmResult<Ptm> {
    Ok(phase_damping(lambda)? * amplitude_damping(gamma)?)
}

/// Amplitude damping with relaxation rate `gamma_down` and excitation rate
/// `gamma_up`; their sum must not exceed one.
pub fn generalized_amplitude_damping(gamma_down: f64, gamma_up: f64) -> PtmResult<Ptm> {
    probability("gamma_down", gamma_down)?;
    probability("gamma_up", gamma_up)?;
    let gamma = probability("gamma_down + gamma_up", gamma_down + gamma_up)?;
    if gamma == 0.0 {
        return Ok(Ptm::identity(2));
    }
    let p = gamma_down / gamma;
    let shrink = (1.0 - gamma).sqrt();
    let matrix = array![
        [1.0, 0.0, 0.0, 0.0],
        [0.0, shrink, 0.0, 0.0],
        [0.0, 0.0, shrink, 0.0],
        [(2.0 * p - 1.0) * gamma, 0.0, 0.0, 1.0 - gamma],
    ];
    Ptm::explicit(matrix, PauliBasis::standard_pauli())
}

// ----------------------------------------------------------------------------
// Pauli channels
// ----------------------------------------------------------------------------

/// Shrinks the Bloch sphere by `1 - px`, `1 - py`, `1 - pz` along its axes.
pub fn dephasing(px: f64, py: f64, pz: f64) -> PtmResult<Ptm> {
    let diag = array![
        1.0,
        1.0 - probability("px", px)?,
        1.0 - probability("py", py)?,
        1.0 - probability("pz", pz)?
    ];
    Ptm::explicit(Array2::from_diag(&diag), PauliBasis::standard_pauli())
}

fn pauli_flip(p: f64, pauli: Array2<Complex64>) -> PtmResult<Ptm> {
    let p = probability("p", p)?;
    kraus_channel(vec![
        Array2::<Complex64>::eye(2).mapv(|z| z * (1.0 - p).sqrt()),
        pauli.mapv(|z| z * p.sqrt()),
    ])
}

/// Applies `X` with probability `p`.
pub fn bit_flip(p: f64) -> PtmResult<Ptm> {
    pauli_flip(p, pauli_x())
}

/// Applies `Z` with probability `p`.
pub fn phase_flip(p: f64) -> PtmResult<Ptm> {
    pauli_flip(p, pauli_z())
}

/// Replaces the state by the maximally mixed state with probability `p`.
pub fn depolarizing(p: f64) -> PtmResult<Ptm> {
    let p = probability("p", p)?;
    let keep = (1.0 - 0.75 * p).sqrt();
    let flip = (p / 4.0).sqrt();
    kraus_channel(vec![
        Array2::<Complex64>::eye(2).mapv(|z| z * keep),
        pauli_x().mapv(|z| z * flip),
        pauli_y().mapv(|z| z * flip),
        pauli_z().mapv(|z| z * flip),
    ])
}

// ----------------------------------------------------------------------------
// Representation changes
// ----------------------------------------------------------------------------

/// Convert a qubit PTM from the `I, X, Y, Z` basis to the `0, X, Y, 1` basis.
///
/// Accepts a full 4×4 matrix whose first row is `(1, 0, 0, 0)`, a 3×4
/// matrix with that row omitted, or a 3×3 matrix where the first column is
/// also assumed to be `(1, 0, 0, 0)` (a unital channel).
pub fn to_0xy1_basis(ptm: &Array2<f64>) -> PtmResult<Array2<f64>> {
    let full = match ptm.dim() {
        (4, 4) => ptm.clone(),
        (3, 4) => {
            let mut full = Array2::<f64>::zeros((4, 4));
            full[[0, 0]] = 1.0;
            full.slice_mut(s![1.., ..]).assign(ptm);
            full
        }
        (3, 3) => {
            let mut full = Array2::<f64>::zeros((4, 4));
            full[[0, 0]] = 1.0;
            full.slice_mut(s![1.., 1..]).assign(ptm);
            full
        }
        _ => {
            return Err(PtmError::ShapeMismatch {
                context: "single-qubit PTM in IXYZ basis",
                expected: vec![4, 4],
                got: ptm.shape().to_vec(),
            });
        }
    };

    let deviation = full
        .row(0)
        .iter()
        .zip([1.0, 0.0, 0.0, 0.0])
        .fold(0.0_f64, |m, (a, b)| m.max((a - b).abs()));
    if deviation > 1e-8 {
        return Err(PtmError::InvalidParameter {
            name: "first row deviation from (1, 0, 0, 0)",
            value: deviation,
        });
    }

    let restricted = PauliBasis::restricted_qubit();
    Ptm::explicit(full, PauliBasis::standard_pauli())?
        .get_matrix(&restricted, OutputBasis::SameAsInput)
}

/// Convert a 4×4 qubit PTM from the `0, X, Y, 1` basis to the `I, X, Y, Z` basis.
pub fn to_ixyz_basis(ptm: &Array2<f64>) -> PtmResult<Array2<f64>> {
    let pauli = PauliBasis::standard_pauli();
    Ptm::explicit(ptm.clone(), PauliBasis::restricted_qubit())?
        .get_matrix(&pauli, OutputBasis::SameAsInput)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn assert_close(a: &Array2<f64>, b: &Array2<f64>) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-10, "{a}\n!=\n{b}");
        }
    }

    fn in_pauli(ptm: &Ptm) -> Array2<f64> {
        ptm.get_matrix(&PauliBasis::standard_pauli(), OutputBasis::SameAsInput)
            .unwrap()
    }

    #[test]
    fn test_hadamard_is_involution() {
        let hh = hadamard() * hadamard();
        assert_close(&in_pauli(&hh), &Array2::eye(4));
    }

    #[test]
    fn test_rotation_by_pi_matches_pauli_conjugation() {
        assert_close(
            &in_pauli(&rotate_x(PI)),
            &Array2::from_diag(&array![1.0, 1.0, -1.0, -1.0]),
        );
        assert_close(
            &in_pauli(&rotate_y(PI)),
            &Array2::from_diag(&array![1.0, -1.0, 1.0, -1.0]),
        );
        assert_close(
            &in_pauli(&rotate_z(PI)),
            &Array2::from_diag(&array![1.0, -1.0, -1.0, 1.0]),
        );
    }

    #[test]
    fn test_generalized_damping_without_excitation() {
        let gamma = 0.3;
        assert_close(
            &in_pauli(&generalized_amplitude_damping(gamma, 0.0).unwrap()),
            &in_pauli(&amplitude_damping(gamma).unwrap()),
        );
        assert_close(
            &in_pauli(&generalized_amplitude_damping(0.0, 0.0).unwrap()),
            &Array2::eye(4),
        );
    }

    #[test]
    fn test_depolarizing_shrinks_bloch_vector() {
        let p = 0.4;
        let expected = Array2::from_diag(&array![1.0, 1.0 - p, 1.0 - p, 1.0 - p]);
        assert_close(&in_pauli(&depolarizing(p).unwrap()), &expected);
    }

    #[test]
    fn test_bit_flip() {
        let p = 0.25;
        let expected = Array2::from_diag(&array![1.0, 1.0, 1.0 - 2.0 * p, 1.0 - 2.0 * p]);
        assert_close(&in_pauli(&bit_flip(p).unwrap()), &expected);
        assert!(matches!(
            bit_flip(1.5),
            Err(PtmError::InvalidParameter { name: "p", .. })
        ));
    }

    #[test]
    fn test_amp_ph_damping_is_trace_preserving() {
        let basis = PauliBasis::general(2);
        let m = amp_ph_damping(0.2, 0.1)
            .unwrap()
            .get_matrix(&basis, OutputBasis::SameAsInput)
            .unwrap();
        for y in 0..4 {
            let trace_out = m[[0, y]] + m[[1, y]];
            let trace_in = if y < 2 { 1.0 } else { 0.0 };
            assert!((trace_out - trace_in).abs() < 1e-12);
        }
    }

    #[test]
    fn test_representation_round_trip() {
        let ixyz = in_pauli(&amp_ph_damping(0.3, 0.2).unwrap());
        let restricted = to_0xy1_basis(&ixyz).unwrap();
        assert_close(&to_ixyz_basis(&restricted).unwrap(), &ixyz);
    }

    #[test]
    fn test_to_0xy1_accepts_short_forms() {
        let identity = to_0xy1_basis(&Array2::eye(3)).unwrap();
        assert_close(&identity, &Array2::eye(4));

        let mut short = Array2::<f64>::zeros((3, 4));
        short.slice_mut(s![.., 1..]).assign(&Array2::eye(3));
        assert_close(&to_0xy1_basis(&short).unwrap(), &Array2::eye(4));

        assert!(to_0xy1_basis(&Array2::zeros((4, 4))).is_err());
    }

    #[test]
    fn test_double_kraus_cnot_shape() {
        let mut cnot = Array2::<Complex64>::zeros((4, 4));
        for (r, col) in [(0, 0), (1, 1), (2, 3), (3, 2)] {
            cnot[[r, col]] = c(1.0);
        }
        let b = PauliBasis::general(2);
        let m = double_kraus_to_ptm(&cnot, [&b, &b]).unwrap();
        assert_eq!(m.dim(), (4, 4, 4, 4));
        // |10><10| maps to |11><11|
        assert!((m[[1, 1, 1, 0]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cphase_pi_in_pauli_basis() {
        let pauli = PauliBasis::standard_pauli();
        let m = cphase(PI)
            .get_matrix([&pauli, &pauli], OutputBases::SameAsInput)
            .unwrap();
        // X ⊗ I -> X ⊗ Z
        assert!((m[[1, 3, 1, 0]] - 1.0).abs() < 1e-12);
    }
}

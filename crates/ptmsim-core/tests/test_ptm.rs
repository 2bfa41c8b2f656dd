//! Tests for the PTM algebra, including property tests.

use std::f64::consts::PI;

use ndarray::{array, Array2};
use num_complex::Complex64;
use proptest::prelude::*;
use ptmsim_core::channels::{self, cphase, hadamard, rotate_x, rotate_y, rotate_z};
use ptmsim_core::{OutputBasis, OutputBases, PauliBasis, Ptm, PtmError, TwoPtm};

fn close(a: &Array2<f64>, b: &Array2<f64>, tol: f64) -> bool {
    a.dim() == b.dim() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < tol)
}

/// Output trace of each input basis element, from the rows aligned with
/// computational states.
fn column_traces(m: &Array2<f64>, basis: &PauliBasis) -> Vec<f64> {
    let rows = basis.classical_indices();
    (0..m.ncols())
        .map(|y| rows.iter().map(|&x| m[[x, y]]).sum())
        .collect()
}

fn input_traces(basis: &PauliBasis) -> Vec<f64> {
    (0..basis.dim_pauli())
        .map(|x| basis.vector(x).diag().iter().map(|z| z.re).sum())
        .collect()
}

fn random_unitary(a: f64, b: f64, c: f64) -> Ptm {
    rotate_z(a) * rotate_y(b) * rotate_z(c)
}

// ---------------------------------------------------------------------------
// Algebra
// ---------------------------------------------------------------------------

#[test]
fn operators_flatten_into_one_level() {
    let p = hadamard() + rotate_x(0.1) + rotate_y(0.2);
    let Ptm::LinearCombination(terms) = &p else {
        panic!("expected a linear combination");
    };
    assert_eq!(terms.len(), 3);

    let q = hadamard() * rotate_x(0.1) * rotate_y(0.2);
    let Ptm::Product(factors) = &q else {
        panic!("expected a product");
    };
    assert_eq!(factors.len(), 3);
}

#[test]
fn scalar_multiplication_distributes() {
    let basis = PauliBasis::general(2);
    let p = 2.0 * (hadamard() + rotate_x(0.3));
    let m = p.get_matrix(&basis, OutputBasis::SameAsInput).unwrap();
    let mh = hadamard().get_matrix(&basis, OutputBasis::SameAsInput).unwrap();
    let mx = rotate_x(0.3).get_matrix(&basis, OutputBasis::SameAsInput).unwrap();
    assert!(close(&m, &((mh + mx) * 2.0), 1e-12));
}

#[test]
fn product_evaluates_factors_in_the_full_basis() {
    // Composing already-truncated matrices would lose the coherence that the
    // second Hadamard turns back into population.
    let basis = PauliBasis::general(2);
    let classical = basis.get_classical_subbasis().unwrap();
    let hh = hadamard() * hadamard();
    let m = hh.get_matrix(&classical, OutputBasis::SameAsInput).unwrap();
    assert!(close(&m, &Array2::eye(2), 1e-12));
}

#[test]
fn qutrit_leakage_channel() {
    // Decay from |2> into |1>, then a qubit rotation embedded in three levels.
    let decay = array![
        [Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)],
        [Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0), Complex64::new(0.3, 0.0)],
        [Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)]
    ];
    let channel = rotate_x(PI / 2.0).embed_hilbert(3, None).unwrap()
        * Ptm::integrated(Ptm::lindblad(decay).unwrap()).unwrap();

    let basis = PauliBasis::general(3);
    let m = channel.get_matrix(&basis, OutputBasis::SameAsInput).unwrap();
    let traces = column_traces(&m, &basis);
    for (got, want) in traces.iter().zip(input_traces(&basis)) {
        assert!((got - want).abs() < 1e-10);
    }
}

#[test]
fn mismatched_factors_fail_before_evaluation() {
    let p = Ptm::product(vec![hadamard(), Ptm::identity(3)]);
    assert!(matches!(p, Err(PtmError::DimensionMismatch { .. })));

    let unchecked = hadamard() * Ptm::identity(3);
    let basis = PauliBasis::general(2);
    assert!(unchecked.get_matrix(&basis, OutputBasis::SameAsInput).is_err());
}

#[test]
fn non_hermitian_hamiltonian_is_rejected() {
    let h = array![
        [Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)],
        [Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)]
    ];
    let basis = PauliBasis::general(2);
    assert!(matches!(
        Ptm::adjunction(h)
            .unwrap()
            .get_matrix(&basis, OutputBasis::SameAsInput),
        Err(PtmError::NonRealMatrix { .. })
    ));
}

// ---------------------------------------------------------------------------
// Two-subsystem
// ---------------------------------------------------------------------------

#[test]
fn cphase_product_with_single_factors() {
    let b = PauliBasis::general(2);
    let product = TwoPtm::product()
        .then_single(0, hadamard())
        .then_single(1, hadamard())
        .then_two(false, cphase(PI));
    let m = product.get_matrix([&b, &b], OutputBases::SameAsInput).unwrap();
    assert_eq!(m.dim(), (4, 4, 4, 4));

    // Ground state in, look at the |0><0| ⊗ |0><0| output coordinate.
    assert!((m[[0, 0, 0, 0]] - 0.25).abs() < 1e-12);
}

#[test]
fn two_subsystem_rectangular_output() {
    let b = PauliBasis::general(2);
    let c = b.get_classical_subbasis().unwrap();
    let m = cphase(PI / 2.0)
        .get_matrix([&b, &b], OutputBases::Explicit([&c, &b]))
        .unwrap();
    assert_eq!(m.dim(), (2, 4, 4, 4));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn unitary_channels_preserve_trace(a in -PI..PI, b in -PI..PI, c in -PI..PI) {
        for basis in [PauliBasis::general(2), PauliBasis::restricted_qubit()] {
            let m = random_unitary(a, b, c)
                .get_matrix(&basis, OutputBasis::SameAsInput)
                .unwrap();
            let traces = column_traces(&m, &basis);
            for (got, want) in traces.iter().zip(input_traces(&basis)) {
                prop_assert!((got - want).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn damping_channels_preserve_trace(gamma in 0.0..1.0_f64, lambda in 0.0..1.0_f64) {
        let basis = PauliBasis::general(2);
        let m = channels::amp_ph_damping(gamma, lambda)
            .unwrap()
            .get_matrix(&basis, OutputBasis::SameAsInput)
            .unwrap();
        let traces = column_traces(&m, &basis);
        for (got, want) in traces.iter().zip(input_traces(&basis)) {
            prop_assert!((got - want).abs() < 1e-10);
        }
    }

    #[test]
    fn composition_is_associative(
        a in -PI..PI,
        b in -PI..PI,
        gamma in 0.0..1.0_f64,
    ) {
        let basis = PauliBasis::general(2);
        let p = rotate_x(a);
        let q = channels::amplitude_damping(gamma).unwrap();
        let r = rotate_y(b);

        let left = Ptm::Product(vec![Ptm::Product(vec![p.clone(), q.clone()]), r.clone()]);
        let right = Ptm::Product(vec![p, Ptm::Product(vec![q, r])]);
        let ml = left.get_matrix(&basis, OutputBasis::SameAsInput).unwrap();
        let mr = right.get_matrix(&basis, OutputBasis::SameAsInput).unwrap();
        prop_assert!(close(&ml, &mr, 1e-10));
    }

    #[test]
    fn basis_round_trip_is_identity(a in -PI..PI, b in -PI..PI, c in -PI..PI) {
        let general = PauliBasis::general(2);
        let pauli = PauliBasis::standard_pauli();
        let m = random_unitary(a, b, c)
            .get_matrix(&general, OutputBasis::SameAsInput)
            .unwrap();
        let there = Ptm::explicit(m.clone(), general.clone())
            .unwrap()
            .get_matrix(&pauli, OutputBasis::SameAsInput)
            .unwrap();
        let back = Ptm::explicit(there, pauli)
            .unwrap()
            .get_matrix(&general, OutputBasis::SameAsInput)
            .unwrap();
        prop_assert!(close(&m, &back, 1e-10));
    }
}

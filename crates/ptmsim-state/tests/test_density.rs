//! Integration tests for the density tensor engine.

use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::{Array2, IxDyn};
use num_complex::Complex64;
use proptest::prelude::*;
use ptmsim_core::channels::{self, cphase, hadamard, rotate_x, rotate_y, rotate_z};
use ptmsim_core::{OutputBasis, PauliBasis, TwoPtm};
use ptmsim_state::{DensityTensor, StateConfig, StateError};

fn qubits(n: usize) -> Vec<Arc<PauliBasis>> {
    (0..n).map(|_| PauliBasis::general(2)).collect()
}

fn cnot() -> TwoPtm {
    let one = Complex64::new(1.0, 0.0);
    let zero = Complex64::new(0.0, 0.0);
    let mut u = Array2::from_elem((4, 4), zero);
    u[[0, 0]] = one;
    u[[1, 1]] = one;
    u[[2, 3]] = one;
    u[[3, 2]] = one;
    TwoPtm::from_matrix(&u, [2, 2]).unwrap()
}

fn assert_close(got: &[f64], want: &[f64]) {
    assert_eq!(got.len(), want.len(), "{got:?} vs {want:?}");
    for (g, w) in got.iter().zip(want) {
        assert!((g - w).abs() < 1e-8, "{got:?} vs {want:?}");
    }
}

// ---------------------------------------------------------------------------
// Initialisation
// ---------------------------------------------------------------------------

#[test]
fn ground_state_diagonal() {
    let bases = vec![
        PauliBasis::general(2),
        PauliBasis::general(3),
        PauliBasis::restricted_qubit(),
    ];
    let mut state = DensityTensor::new(bases).unwrap();
    let diag = state.diagonal().unwrap();
    assert_eq!(diag.shape(), &[2, 3, 2]);
    for (index, value) in diag.indexed_iter() {
        let expected = if index == IxDyn(&[0, 0, 0]) { 1.0 } else { 0.0 };
        assert_eq!(*value, expected);
    }
    assert!((state.trace() - 1.0).abs() < 1e-12);
}

#[test]
fn from_array_round_trips() {
    let mut state = DensityTensor::new(qubits(2)).unwrap();
    state.apply_ptm(&hadamard(), 1).unwrap();
    let data = state.to_array().unwrap();
    let copy = DensityTensor::from_array(state.bases().to_vec(), data.clone()).unwrap();
    assert_eq!(copy.to_array().unwrap(), data);
}

// ---------------------------------------------------------------------------
// Single-subsystem operations
// ---------------------------------------------------------------------------

#[test]
fn hadamard_then_measure() {
    let mut state = DensityTensor::new(qubits(1)).unwrap();
    state.apply_ptm(&hadamard(), 0).unwrap();
    assert_close(&state.partial_trace(0).unwrap(), &[0.5, 0.5]);

    let rho = state.to_density_matrix();
    for v in rho.iter() {
        assert!((v.re - 0.5).abs() < 1e-10 && v.im.abs() < 1e-10);
    }
}

#[test]
fn truncated_output_basis() {
    let basis = PauliBasis::general(2);
    let classical = basis.get_classical_subbasis().unwrap();
    let damping = channels::amplitude_damping(0.3).unwrap();

    let mut state = DensityTensor::new(vec![Arc::clone(&basis)]).unwrap();
    state.apply_ptm(&rotate_x(PI), 0).unwrap();
    let m = damping
        .get_matrix(&basis, OutputBasis::from(&classical))
        .unwrap();
    state.apply_single_ptm(0, m.view(), Some(classical)).unwrap();

    assert_eq!(state.shape(), &[2]);
    assert_close(&state.partial_trace(0).unwrap(), &[0.3, 0.7]);
    assert!((state.trace() - 1.0).abs() < 1e-10);
}

#[test]
fn leakage_level_untouched_by_embedded_gate() {
    let mut state = DensityTensor::new(vec![PauliBasis::general(3)]).unwrap();
    let gate = hadamard().embed_hilbert(3, None).unwrap();
    state.apply_ptm(&gate, 0).unwrap();
    assert_close(&state.partial_trace(0).unwrap(), &[0.5, 0.5, 0.0]);
}

// ---------------------------------------------------------------------------
// Two-subsystem operations
// ---------------------------------------------------------------------------

#[test]
fn cphase_on_plus_states() {
    let mut state = DensityTensor::new(qubits(2)).unwrap();
    state.apply_ptm(&hadamard(), 0).unwrap();
    state.apply_ptm(&hadamard(), 1).unwrap();
    state.apply_two_ptm_op(&cphase(PI), 0, 1).unwrap();
    assert_close(&state.partial_trace(1).unwrap(), &[0.5, 0.5]);

    // H·CZ·H on the target is a CNOT: the result is a Bell state.
    state.apply_ptm(&hadamard(), 1).unwrap();
    let diag = state.diagonal().unwrap();
    assert_close(diag.as_slice().unwrap(), &[0.5, 0.0, 0.0, 0.5]);
}

#[test]
fn swapped_arguments_address_the_right_axes() {
    // |0⟩|1⟩, then CNOT with subsystem 1 as control.
    let mut state = DensityTensor::new(qubits(2)).unwrap();
    state.apply_ptm(&rotate_x(PI), 1).unwrap();
    state.apply_two_ptm_op(&cnot(), 1, 0).unwrap();
    let diag = state.diagonal().unwrap();
    assert_close(diag.as_slice().unwrap(), &[0.0, 0.0, 0.0, 1.0]);

    // Same control/target written the other way round leaves |0⟩|1⟩ alone.
    let mut other = DensityTensor::new(qubits(2)).unwrap();
    other.apply_ptm(&rotate_x(PI), 1).unwrap();
    other.apply_two_ptm_op(&cnot(), 0, 1).unwrap();
    let diag = other.diagonal().unwrap();
    assert_close(diag.as_slice().unwrap(), &[0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn non_adjacent_pair_with_spectator() {
    let mut state = DensityTensor::new(qubits(3)).unwrap();
    state.apply_ptm(&rotate_x(PI), 0).unwrap();
    state.apply_two_ptm_op(&cnot(), 0, 2).unwrap();
    assert_close(&state.partial_trace(0).unwrap(), &[0.0, 1.0]);
    assert_close(&state.partial_trace(1).unwrap(), &[1.0, 0.0]);
    assert_close(&state.partial_trace(2).unwrap(), &[0.0, 1.0]);
}

// ---------------------------------------------------------------------------
// Projection and subsystem management
// ---------------------------------------------------------------------------

#[test]
fn project_then_trace() {
    let mut state = DensityTensor::new(qubits(1)).unwrap();
    state.project(0, 0).unwrap();
    assert!((state.trace() - 1.0).abs() < 1e-12);
    assert_eq!(state.bases()[0].dim_pauli(), 1);
    assert_eq!(state.shape(), &[1]);
}

#[test]
fn project_and_renormalize() {
    let mut state = DensityTensor::new(qubits(2)).unwrap();
    state.apply_ptm(&hadamard(), 0).unwrap();
    state.project(0, 1).unwrap();
    let trace = state.renormalize();
    assert!((trace - 0.5).abs() < 1e-10);
    assert!((state.trace() - 1.0).abs() < 1e-10);
    assert_close(&state.partial_trace(0).unwrap(), &[1.0]);
}

#[test]
fn renormalize_degenerate_state_is_left_alone() {
    let mut state = DensityTensor::new(qubits(1)).unwrap();
    state.project(0, 1).unwrap();
    let before = state.to_array().unwrap();
    assert_eq!(state.renormalize(), 0.0);
    assert_eq!(state.to_array().unwrap(), before);
}

#[test]
fn add_subsystem_prepends_axis() {
    let mut state = DensityTensor::new(qubits(1)).unwrap();
    state.add_subsystem(PauliBasis::general(3), 2).unwrap();
    assert_eq!(state.n_subsystems(), 2);
    assert_eq!(state.shape(), &[9, 4]);
    assert_close(&state.partial_trace(0).unwrap(), &[0.0, 0.0, 1.0]);
    assert_close(&state.partial_trace(1).unwrap(), &[1.0, 0.0]);
}

#[test]
fn unrepresentable_outcome_is_rejected() {
    let mut state = DensityTensor::new(qubits(1)).unwrap();
    assert!(matches!(
        state.project(0, 2),
        Err(StateError::Ptm(ptmsim_core::PtmError::UnrepresentableState { .. }))
    ));
    assert_eq!(state.shape(), &[4]);
}

// ---------------------------------------------------------------------------
// Resource reuse
// ---------------------------------------------------------------------------

#[test]
fn repeated_gate_hits_cache() {
    let mut state = DensityTensor::new(qubits(1)).unwrap();
    for _ in 0..4 {
        state.apply_ptm(&hadamard(), 0).unwrap();
    }
    let stats = state.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 3);
}

#[test]
fn lazy_projection_keeps_buffer() {
    let mut state = DensityTensor::new(qubits(2)).unwrap();
    state.project(0, 0).unwrap();
    assert_eq!(state.buffer_stats().reallocations, 0);

    let config = StateConfig {
        lazy_alloc: false,
        ..StateConfig::default()
    };
    let mut eager = DensityTensor::with_config(qubits(2), config).unwrap();
    eager.project(0, 0).unwrap();
    assert_eq!(eager.buffer_stats().reallocations, 1);
    assert_eq!(eager.buffer_stats().capacity[0], 4);
}

#[test]
fn growing_state_reallocates_once() {
    let mut state = DensityTensor::new(qubits(1)).unwrap();
    state.add_subsystem(PauliBasis::general(2), 0).unwrap();
    assert_eq!(state.buffer_stats().reallocations, 1);
    state.apply_ptm(&hadamard(), 0).unwrap();
    state.apply_ptm(&hadamard(), 1).unwrap();
    assert_eq!(state.buffer_stats().reallocations, 2);
    state.apply_ptm(&hadamard(), 0).unwrap();
    assert_eq!(state.buffer_stats().reallocations, 2);
}

#[test]
fn clone_is_independent() {
    let mut state = DensityTensor::new(qubits(1)).unwrap();
    let copy = state.clone();
    state.apply_ptm(&rotate_x(PI), 0).unwrap();
    assert!((copy.to_array().unwrap()[IxDyn(&[0])] - 1.0).abs() < 1e-12);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn unitary_sequences_preserve_trace(
        angles in proptest::collection::vec((-PI..PI, -PI..PI, -PI..PI), 1..6)
    ) {
        let mut state = DensityTensor::new(qubits(3)).unwrap();
        for (k, (a, b, c)) in angles.iter().enumerate() {
            let q = k % 3;
            state.apply_ptm(&(rotate_z(*a) * rotate_y(*b) * rotate_x(*c)), q).unwrap();
            prop_assert!((state.trace() - 1.0).abs() < 1e-8);
            state.apply_two_ptm_op(&cphase(*a), q, (q + 1) % 3).unwrap();
            prop_assert!((state.trace() - 1.0).abs() < 1e-8);
        }
        let total: f64 = state.diagonal().unwrap().sum();
        prop_assert!((total - 1.0).abs() < 1e-8);
    }
}

#![cfg(test)]

use num_complex::Complex64;

use super::backend::BlockBackend;
use super::block::BlockMatrix;
use super::dense::SqMatrix;
use super::eigensolver::spectrum::resolve_eigenvalues;
use super::eigensolver::{EigenOptions, LineSearchPolicy, TraceMinResult, minimize_trace};
use super::error::EigenError;
use super::operator::{BlockConstraint, BlockOperator, DiagonalOperator, ZeroRowConstraint};

// ============================================================================
// Test Backend
// ============================================================================

/// Naive serial kernels, sufficient for the small problems below.
#[derive(Clone, Copy, Default)]
struct TestBackend;

impl BlockBackend for TestBackend {
    type Block = BlockMatrix;

    fn alloc_block(&self, rows: usize, cols: usize) -> BlockMatrix {
        BlockMatrix::zeros(rows, cols)
    }

    fn xtx(&self, out: &mut SqMatrix, x: &BlockMatrix) {
        self.xty(out, x, x);
    }

    fn xty(&self, out: &mut SqMatrix, x: &BlockMatrix, y: &BlockMatrix) {
        for j in 0..x.cols() {
            for i in 0..x.cols() {
                let mut acc = Complex64::ZERO;
                for k in 0..x.rows() {
                    acc += x.get(k, i).conj() * y.get(k, j);
                }
                out.set(i, j, acc);
            }
        }
    }

    fn xe_ys(&self, x: &mut BlockMatrix, y: &BlockMatrix, s: &SqMatrix, _s_is_hermitian: bool) {
        for j in 0..x.cols() {
            for k in 0..x.rows() {
                let mut acc = Complex64::ZERO;
                for m in 0..x.cols() {
                    acc += y.get(k, m) * s.get(m, j);
                }
                x.set(k, j, acc);
            }
        }
    }

    fn xpa_ys(&self, x: &mut BlockMatrix, a: f64, y: &BlockMatrix, s: &SqMatrix) {
        for j in 0..x.cols() {
            for k in 0..x.rows() {
                let mut acc = Complex64::ZERO;
                for m in 0..x.cols() {
                    acc += y.get(k, m) * s.get(m, j);
                }
                let value = x.get(k, j) + a * acc;
                x.set(k, j, value);
            }
        }
    }

    fn axpby(&self, a: f64, x: &mut BlockMatrix, b: f64, y: &BlockMatrix) {
        for (dst, src) in x.as_mut_slice().iter_mut().zip(y.as_slice()) {
            *dst = a * *dst + b * src;
        }
    }

    fn trace_xty(&self, x: &BlockMatrix, y: &BlockMatrix) -> Complex64 {
        x.as_slice()
            .iter()
            .zip(y.as_slice())
            .map(|(a, b)| a.conj() * b)
            .sum()
    }

    fn scal(&self, a: f64, x: &mut BlockMatrix) {
        for value in x.as_mut_slice() {
            *value *= a;
        }
    }

    fn copy(&self, dst: &mut BlockMatrix, src: &BlockMatrix) {
        dst.as_mut_slice().copy_from_slice(src.as_slice());
    }
}

// ============================================================================
// Test Fixtures
// ============================================================================

/// The normalized all-ones starting vector (p = 1 only).
fn ones_block(n: usize) -> BlockMatrix {
    let mut y = BlockMatrix::zeros(n, 1);
    y.fill(Complex64::new(1.0 / (n as f64).sqrt(), 0.0));
    y
}

/// Modified Gram-Schmidt orthonormalization of a seeded block.
fn orthonormal_block(n: usize, p: usize, seed: u64) -> BlockMatrix {
    let mut y = BlockMatrix::seeded(n, p, seed);
    for j in 0..p {
        for i in 0..j {
            let mut proj = Complex64::ZERO;
            for k in 0..n {
                proj += y.get(k, i).conj() * y.get(k, j);
            }
            for k in 0..n {
                let value = y.get(k, j) - proj * y.get(k, i);
                y.set(k, j, value);
            }
        }
        let mut norm2 = 0.0;
        for k in 0..n {
            norm2 += y.get(k, j).norm_sqr();
        }
        let inv_norm = 1.0 / norm2.sqrt();
        for k in 0..n {
            let value = inv_norm * y.get(k, j);
            y.set(k, j, value);
        }
    }
    y
}

/// Y·Q for a 2-column block and a 2×2 recombination Q.
fn recombine_columns(y: &BlockMatrix, q: &[(Complex64, Complex64); 2]) -> BlockMatrix {
    assert_eq!(y.cols(), 2);
    let n = y.rows();
    let mut out = BlockMatrix::zeros(n, 2);
    for (j, &(q0, q1)) in q.iter().enumerate() {
        for k in 0..n {
            out.set(k, j, q0 * y.get(k, 0) + q1 * y.get(k, 1));
        }
    }
    out
}

/// Dense Hermitian operator Q·diag(1..n)·Qᴴ for a fixed unitary Q.
struct DenseOperator {
    backend: TestBackend,
    n: usize,
    matrix: Vec<Complex64>,
}

impl DenseOperator {
    fn spd_with_unit_spectrum(n: usize, seed: u64) -> Self {
        let q = orthonormal_block(n, n, seed);
        let mut matrix = vec![Complex64::ZERO; n * n];
        for j in 0..n {
            for i in 0..n {
                let mut acc = Complex64::ZERO;
                for k in 0..n {
                    acc += q.get(i, k) * ((k + 1) as f64) * q.get(j, k).conj();
                }
                matrix[j * n + i] = acc;
            }
        }
        Self {
            backend: TestBackend,
            n,
            matrix,
        }
    }
}

impl BlockOperator<TestBackend> for DenseOperator {
    fn backend(&self) -> &TestBackend {
        &self.backend
    }

    fn rows(&self) -> usize {
        self.n
    }

    fn apply(
        &mut self,
        input: &BlockMatrix,
        output: &mut BlockMatrix,
        _scratch: Option<&mut BlockMatrix>,
        _is_current_basis: bool,
    ) {
        let n = self.n;
        for (col_out, col_in) in output
            .as_mut_slice()
            .chunks_mut(n)
            .zip(input.as_slice().chunks(n))
        {
            for (i, out) in col_out.iter_mut().enumerate() {
                let mut acc = Complex64::ZERO;
                for (k, value) in col_in.iter().enumerate() {
                    acc += self.matrix[k * n + i] * value;
                }
                *out = acc;
            }
        }
    }
}

/// Operator that only ever produces garbage.
struct PoisonedOperator {
    backend: TestBackend,
    n: usize,
}

impl BlockOperator<TestBackend> for PoisonedOperator {
    fn backend(&self) -> &TestBackend {
        &self.backend
    }

    fn rows(&self) -> usize {
        self.n
    }

    fn apply(
        &mut self,
        _input: &BlockMatrix,
        output: &mut BlockMatrix,
        _scratch: Option<&mut BlockMatrix>,
        _is_current_basis: bool,
    ) {
        output.fill(Complex64::new(f64::NAN, 0.0));
    }
}

fn run_diagonal(
    diag: &[f64],
    nwork: usize,
    options: &EigenOptions,
    y0: BlockMatrix,
) -> Result<(TraceMinResult, BlockMatrix), EigenError> {
    let n = diag.len();
    let p = y0.cols();
    let mut operator = DiagonalOperator::new(TestBackend, diag.to_vec());
    let mut y = y0;
    let mut work = vec![BlockMatrix::zeros(n, p); nwork];
    let result = minimize_trace(&mut y, &mut operator, None, None, &mut work, options)?;
    Ok((result, y))
}

fn assert_rel_close(actual: f64, expected: f64, rel_tol: f64) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= rel_tol * expected.abs().max(1.0),
        "got {actual}, expected {expected}, diff {diff}"
    );
}

// ============================================================================
// End-to-End Scenarios
// ============================================================================

#[test]
fn single_band_diagonal_converges_to_lowest_eigenvalue() {
    let diag: Vec<f64> = (1..=8).map(|v| v as f64).collect();
    let options = EigenOptions::default().with_tolerance(1e-10);
    let (result, _) =
        run_diagonal(&diag, 4, &options, ones_block(8)).expect("solver should converge");
    assert!(
        (result.trace - 1.0).abs() < 1e-8,
        "trace = {}",
        result.trace
    );
    assert!(
        result.iterations <= 40,
        "took {} iterations",
        result.iterations
    );
    assert_rel_close(result.eigenvalues[0], 1.0, 1e-7);
}

#[test]
fn diagonal_block_recovers_three_lowest_bands() {
    let diag: Vec<f64> = (1..=16).map(|v| v as f64).collect();
    let options = EigenOptions::default().with_tolerance(1e-10);
    let (result, _) = run_diagonal(&diag, 4, &options, orthonormal_block(16, 3, 2))
        .expect("solver should converge");
    assert_rel_close(result.trace, 6.0, 1e-8);
    for (band, expected) in [1.0, 2.0, 3.0].into_iter().enumerate() {
        assert_rel_close(result.eigenvalues[band], expected, 1e-6);
    }
    assert!(result.eigenvalues[0] <= result.eigenvalues[1]);
    assert!(result.eigenvalues[1] <= result.eigenvalues[2]);
}

#[test]
fn dense_spd_operator_converges() {
    let n = 32;
    let mut operator = DenseOperator::spd_with_unit_spectrum(n, 6);
    let mut y = orthonormal_block(n, 2, 7);
    let mut work = vec![BlockMatrix::zeros(n, 2); 4];
    let options = EigenOptions::default().with_tolerance(1e-10);
    let result = minimize_trace(&mut y, &mut operator, None, None, &mut work, &options)
        .expect("solver should converge");
    assert_rel_close(result.trace, 3.0, 1e-7);
    assert_rel_close(result.eigenvalues[0], 1.0, 1e-5);
    assert_rel_close(result.eigenvalues[1], 2.0, 1e-5);
}

#[test]
fn conjugate_gradient_beats_steepest_descent_when_ill_conditioned() {
    let delta = 1e-6;
    let diag = [
        1.0,
        1.0 + delta,
        100.0,
        400.0,
        1600.0,
        6400.0,
        12800.0,
        25600.0,
    ];
    let options = EigenOptions::default()
        .with_tolerance(1e-10)
        .with_line_search(LineSearchPolicy::ForceExact);

    let (cg, _) = run_diagonal(&diag, 4, &options, orthonormal_block(8, 2, 3))
        .expect("CG run should converge");
    let (sd, _) = run_diagonal(&diag, 2, &options, orthonormal_block(8, 2, 3))
        .expect("steepest-descent run should converge");

    assert_rel_close(cg.trace, 2.0 + delta, 1e-6);
    assert_rel_close(sd.trace, 2.0 + delta, 1e-6);
    assert!(
        sd.iterations >= 5 * cg.iterations,
        "steepest descent took {} iterations vs {} with CG",
        sd.iterations,
        cg.iterations
    );
}

#[test]
fn forced_approximate_search_still_converges() {
    let diag: Vec<f64> = (1..=16).map(|v| v as f64).collect();
    let options = EigenOptions::default()
        .with_tolerance(1e-10)
        .with_line_search(LineSearchPolicy::ForceApprox);
    let (result, _) = run_diagonal(&diag, 4, &options, orthonormal_block(16, 3, 2))
        .expect("approximate line search should still converge");
    assert_rel_close(result.trace, 6.0, 1e-6);
    for (band, expected) in [1.0, 2.0, 3.0].into_iter().enumerate() {
        assert_rel_close(result.eigenvalues[band], expected, 1e-5);
    }
}

#[test]
fn constraint_excludes_the_lowest_mode() {
    let diag: Vec<f64> = (1..=8).map(|v| v as f64).collect();
    let mut operator = DiagonalOperator::new(TestBackend, diag);
    let mut constraint = ZeroRowConstraint::new(0);
    let mut y = ones_block(8);
    let mut work = vec![BlockMatrix::zeros(8, 1); 4];
    let options = EigenOptions::default().with_tolerance(1e-10);
    let result = minimize_trace(
        &mut y,
        &mut operator,
        None,
        Some(&mut constraint),
        &mut work,
        &options,
    )
    .expect("constrained solve should converge");
    // With the first coordinate pinned to zero, the lowest reachable
    // eigenvalue is 2.
    assert!(
        (result.trace - 2.0).abs() < 1e-8,
        "trace = {}",
        result.trace
    );
    assert_eq!(y.get(0, 0), Complex64::ZERO);
}

// ============================================================================
// Universal Properties
// ============================================================================

#[test]
fn descent_is_monotone_with_exact_search() {
    let diag: Vec<f64> = (1..=16).map(|v| v as f64).collect();
    let tolerance = 1e-10;
    let options = EigenOptions {
        tolerance,
        line_search: LineSearchPolicy::ForceExact,
        record_trace: true,
        ..Default::default()
    };
    let (result, _) = run_diagonal(&diag, 4, &options, orthonormal_block(16, 3, 2))
        .expect("solver should converge");
    assert!(!result.trace_history.is_empty());
    for pair in result.trace_history.windows(2) {
        let slack = tolerance * (pair[0].abs() + 1e-7);
        assert!(
            pair[1] <= pair[0] + slack,
            "trace rose from {} to {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn converged_trace_is_invariant_to_column_recombination() {
    let diag: Vec<f64> = (1..=10).map(|v| v as f64).collect();
    let options = EigenOptions::default()
        .with_tolerance(1e-10)
        .with_line_search(LineSearchPolicy::ForceExact);
    let y0 = orthonormal_block(10, 2, 5);
    let mixing = [
        (Complex64::new(1.0, 0.0), Complex64::new(0.5, 0.25)),
        (Complex64::new(1.0, -0.5), Complex64::new(-1.0, 0.0)),
    ];
    let y0_mixed = recombine_columns(&y0, &mixing);

    let (plain, _) = run_diagonal(&diag, 4, &options, y0).expect("plain run converges");
    let (mixed, _) = run_diagonal(&diag, 4, &options, y0_mixed).expect("mixed run converges");
    assert_rel_close(mixed.trace, plain.trace, 1e-7);
}

#[test]
fn repeated_runs_are_deterministic() {
    let diag: Vec<f64> = (1..=16).map(|v| v as f64).collect();
    let options = EigenOptions::default()
        .with_tolerance(1e-10)
        .with_line_search(LineSearchPolicy::ForceExact);
    let (first, _) = run_diagonal(&diag, 4, &options, orthonormal_block(16, 3, 2))
        .expect("first run converges");
    let (second, _) = run_diagonal(&diag, 4, &options, orthonormal_block(16, 3, 2))
        .expect("second run converges");
    assert_eq!(first.iterations, second.iterations);
    assert_eq!(first.trace.to_bits(), second.trace.to_bits());
}

#[test]
fn resolve_orthonormalizes_and_sorts() {
    let backend = TestBackend;
    let n = 6;
    let p = 2;
    let diag: Vec<f64> = (1..=n).map(|v| v as f64).collect();
    let mut operator = DiagonalOperator::new(backend, diag);

    let mut y = BlockMatrix::seeded(n, p, 4);
    let mut work1 = BlockMatrix::zeros(n, p);
    let mut work2 = BlockMatrix::zeros(n, p);
    let eigenvalues = resolve_eigenvalues(&backend, &mut operator, &mut y, &mut work1, &mut work2)
        .expect("generic block spans a non-degenerate subspace");

    assert_eq!(eigenvalues.len(), p);
    assert!(eigenvalues[0] <= eigenvalues[1]);

    // After the rotation Y is orthonormal and diagonalizes the reduced
    // operator: YᴴY = I and YᴴAY = diag(eigenvalues).
    let mut overlap = SqMatrix::zeros(p);
    backend.xtx(&mut overlap, &y);
    for j in 0..p {
        for i in 0..p {
            let expected = if i == j {
                Complex64::ONE
            } else {
                Complex64::ZERO
            };
            assert!((overlap.get(i, j) - expected).norm() < 1e-10);
        }
    }

    operator.apply(&y, &mut work1, None, true);
    let mut rayleigh = SqMatrix::zeros(p);
    backend.xty(&mut rayleigh, &y, &work1);
    for (i, &value) in eigenvalues.iter().enumerate() {
        assert!((rayleigh.get(i, i).re - value).abs() < 1e-10);
    }
    assert!(rayleigh.get(0, 1).norm() < 1e-9);
}

// ============================================================================
// Boundary Cases
// ============================================================================

#[test]
fn one_work_block_is_rejected() {
    let diag = [1.0, 2.0, 3.0];
    let mut operator = DiagonalOperator::new(TestBackend, diag.to_vec());
    let mut y = ones_block(3);
    let mut work = vec![BlockMatrix::zeros(3, 1); 1];
    let err = minimize_trace(
        &mut y,
        &mut operator,
        None,
        None,
        &mut work,
        &EigenOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, EigenError::InsufficientWorkspace { got: 1 }));
}

/// Replaces the iterate with a fresh unit vector on every call, so the
/// trace keeps moving and the solver can never meet its tolerance.
struct WanderingConstraint {
    calls: usize,
}

impl BlockConstraint<TestBackend> for WanderingConstraint {
    fn project(&mut self, _backend: &TestBackend, basis: &mut BlockMatrix) {
        let angle = 0.7 * self.calls as f64 + 0.3;
        basis.set(0, 0, Complex64::new(angle.cos(), 0.0));
        basis.set(1, 0, Complex64::new(angle.sin(), 0.0));
        self.calls += 1;
    }
}

#[test]
fn iteration_cap_is_reported_as_non_convergence() {
    let mut operator = DiagonalOperator::new(TestBackend, vec![1.0, 2.0]);
    let mut constraint = WanderingConstraint { calls: 0 };
    let mut y = ones_block(2);
    let mut work = vec![BlockMatrix::zeros(2, 1); 2];
    let options = EigenOptions::default()
        .with_tolerance(1e-10)
        .with_line_search(LineSearchPolicy::ForceExact);
    let err = minimize_trace(
        &mut y,
        &mut operator,
        None,
        Some(&mut constraint),
        &mut work,
        &options,
    )
    .unwrap_err();
    assert!(matches!(err, EigenError::NonConvergence(_)));
}

#[test]
fn non_finite_operator_output_is_a_divergence() {
    let mut operator = PoisonedOperator {
        backend: TestBackend,
        n: 4,
    };
    let mut y = ones_block(4);
    let mut work = vec![BlockMatrix::zeros(4, 1); 4];
    let err = minimize_trace(
        &mut y,
        &mut operator,
        None,
        None,
        &mut work,
        &EigenOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, EigenError::DivergentTrace { iteration: 0 }));
}

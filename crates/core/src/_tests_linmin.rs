#![cfg(test)]

use std::f64::consts::PI;

use num_complex::Complex64;

use super::block::BlockMatrix;
use super::dense::SqMatrix;
use super::eigensolver::linmin::{initial_search_angle, linmin};
use super::eigensolver::trace_func::TraceFunc;
use super::error::EigenError;

// ============================================================================
// linmin on analytic objectives
// ============================================================================

#[test]
fn finds_quadratic_minimum() {
    let result = linmin(0.0, 4.0, -4.0, 10.0, 1.0, 1e-10, |x, _| {
        Ok(((x - 2.0) * (x - 2.0), 2.0 * (x - 2.0)))
    })
    .expect("quadratic line search should succeed");
    assert!((result.x - 2.0).abs() < 1e-6, "x = {}", result.x);
    assert!(result.improvement > 0.0);
}

#[test]
fn finds_quartic_minimum() {
    let f = |x: f64| (x - 1.0).powi(4) + (x - 1.0) * (x - 1.0);
    let df = |x: f64| 4.0 * (x - 1.0).powi(3) + 2.0 * (x - 1.0);
    let result =
        linmin(0.0, f(0.0), df(0.0), 5.0, 0.4, 1e-10, |x, _| Ok((f(x), df(x))))
            .expect("quartic line search should succeed");
    assert!((result.x - 1.0).abs() < 1e-5, "x = {}", result.x);
}

#[test]
fn searches_in_the_negative_direction() {
    // Positive derivative at the origin: downhill is x < 0.
    let result = linmin(0.0, 9.0, 6.0, -10.0, -1.0, 1e-10, |x, _| {
        Ok(((x + 3.0) * (x + 3.0), 2.0 * (x + 3.0)))
    })
    .expect("backwards bracket should be handled");
    assert!((result.x + 3.0).abs() < 1e-6, "x = {}", result.x);
}

#[test]
fn zero_derivative_at_entry_returns_xmin() {
    let result = linmin(0.25, 7.0, 0.0, 1.0, 0.5, 1e-8, |_x, _| {
        panic!("objective must not be evaluated")
    })
    .expect("zero entry derivative is not an error");
    assert_eq!(result.x, 0.25);
    assert_eq!(result.improvement, 0.0);
}

#[test]
fn rejects_uphill_initial_guess() {
    let err = linmin(0.0, 4.0, -4.0, -10.0, -1.0, 1e-8, |x, _| {
        Ok(((x - 2.0) * (x - 2.0), 2.0 * (x - 2.0)))
    })
    .unwrap_err();
    assert!(matches!(err, EigenError::BadBracket { .. }));
}

#[test]
fn rejects_guess_outside_bracket() {
    let err = linmin(0.0, 4.0, -4.0, 10.0, 20.0, 1e-8, |x, _| {
        Ok(((x - 2.0) * (x - 2.0), 2.0 * (x - 2.0)))
    })
    .unwrap_err();
    assert!(matches!(err, EigenError::GuessOutOfRange { .. }));
}

#[test]
fn reports_bracket_failure_on_monotone_descent() {
    let err = linmin(0.0, 0.0, -1.0, 4.0, 0.5, 1e-8, |x, _| Ok((-x, -1.0))).unwrap_err();
    assert!(matches!(err, EigenError::BracketFailure { .. }));
}

// ============================================================================
// Newton-step clamps
// ============================================================================

#[test]
fn newton_angle_is_plain_ratio_when_curvature_is_sane() {
    let theta = initial_search_angle(-1.0, 2.0, 0.3, 1.0);
    assert!((theta - 0.5).abs() < 1e-15);
}

#[test]
fn negative_curvature_falls_back_to_previous_angle() {
    let theta = initial_search_angle(-1.0, -2.0, -0.3, 1.0);
    assert_eq!(theta, 0.3);
    let theta = initial_search_angle(1.0, -2.0, -0.3, 1.0);
    assert_eq!(theta, -0.3);
}

#[test]
fn oversized_angle_falls_back_to_previous_angle() {
    let theta = initial_search_angle(-10.0, 1e-4, 0.4, 1.0);
    assert_eq!(theta, 0.4);
}

#[test]
fn large_predicted_change_keeps_the_newton_step() {
    // Predicted decrease far exceeds the last energy change, but the step
    // is still below π: the line search is left to tame it.
    let theta = initial_search_angle(-1.0, 0.5, 0.3, 1e-9);
    assert!((theta - 2.0).abs() < 1e-15);
}

// ============================================================================
// Trace functional consistency
// ============================================================================

fn gram(x: &BlockMatrix, y: &BlockMatrix) -> SqMatrix {
    let p = x.cols();
    let n = x.rows();
    let mut out = SqMatrix::zeros(p);
    for j in 0..p {
        for i in 0..p {
            let mut acc = Complex64::ZERO;
            for k in 0..n {
                acc += x.get(k, i).conj() * y.get(k, j);
            }
            out.set(i, j, acc);
        }
    }
    out
}

fn apply_diag(diag: &[f64], x: &BlockMatrix) -> BlockMatrix {
    let mut out = BlockMatrix::zeros(x.rows(), x.cols());
    for j in 0..x.cols() {
        for (k, &d) in diag.iter().enumerate() {
            out.set(k, j, d * x.get(k, j));
        }
    }
    out
}

fn symmetrized(m: &SqMatrix) -> SqMatrix {
    let mut out = SqMatrix::zeros(m.dim());
    out.symmetrize_from(m);
    out
}

struct FixtureMatrices {
    d_norm: f64,
    ytay: SqMatrix,
    dtad: SqMatrix,
    sym_ytad: SqMatrix,
    yty: SqMatrix,
    dtd: SqMatrix,
    sym_ytd: SqMatrix,
}

fn curve_fixture() -> FixtureMatrices {
    let n = 6;
    let p = 2;
    let diag: Vec<f64> = (1..=n).map(|v| v as f64).collect();
    let y = BlockMatrix::seeded(n, p, 3);
    let d = BlockMatrix::seeded(n, p, 9);
    let ay = apply_diag(&diag, &y);
    let ad = apply_diag(&diag, &d);

    let dtd = gram(&d, &d);
    let d_norm = (dtd.trace().re / p as f64).sqrt();
    FixtureMatrices {
        d_norm,
        ytay: gram(&y, &ay),
        dtad: gram(&d, &ad),
        sym_ytad: symmetrized(&gram(&y, &ad)),
        yty: gram(&y, &y),
        dtd,
        sym_ytd: symmetrized(&gram(&y, &d)),
    }
}

fn eval_fixture(fix: &FixtureMatrices, theta: f64, want_derivative: bool) -> (f64, f64) {
    let mut m1 = SqMatrix::zeros(2);
    let mut m2 = SqMatrix::zeros(2);
    let mut m3 = SqMatrix::zeros(2);
    let mut func = TraceFunc {
        d_norm: fix.d_norm,
        ytay: &fix.ytay,
        dtad: &fix.dtad,
        sym_ytad: &fix.sym_ytad,
        yty: &fix.yty,
        dtd: &fix.dtd,
        sym_ytd: &fix.sym_ytd,
        m1: &mut m1,
        m2: &mut m2,
        m3: &mut m3,
    };
    func.eval(theta, want_derivative)
        .expect("curve Gram stays positive definite for a generic block")
}

#[test]
fn trace_func_is_idempotent() {
    let fix = curve_fixture();
    let first = eval_fixture(&fix, 0.7, true);
    let second = eval_fixture(&fix, 0.7, true);
    assert_eq!(first.0, second.0);
    assert_eq!(first.1, second.1);
}

#[test]
fn trace_derivative_matches_finite_differences() {
    let fix = curve_fixture();
    let h = 1e-6;
    let mut theta: f64 = -3.0;
    while theta < 3.0 {
        if theta.abs() < PI {
            let (_, deriv) = eval_fixture(&fix, theta, true);
            let (f_plus, _) = eval_fixture(&fix, theta + h, false);
            let (f_minus, _) = eval_fixture(&fix, theta - h, false);
            let numeric = (f_plus - f_minus) / (2.0 * h);
            let diff = (deriv - numeric).abs();
            assert!(
                diff <= 1e-6 * (1.0 + deriv.abs()),
                "θ = {theta}: analytic {deriv} vs numeric {numeric}"
            );
        }
        theta += 0.37;
    }
}

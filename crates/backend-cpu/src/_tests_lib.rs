#![cfg(test)]

use crate::CpuBackend;
use num_complex::Complex64;
use tracemin_core::backend::BlockBackend;
use tracemin_core::block::BlockMatrix;
use tracemin_core::dense::SqMatrix;
use tracemin_core::eigensolver::{EigenOptions, minimize_trace};
use tracemin_core::operator::Laplacian1D;

fn assert_close(actual: Complex64, expected: Complex64, tol: f64) {
    let diff = (actual - expected).norm();
    assert!(
        diff <= tol,
        "got {actual}, expected {expected}, diff {diff}"
    );
}

/// Naive reference for R = XᴴY.
fn naive_xty(x: &BlockMatrix, y: &BlockMatrix) -> SqMatrix {
    let p = x.cols();
    let n = x.rows();
    let mut out = SqMatrix::zeros(p);
    for i in 0..p {
        for j in 0..p {
            let mut acc = Complex64::ZERO;
            for k in 0..n {
                acc += x.get(k, i).conj() * y.get(k, j);
            }
            out.set(i, j, acc);
        }
    }
    out
}

#[test]
fn xty_matches_naive_reference() {
    let backend = CpuBackend::new();
    let x = BlockMatrix::seeded(7, 3, 1);
    let y = BlockMatrix::seeded(7, 3, 2);
    let mut out = SqMatrix::zeros(3);
    backend.xty(&mut out, &x, &y);
    let expected = naive_xty(&x, &y);
    for j in 0..3 {
        for i in 0..3 {
            assert_close(out.get(i, j), expected.get(i, j), 1e-12);
        }
    }
}

#[test]
fn xtx_is_hermitian() {
    let backend = CpuBackend::new();
    let x = BlockMatrix::seeded(9, 4, 5);
    let mut out = SqMatrix::zeros(4);
    backend.xtx(&mut out, &x);
    for j in 0..4 {
        for i in 0..4 {
            assert_close(out.get(i, j), out.get(j, i).conj(), 1e-12);
        }
    }
}

#[test]
fn xe_ys_multiplies_columns() {
    let backend = CpuBackend::new();
    let y = BlockMatrix::seeded(6, 2, 3);
    let mut s = SqMatrix::zeros(2);
    s.set(0, 0, Complex64::new(2.0, 0.0));
    s.set(1, 0, Complex64::new(0.0, 1.0));
    s.set(0, 1, Complex64::new(0.0, -1.0));
    s.set(1, 1, Complex64::new(3.0, 0.0));
    let mut x = BlockMatrix::zeros(6, 2);
    backend.xe_ys(&mut x, &y, &s, true);
    for k in 0..6 {
        for j in 0..2 {
            let expected = y.get(k, 0) * s.get(0, j) + y.get(k, 1) * s.get(1, j);
            assert_close(x.get(k, j), expected, 1e-12);
        }
    }
}

#[test]
fn xpa_ys_accumulates() {
    let backend = CpuBackend::new();
    let y = BlockMatrix::seeded(5, 2, 7);
    let s = {
        let mut s = SqMatrix::zeros(2);
        s.set(0, 0, Complex64::new(1.0, 0.5));
        s.set(1, 1, Complex64::new(-2.0, 0.0));
        s
    };
    let mut x = BlockMatrix::seeded(5, 2, 8);
    let before = x.clone();
    backend.xpa_ys(&mut x, -1.5, &y, &s);
    for k in 0..5 {
        for j in 0..2 {
            let product = y.get(k, 0) * s.get(0, j) + y.get(k, 1) * s.get(1, j);
            let expected = before.get(k, j) - 1.5 * product;
            assert_close(x.get(k, j), expected, 1e-12);
        }
    }
}

#[test]
fn axpby_and_scal_are_elementwise() {
    let backend = CpuBackend::new();
    let mut x = BlockMatrix::seeded(4, 2, 11);
    let y = BlockMatrix::seeded(4, 2, 12);
    let x0 = x.clone();
    backend.axpby(0.5, &mut x, 2.0, &y);
    for (idx, value) in x.as_slice().iter().enumerate() {
        let expected = 0.5 * x0.as_slice()[idx] + 2.0 * y.as_slice()[idx];
        assert_close(*value, expected, 1e-14);
    }
    backend.scal(-2.0, &mut x);
    for (idx, value) in x.as_slice().iter().enumerate() {
        let expected = -2.0 * (0.5 * x0.as_slice()[idx] + 2.0 * y.as_slice()[idx]);
        assert_close(*value, expected, 1e-14);
    }
}

#[test]
fn trace_xty_sums_conjugated_products() {
    let backend = CpuBackend::new();
    let x = BlockMatrix::seeded(8, 2, 21);
    let y = BlockMatrix::seeded(8, 2, 22);
    let expected: Complex64 = x
        .as_slice()
        .iter()
        .zip(y.as_slice())
        .map(|(a, b)| a.conj() * b)
        .sum();
    assert_close(backend.trace_xty(&x, &y), expected, 1e-12);
}

#[test]
fn solver_runs_on_laplacian_with_cpu_backend() {
    let backend = CpuBackend::new();
    let n = 24;
    let p = 2;
    let mut operator = Laplacian1D::new(backend, n);
    let expected: f64 = (0..p).map(|k| operator.eigenvalue(k)).sum();

    let mut y = BlockMatrix::seeded(n, p, 1);
    let mut work = vec![BlockMatrix::zeros(n, p); 4];
    let options = EigenOptions::default().with_tolerance(1e-10);
    let result = minimize_trace(&mut y, &mut operator, None, None, &mut work, &options)
        .expect("solver should converge on the 1-D Laplacian");

    assert!(
        (result.trace - expected).abs() / expected < 1e-6,
        "trace {} differs from expected {expected}",
        result.trace
    );
}

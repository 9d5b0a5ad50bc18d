#![cfg(test)]

use num_complex::Complex64;

use super::dense::SqMatrix;
use super::error::EigenError;

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

fn assert_close(actual: Complex64, expected: Complex64, tol: f64) {
    let diff = (actual - expected).norm();
    assert!(
        diff <= tol,
        "got {actual}, expected {expected}, diff {diff}"
    );
}

/// A deterministic Hermitian positive-definite matrix: B·Bᴴ + dim·I from a
/// seeded dense B.
fn seeded_hpd(dim: usize, seed: u64) -> SqMatrix {
    let mut b = SqMatrix::zeros(dim);
    for j in 0..dim {
        for i in 0..dim {
            let t = ((j * dim + i) as f64 + 1.0) * (seed as f64 + 0.5);
            b.set(i, j, c((0.37 * t).sin(), (0.61 * t).cos()));
        }
    }
    let mut out = SqMatrix::zeros(dim);
    for j in 0..dim {
        for i in 0..dim {
            let mut acc = Complex64::ZERO;
            for k in 0..dim {
                acc += b.get(i, k) * b.get(j, k).conj();
            }
            if i == j {
                acc += dim as f64;
            }
            out.set(i, j, acc);
        }
    }
    out
}

#[test]
fn scale_add_combines_matrices() {
    let mut a = SqMatrix::identity(2);
    let mut b = SqMatrix::zeros(2);
    b.set(0, 1, c(1.0, -2.0));
    b.set(1, 0, c(1.0, 2.0));
    a.scale_add(3.0, 0.5, &b);
    assert_close(a.get(0, 0), c(3.0, 0.0), 1e-15);
    assert_close(a.get(0, 1), c(0.5, -1.0), 1e-15);
    a.add_scaled(2.0, &b);
    assert_close(a.get(1, 0), c(2.5, 5.0), 1e-15);
}

#[test]
fn products_match_hand_expansion() {
    let mut b = SqMatrix::zeros(2);
    b.set(0, 0, c(1.0, 0.0));
    b.set(1, 0, c(0.0, 1.0));
    b.set(0, 1, c(2.0, 0.0));
    b.set(1, 1, c(0.0, -1.0));
    let mut cc = SqMatrix::zeros(2);
    cc.set(0, 0, c(0.0, 1.0));
    cc.set(1, 0, c(1.0, 0.0));
    cc.set(0, 1, c(3.0, 0.0));
    cc.set(1, 1, c(0.0, 0.0));

    let mut a = SqMatrix::zeros(2);
    a.set_product(&b, &cc);
    // (B·C)[0,0] = b00·c00 + b01·c10 = i + 2.
    assert_close(a.get(0, 0), c(2.0, 1.0), 1e-15);
    // (B·C)[1,1] = b10·c01 + b11·c11 = 3i.
    assert_close(a.get(1, 1), c(0.0, 3.0), 1e-15);

    let before = a.get(0, 1);
    a.add_product(-2.0, &b, &cc);
    let product_01 = b.get(0, 0) * cc.get(0, 1) + b.get(0, 1) * cc.get(1, 1);
    assert_close(a.get(0, 1), before - 2.0 * product_01, 1e-15);
}

#[test]
fn symmetrize_averages_with_adjoint() {
    let mut src = SqMatrix::zeros(2);
    src.set(0, 1, c(2.0, 4.0));
    src.set(1, 0, c(6.0, 2.0));
    let mut sym = SqMatrix::zeros(2);
    sym.symmetrize_from(&src);
    assert_close(sym.get(0, 1), c(4.0, 1.0), 1e-15);
    assert_close(sym.get(1, 0), sym.get(0, 1).conj(), 1e-15);
}

#[test]
fn trace_and_frobenius_products() {
    let mut a = SqMatrix::zeros(2);
    a.set(0, 0, c(1.0, 5.0));
    a.set(1, 1, c(2.0, -1.0));
    assert_close(a.trace(), c(3.0, 4.0), 1e-15);

    let b = SqMatrix::identity(2);
    // tr(AᴴI) = conj(tr(A)).
    assert_close(a.trace_adjoint_prod(&b), c(3.0, -4.0), 1e-15);
}

#[test]
fn invert_hpd_recovers_known_inverse() {
    // [[2, i], [-i, 2]] has inverse (1/3)·[[2, -i], [i, 2]].
    let mut a = SqMatrix::zeros(2);
    a.set(0, 0, c(2.0, 0.0));
    a.set(0, 1, c(0.0, 1.0));
    a.set(1, 0, c(0.0, -1.0));
    a.set(1, 1, c(2.0, 0.0));
    a.invert_hpd().expect("matrix is positive definite");
    assert_close(a.get(0, 0), c(2.0 / 3.0, 0.0), 1e-14);
    assert_close(a.get(0, 1), c(0.0, -1.0 / 3.0), 1e-14);
    assert_close(a.get(1, 0), c(0.0, 1.0 / 3.0), 1e-14);
    assert_close(a.get(1, 1), c(2.0 / 3.0, 0.0), 1e-14);
}

#[test]
fn invert_hpd_times_original_is_identity() {
    for dim in 1..=5 {
        let a = seeded_hpd(dim, dim as u64);
        let mut inv = a.clone();
        inv.invert_hpd().expect("seeded matrix is positive definite");
        let mut product = SqMatrix::zeros(dim);
        product.set_product(&a, &inv);
        for j in 0..dim {
            for i in 0..dim {
                let expected = if i == j { Complex64::ONE } else { Complex64::ZERO };
                assert_close(product.get(i, j), expected, 1e-10);
            }
        }
    }
}

#[test]
fn invert_hpd_rejects_indefinite_input() {
    let mut a = SqMatrix::identity(2);
    a.set(1, 1, c(-1.0, 0.0));
    assert!(matches!(a.invert_hpd(), Err(EigenError::IndefiniteGram)));
}

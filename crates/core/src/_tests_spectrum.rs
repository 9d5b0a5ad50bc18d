#![cfg(test)]

use num_complex::Complex64;

use super::dense::SqMatrix;
use super::eigensolver::spectrum::hermitian_eigendecomposition;

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

#[test]
fn diagonal_matrix_sorts_ascending() {
    let mut m = SqMatrix::zeros(3);
    m.set(0, 0, c(5.0, 0.0));
    m.set(1, 1, c(-1.0, 0.0));
    m.set(2, 2, c(2.0, 0.0));
    let (values, vectors) = hermitian_eigendecomposition(&m);
    assert_eq!(values, vec![-1.0, 2.0, 5.0]);
    // Column 0 must be the eigenvector of -1, i.e. e_1.
    assert!((vectors.get(1, 0).norm() - 1.0).abs() < 1e-12);
}

#[test]
fn complex_pair_has_known_spectrum() {
    // [[2, i], [-i, 2]] has eigenvalues 1 and 3.
    let mut m = SqMatrix::zeros(2);
    m.set(0, 0, c(2.0, 0.0));
    m.set(0, 1, c(0.0, 1.0));
    m.set(1, 0, c(0.0, -1.0));
    m.set(1, 1, c(2.0, 0.0));
    let (values, _) = hermitian_eigendecomposition(&m);
    assert!((values[0] - 1.0).abs() < 1e-12);
    assert!((values[1] - 3.0).abs() < 1e-12);
}

#[test]
fn one_by_one_matrix_is_its_own_spectrum() {
    let mut m = SqMatrix::zeros(1);
    m.set(0, 0, c(4.25, 0.0));
    let (values, vectors) = hermitian_eigendecomposition(&m);
    assert_eq!(values, vec![4.25]);
    assert_eq!(vectors.get(0, 0), Complex64::ONE);
}

#[test]
fn decomposition_reconstructs_the_matrix() {
    // A dense Hermitian matrix from a seeded generator.
    let dim = 4;
    let mut m = SqMatrix::zeros(dim);
    for j in 0..dim {
        for i in 0..=j {
            let t = ((j * dim + i) as f64 + 1.0) * 0.83;
            let value = if i == j {
                c((0.37 * t).sin() + 2.0 * dim as f64, 0.0)
            } else {
                c((0.37 * t).sin(), (0.61 * t).cos())
            };
            m.set(i, j, value);
            m.set(j, i, value.conj());
        }
    }

    let (values, vectors) = hermitian_eigendecomposition(&m);
    for j in 1..dim {
        assert!(values[j - 1] <= values[j], "eigenvalues must ascend");
    }

    // V·Λ·Vᴴ = A.
    for col in 0..dim {
        for row in 0..dim {
            let mut acc = Complex64::ZERO;
            for (k, &value) in values.iter().enumerate() {
                acc += vectors.get(row, k) * value * vectors.get(col, k).conj();
            }
            let diff = (acc - m.get(row, col)).norm();
            assert!(diff < 1e-10, "entry ({row}, {col}) differs by {diff}");
        }
    }
}

#[test]
fn eigenvectors_are_orthonormal() {
    let mut m = SqMatrix::zeros(3);
    m.set(0, 0, c(2.0, 0.0));
    m.set(1, 1, c(2.0, 0.0));
    m.set(2, 2, c(7.0, 0.0));
    m.set(0, 1, c(0.5, 0.25));
    m.set(1, 0, c(0.5, -0.25));
    m.set(1, 2, c(0.0, -1.0));
    m.set(2, 1, c(0.0, 1.0));
    let (_, vectors) = hermitian_eigendecomposition(&m);
    for a in 0..3 {
        for b in 0..3 {
            let mut acc = Complex64::ZERO;
            for k in 0..3 {
                acc += vectors.get(k, a).conj() * vectors.get(k, b);
            }
            let expected = if a == b { Complex64::ONE } else { Complex64::ZERO };
            assert!((acc - expected).norm() < 1e-12);
        }
    }
}

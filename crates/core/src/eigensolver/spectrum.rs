//! Resolving eigenvalues from a converged invariant subspace.
//!
//! The outer iteration only minimizes the trace; its converged block Y
//! spans the invariant subspace but its columns are neither orthonormal
//! nor aligned with individual eigenvectors. The finisher here forms the
//! reduced pencil (YᴴAY, YᴴY), whitens it with the inverse square root of
//! the overlap, diagonalizes, and rotates Y so that column k carries the
//! k-th smallest eigenvalue.

use num_complex::Complex64;

use crate::{
    backend::{BlockBackend, BlockStore},
    dense::SqMatrix,
    error::EigenError,
    operator::BlockOperator,
};

/// Jacobi sweep cap; convergence is quadratic once rotations get small.
const MAX_SWEEPS: usize = 50;
const OFF_DIAGONAL_TOL: f64 = 1e-15;

/// Eigendecomposition of a Hermitian matrix by cyclic complex Jacobi
/// rotations.
///
/// Returns eigenvalues in ascending order and a unitary matrix whose
/// k-th column is the eigenvector for the k-th eigenvalue. Intended for
/// the small p×p blocks of the reduced problem; cost is O(p³) per sweep.
pub fn hermitian_eigendecomposition(matrix: &SqMatrix) -> (Vec<f64>, SqMatrix) {
    let p = matrix.dim();
    let mut work = matrix.clone();
    let mut vectors = SqMatrix::identity(p);

    if p <= 1 {
        return ((0..p).map(|i| work.get(i, i).re).collect(), vectors);
    }

    for _sweep in 0..MAX_SWEEPS {
        let mut max_off = 0.0f64;

        for row in 0..p {
            for col in (row + 1)..p {
                let off = work.get(row, col);
                let off_norm = off.norm();
                if off_norm > max_off {
                    max_off = off_norm;
                }
                if off_norm < OFF_DIAGONAL_TOL {
                    continue;
                }

                let app = work.get(row, row).re;
                let aqq = work.get(col, col).re;

                // Factor out the phase of the pivot so the rotation angle
                // comes from the real Jacobi problem on |a_pq|.
                let phase = off / off_norm;
                let tau = (aqq - app) / (2.0 * off_norm);
                let t = if tau >= 0.0 {
                    1.0 / (tau + (1.0 + tau * tau).sqrt())
                } else {
                    -1.0 / (-tau + (1.0 + tau * tau).sqrt())
                };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s_phase = (t * c) * phase;
                let c_val = Complex64::new(c, 0.0);

                work.set(row, row, Complex64::new(app - t * off_norm, 0.0));
                work.set(col, col, Complex64::new(aqq + t * off_norm, 0.0));
                work.set(row, col, Complex64::ZERO);
                work.set(col, row, Complex64::ZERO);

                for k in 0..p {
                    if k != row && k != col {
                        let akp = work.get(k, row);
                        let akq = work.get(k, col);
                        let new_akp = c_val * akp - s_phase.conj() * akq;
                        let new_akq = s_phase * akp + c_val * akq;
                        work.set(k, row, new_akp);
                        work.set(row, k, new_akp.conj());
                        work.set(k, col, new_akq);
                        work.set(col, k, new_akq.conj());
                    }
                }

                for k in 0..p {
                    let vkp = vectors.get(k, row);
                    let vkq = vectors.get(k, col);
                    vectors.set(k, row, c_val * vkp - s_phase.conj() * vkq);
                    vectors.set(k, col, s_phase * vkp + c_val * vkq);
                }
            }
        }

        if max_off < OFF_DIAGONAL_TOL {
            break;
        }
    }

    let eigenvalues: Vec<f64> = (0..p).map(|i| work.get(i, i).re).collect();

    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by(|&a, &b| eigenvalues[a].total_cmp(&eigenvalues[b]));

    let sorted_values: Vec<f64> = order.iter().map(|&i| eigenvalues[i]).collect();
    let mut sorted_vectors = SqMatrix::zeros(p);
    for (new_col, &old_col) in order.iter().enumerate() {
        for row in 0..p {
            sorted_vectors.set(row, new_col, vectors.get(row, old_col));
        }
    }

    (sorted_values, sorted_vectors)
}

/// Diagonalize the reduced problem and rotate Y to align with it.
///
/// On return, Y's columns are A-eigenvector approximations ordered by
/// ascending eigenvalue (YᴴY = I, YᴴAY diagonal), and the returned vector
/// holds the corresponding eigenvalues. `work1` and `work2` are clobbered.
pub fn resolve_eigenvalues<B, O>(
    backend: &B,
    operator: &mut O,
    y: &mut B::Block,
    work1: &mut B::Block,
    work2: &mut B::Block,
) -> Result<Vec<f64>, EigenError>
where
    B: BlockBackend,
    O: BlockOperator<B>,
{
    let p = y.cols();

    operator.apply(y, work1, Some(&mut *work2), true);
    let mut rayleigh = SqMatrix::zeros(p);
    backend.xty(&mut rayleigh, y, work1);
    let mut overlap = SqMatrix::zeros(p);
    backend.xtx(&mut overlap, y);

    // Whitening factor W = (YᴴY)^{-1/2} from the overlap spectrum.
    let (overlap_values, overlap_vectors) = hermitian_eigendecomposition(&overlap);
    if overlap_values.iter().any(|&v| !(v > 0.0)) {
        return Err(EigenError::IndefiniteGram);
    }
    let mut whiten = SqMatrix::zeros(p);
    for j in 0..p {
        for i in 0..p {
            let mut acc = Complex64::ZERO;
            for (k, &value) in overlap_values.iter().enumerate() {
                acc += overlap_vectors.get(i, k)
                    * overlap_vectors.get(j, k).conj()
                    * (1.0 / value.sqrt());
            }
            whiten.set(i, j, acc);
        }
    }

    // Standard Hermitian problem W·(YᴴAY)·W, then rotation R = W·V.
    let mut half = SqMatrix::zeros(p);
    half.set_product(&whiten, &rayleigh);
    let mut reduced = SqMatrix::zeros(p);
    reduced.set_product(&half, &whiten);

    let (eigenvalues, vectors) = hermitian_eigendecomposition(&reduced);

    let mut rotation = SqMatrix::zeros(p);
    rotation.set_product(&whiten, &vectors);
    backend.xe_ys(work1, y, &rotation, false);
    backend.copy(y, work1);

    Ok(eigenvalues)
}

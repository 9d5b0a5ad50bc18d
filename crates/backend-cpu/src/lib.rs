//! CPU implementation of the block-vector kernels.
//!
//! Serial column loops with f64 accumulation. With the `parallel` feature
//! the O(n·p²) kernels distribute *whole output columns* over rayon; each
//! column is still reduced serially, so the parallel path produces
//! bit-identical results to the serial one.

use num_complex::Complex64;

use tracemin_core::backend::BlockBackend;
use tracemin_core::block::BlockMatrix;
use tracemin_core::dense::SqMatrix;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(test)]
mod _tests_lib;

/// Smallest block (in elements) worth distributing over the thread pool.
#[cfg(feature = "parallel")]
const PARALLEL_MIN_ELEMENTS: usize = 4096;

#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

/// out_col[i] = Σ_k conj(x[k,i])·y[k,j] for one Gram column j.
fn gram_column(out_col: &mut [Complex64], j: usize, x: &[Complex64], y: &[Complex64], n: usize) {
    let yj = &y[j * n..(j + 1) * n];
    for (i, out) in out_col.iter_mut().enumerate() {
        let xi = &x[i * n..(i + 1) * n];
        let mut acc = Complex64::ZERO;
        for (a, b) in xi.iter().zip(yj) {
            acc += a.conj() * b;
        }
        *out = acc;
    }
}

/// col ← col + a·Σ_m y_m·s[m,j] (zeroing first when `overwrite`).
fn product_column(
    col: &mut [Complex64],
    j: usize,
    y: &[Complex64],
    s: &[Complex64],
    a: f64,
    overwrite: bool,
    n: usize,
    p: usize,
) {
    if overwrite {
        col.fill(Complex64::ZERO);
    }
    for m in 0..p {
        let coeff = a * s[j * p + m];
        let ym = &y[m * n..(m + 1) * n];
        for (dst, src) in col.iter_mut().zip(ym) {
            *dst += coeff * src;
        }
    }
}

impl BlockBackend for CpuBackend {
    type Block = BlockMatrix;

    fn alloc_block(&self, rows: usize, cols: usize) -> BlockMatrix {
        BlockMatrix::zeros(rows, cols)
    }

    fn xtx(&self, out: &mut SqMatrix, x: &BlockMatrix) {
        self.xty(out, x, x);
    }

    fn xty(&self, out: &mut SqMatrix, x: &BlockMatrix, y: &BlockMatrix) {
        let n = x.rows();
        let p = x.cols();
        debug_assert_eq!(out.dim(), p);
        let x_data = x.as_slice();
        let y_data = y.as_slice();

        #[cfg(feature = "parallel")]
        if n * p >= PARALLEL_MIN_ELEMENTS {
            out.as_mut_slice()
                .par_chunks_mut(p)
                .enumerate()
                .for_each(|(j, col)| gram_column(col, j, x_data, y_data, n));
            return;
        }

        for (j, col) in out.as_mut_slice().chunks_mut(p).enumerate() {
            gram_column(col, j, x_data, y_data, n);
        }
    }

    fn xe_ys(&self, x: &mut BlockMatrix, y: &BlockMatrix, s: &SqMatrix, _s_is_hermitian: bool) {
        let n = x.rows();
        let p = x.cols();
        let y_data = y.as_slice();
        let s_data = s.as_slice();

        #[cfg(feature = "parallel")]
        if n * p >= PARALLEL_MIN_ELEMENTS {
            x.as_mut_slice()
                .par_chunks_mut(n)
                .enumerate()
                .for_each(|(j, col)| product_column(col, j, y_data, s_data, 1.0, true, n, p));
            return;
        }

        for (j, col) in x.as_mut_slice().chunks_mut(n).enumerate() {
            product_column(col, j, y_data, s_data, 1.0, true, n, p);
        }
    }

    fn xpa_ys(&self, x: &mut BlockMatrix, a: f64, y: &BlockMatrix, s: &SqMatrix) {
        let n = x.rows();
        let p = x.cols();
        let y_data = y.as_slice();
        let s_data = s.as_slice();

        #[cfg(feature = "parallel")]
        if n * p >= PARALLEL_MIN_ELEMENTS {
            x.as_mut_slice()
                .par_chunks_mut(n)
                .enumerate()
                .for_each(|(j, col)| product_column(col, j, y_data, s_data, a, false, n, p));
            return;
        }

        for (j, col) in x.as_mut_slice().chunks_mut(n).enumerate() {
            product_column(col, j, y_data, s_data, a, false, n, p);
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

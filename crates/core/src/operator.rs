//! Operator seams and reference implementations.
//!
//! The solver only ever sees the three traits below: the Hermitian
//! operator A, an optional preconditioner K, and an optional constraint
//! projection C. The concrete operators in this module are small
//! reference implementations with known spectra, used by the CLI, the
//! benches and the test suites.

use num_complex::Complex64;

use std::f64::consts::PI;

use crate::{
    backend::{BlockBackend, BlockStore},
    dense::SqMatrix,
};

/// A Hermitian linear operator applied column-by-column to a block.
pub trait BlockOperator<B: BlockBackend> {
    fn backend(&self) -> &B;

    /// Number of rows of the blocks this operator acts on.
    fn rows(&self) -> usize;

    /// output ← A·input.
    ///
    /// `scratch`, when present, is a spare block the implementation may
    /// clobber freely; it never aliases `input` or `output` (the driver
    /// passes `None` instead of an aliasing block). `is_current_basis`
    /// hints that `input` is the solver's current iterate rather than a
    /// search direction, which lets implementations cache per-iterate
    /// state.
    fn apply(
        &mut self,
        input: &B::Block,
        output: &mut B::Block,
        scratch: Option<&mut B::Block>,
        is_current_basis: bool,
    );
}

/// Preconditioner K approximating A⁻¹ on the gradient.
///
/// Receives the current basis block and its Gram matrix for context;
/// eigenvalue estimates are passed when available (the trace minimizer
/// passes `None`, since its basis is neither orthonormal nor
/// diagonalized).
pub trait BlockPreconditioner<B: BlockBackend> {
    fn apply(
        &mut self,
        backend: &B,
        gradient: &B::Block,
        out: &mut B::Block,
        basis: &B::Block,
        eigenvalues: Option<&[f64]>,
        gram: &SqMatrix,
    );
}

/// An idempotent in-place projection enforcing a caller-side invariant.
pub trait BlockConstraint<B: BlockBackend> {
    fn project(&mut self, backend: &B, basis: &mut B::Block);
}

// ============================================================================
// Reference Operators
// ============================================================================

/// A = diag(d): the simplest Hermitian operator, with spectrum d.
pub struct DiagonalOperator<B> {
    backend: B,
    diag: Vec<f64>,
}

impl<B: BlockBackend> DiagonalOperator<B> {
    pub fn new(backend: B, diag: Vec<f64>) -> Self {
        Self { backend, diag }
    }

    pub fn diag(&self) -> &[f64] {
        &self.diag
    }
}

impl<B: BlockBackend> BlockOperator<B> for DiagonalOperator<B> {
    fn backend(&self) -> &B {
        &self.backend
    }

    fn rows(&self) -> usize {
        self.diag.len()
    }

    fn apply(
        &mut self,
        input: &B::Block,
        output: &mut B::Block,
        _scratch: Option<&mut B::Block>,
        _is_current_basis: bool,
    ) {
        let n = self.diag.len();
        let src = input.as_slice();
        let dst = output.as_mut_slice();
        for (col_out, col_in) in dst.chunks_mut(n).zip(src.chunks(n)) {
            for ((out, inp), &d) in col_out.iter_mut().zip(col_in).zip(&self.diag) {
                *out = d * inp;
            }
        }
    }
}

/// The 1-D Dirichlet Laplacian stencil (2 on the diagonal, -1 off it).
///
/// Eigenvalues are 2 − 2·cos(kπ/(n+1)) for k = 1..n, which makes it a
/// convenient positive-definite test operator with a known spectrum.
pub struct Laplacian1D<B> {
    backend: B,
    rows: usize,
}

impl<B: BlockBackend> Laplacian1D<B> {
    pub fn new(backend: B, rows: usize) -> Self {
        Self { backend, rows }
    }

    /// The k-th smallest eigenvalue (k is 0-based).
    pub fn eigenvalue(&self, k: usize) -> f64 {
        let n = self.rows as f64;
        2.0 - 2.0 * ((k as f64 + 1.0) * PI / (n + 1.0)).cos()
    }
}

impl<B: BlockBackend> BlockOperator<B> for Laplacian1D<B> {
    fn backend(&self) -> &B {
        &self.backend
    }

    fn rows(&self) -> usize {
        self.rows
    }

    fn apply(
        &mut self,
        input: &B::Block,
        output: &mut B::Block,
        _scratch: Option<&mut B::Block>,
        _is_current_basis: bool,
    ) {
        let n = self.rows;
        let src = input.as_slice();
        let dst = output.as_mut_slice();
        for (col_out, col_in) in dst.chunks_mut(n).zip(src.chunks(n)) {
            for i in 0..n {
                let left = if i > 0 { col_in[i - 1] } else { Complex64::ZERO };
                let right = if i + 1 < n {
                    col_in[i + 1]
                } else {
                    Complex64::ZERO
                };
                col_out[i] = 2.0 * col_in[i] - left - right;
            }
        }
    }
}

// ============================================================================
// Reference Preconditioner / Constraint
// ============================================================================

/// Jacobi preconditioner: elementwise scaling by an inverse diagonal.
#[derive(Debug, Clone)]
pub struct DiagonalPreconditioner {
    scales: Vec<f64>,
}

/// Shift keeping the inverse diagonal bounded near zero modes.
const DIAGONAL_SHIFT: f64 = 1e-3;

impl DiagonalPreconditioner {
    pub fn new(scales: Vec<f64>) -> Self {
        Self { scales }
    }

    /// Build 1/(d + shift) from an operator diagonal.
    pub fn from_diagonal(diag: &[f64]) -> Self {
        Self {
            scales: diag.iter().map(|&d| 1.0 / (d + DIAGONAL_SHIFT)).collect(),
        }
    }
}

impl<B: BlockBackend> BlockPreconditioner<B> for DiagonalPreconditioner {
    fn apply(
        &mut self,
        _backend: &B,
        gradient: &B::Block,
        out: &mut B::Block,
        _basis: &B::Block,
        _eigenvalues: Option<&[f64]>,
        _gram: &SqMatrix,
    ) {
        let n = self.scales.len();
        let src = gradient.as_slice();
        let dst = out.as_mut_slice();
        for (col_out, col_in) in dst.chunks_mut(n).zip(src.chunks(n)) {
            for ((out, inp), &scale) in col_out.iter_mut().zip(col_in).zip(&self.scales) {
                *out = scale * inp;
            }
        }
    }
}

/// Constraint that pins one row of the basis to zero, restricting the
/// search to the subspace transverse to that coordinate.
#[derive(Debug, Clone)]
pub struct ZeroRowConstraint {
    row: usize,
}

impl ZeroRowConstraint {
    pub fn new(row: usize) -> Self {
        Self { row }
    }
}

impl<B: BlockBackend> BlockConstraint<B> for ZeroRowConstraint {
    fn project(&mut self, _backend: &B, basis: &mut B::Block) {
        let n = basis.rows();
        let row = self.row;
        for col in basis.as_mut_slice().chunks_mut(n) {
            col[row] = Complex64::ZERO;
        }
    }
}

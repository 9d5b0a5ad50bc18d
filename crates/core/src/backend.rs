//! Backend traits for block-vector kernels.
//!
//! The trace minimizer never touches block elements directly (with one
//! exception, the fused gradient-difference update, which goes through
//! [`BlockStore`] slices). Everything else (Gram products, block-times-
//! small-matrix updates, traces) is dispatched through a [`BlockBackend`]
//! so that a distributed or accelerated implementation can supply the same
//! contracts. Kernels that reduce over rows (`xtx`, `xty`, `trace_xty`)
//! act as barriers in a distributed setting: their results must be
//! globally consistent on return.

use num_complex::Complex64;

use crate::{block::BlockMatrix, dense::SqMatrix};

pub trait BlockStore {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    fn as_slice(&self) -> &[Complex64];
    fn as_mut_slice(&mut self) -> &mut [Complex64];
}

impl BlockStore for BlockMatrix {
    fn rows(&self) -> usize {
        self.rows()
    }

    fn cols(&self) -> usize {
        self.cols()
    }

    fn as_slice(&self) -> &[Complex64] {
        self.as_slice()
    }

    fn as_mut_slice(&mut self) -> &mut [Complex64] {
        self.as_mut_slice()
    }
}

pub trait BlockBackend: Clone {
    type Block: BlockStore + Clone;

    fn alloc_block(&self, rows: usize, cols: usize) -> Self::Block;

    /// R ← XᴴX.
    fn xtx(&self, out: &mut SqMatrix, x: &Self::Block);

    /// R ← XᴴY.
    fn xty(&self, out: &mut SqMatrix, x: &Self::Block, y: &Self::Block);

    /// X ← Y·S. The Hermitian hint describes S and may be used to pick a
    /// specialized product; implementations are free to ignore it.
    fn xe_ys(&self, x: &mut Self::Block, y: &Self::Block, s: &SqMatrix, s_is_hermitian: bool);

    /// X ← X + a·Y·S.
    fn xpa_ys(&self, x: &mut Self::Block, a: f64, y: &Self::Block, s: &SqMatrix);

    /// X ← a·X + b·Y.
    fn axpby(&self, a: f64, x: &mut Self::Block, b: f64, y: &Self::Block);

    /// tr(XᴴY).
    fn trace_xty(&self, x: &Self::Block, y: &Self::Block) -> Complex64;

    /// X ← a·X.
    fn scal(&self, a: f64, x: &mut Self::Block);

    fn copy(&self, dst: &mut Self::Block, src: &Self::Block);
}

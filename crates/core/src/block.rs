//! Contiguous storage for tall-skinny blocks of basis vectors.
//!
//! A [`BlockMatrix`] holds an n×p complex matrix (n rows, p columns,
//! typically n ≫ p) in column-major order. The solver treats blocks as
//! opaque buffers owned by the caller; all heavy arithmetic on them goes
//! through a [`crate::backend::BlockBackend`] implementation.

use num_complex::Complex64;

#[derive(Debug, Clone)]
pub struct BlockMatrix {
    rows: usize,
    cols: usize,
    data: Vec<Complex64>,
}

impl BlockMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![Complex64::ZERO; rows * cols],
            rows,
            cols,
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<Complex64>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "data length must match block dimensions"
        );
        Self { rows, cols, data }
    }

    /// Deterministic pseudo-random fill derived from an integer seed.
    ///
    /// Used for reproducible starting guesses in tests, benches and the
    /// demo CLI; no RNG state is involved.
    pub fn seeded(rows: usize, cols: usize, seed: u64) -> Self {
        let mut block = Self::zeros(rows, cols);
        for (idx, value) in block.data.iter_mut().enumerate() {
            let t = (idx as f64 + 1.0) * (seed as f64 + 0.5);
            *value = Complex64::new((0.37 * t).sin(), (0.61 * t).cos());
        }
        block
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[Complex64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Complex64] {
        &mut self.data
    }

    /// Column j as a contiguous slice.
    pub fn col(&self, j: usize) -> &[Complex64] {
        &self.data[j * self.rows..(j + 1) * self.rows]
    }

    pub fn col_mut(&mut self, j: usize) -> &mut [Complex64] {
        &mut self.data[j * self.rows..(j + 1) * self.rows]
    }

    pub fn get(&self, row: usize, col: usize) -> Complex64 {
        self.data[col * self.rows + row]
    }

    pub fn set(&mut self, row: usize, col: usize, value: Complex64) {
        self.data[col * self.rows + row] = value;
    }

    pub fn fill(&mut self, value: Complex64) {
        self.data.fill(value);
    }
}

//! Dense p×p matrices for Gram and Rayleigh blocks.
//!
//! Block sizes are small (p ≪ n), so these operations are plain index
//! loops over column-major storage; nothing here is worth dispatching to
//! an external kernel. The inversion path assumes Hermitian positive
//! definite input, which is all the solver ever inverts.

use num_complex::Complex64;

use crate::error::EigenError;

#[derive(Debug, Clone, PartialEq)]
pub struct SqMatrix {
    dim: usize,
    data: Vec<Complex64>,
}

impl SqMatrix {
    pub fn zeros(dim: usize) -> Self {
        Self {
            data: vec![Complex64::ZERO; dim * dim],
            dim,
        }
    }

    pub fn identity(dim: usize) -> Self {
        let mut m = Self::zeros(dim);
        for i in 0..dim {
            m.set(i, i, Complex64::ONE);
        }
        m
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn as_slice(&self) -> &[Complex64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Complex64] {
        &mut self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Complex64 {
        self.data[col * self.dim + row]
    }

    pub fn set(&mut self, row: usize, col: usize, value: Complex64) {
        self.data[col * self.dim + row] = value;
    }

    pub fn copy_from(&mut self, other: &SqMatrix) {
        debug_assert_eq!(self.dim, other.dim);
        self.data.copy_from_slice(&other.data);
    }

    /// A ← a·A.
    pub fn scale(&mut self, a: f64) {
        for value in &mut self.data {
            *value *= a;
        }
    }

    /// A ← a·A + b·B.
    pub fn scale_add(&mut self, a: f64, b: f64, other: &SqMatrix) {
        debug_assert_eq!(self.dim, other.dim);
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            *dst = a * *dst + b * *src;
        }
    }

    /// A ← A + a·B.
    pub fn add_scaled(&mut self, a: f64, other: &SqMatrix) {
        debug_assert_eq!(self.dim, other.dim);
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            *dst += a * *src;
        }
    }

    /// A ← B·C.
    pub fn set_product(&mut self, b: &SqMatrix, c: &SqMatrix) {
        self.product_impl(0.0, 1.0, b, c);
    }

    /// A ← A + a·B·C.
    pub fn add_product(&mut self, a: f64, b: &SqMatrix, c: &SqMatrix) {
        self.product_impl(1.0, a, b, c);
    }

    fn product_impl(&mut self, keep: f64, a: f64, b: &SqMatrix, c: &SqMatrix) {
        let p = self.dim;
        debug_assert_eq!(b.dim, p);
        debug_assert_eq!(c.dim, p);
        for j in 0..p {
            for i in 0..p {
                let mut acc = Complex64::ZERO;
                for k in 0..p {
                    acc += b.get(i, k) * c.get(k, j);
                }
                let old = self.get(i, j);
                self.set(i, j, keep * old + a * acc);
            }
        }
    }

    /// A ← (S + Sᴴ)/2.
    pub fn symmetrize_from(&mut self, src: &SqMatrix) {
        let p = self.dim;
        debug_assert_eq!(src.dim, p);
        for j in 0..p {
            for i in 0..p {
                let value = 0.5 * (src.get(i, j) + src.get(j, i).conj());
                self.set(i, j, value);
            }
        }
    }

    pub fn trace(&self) -> Complex64 {
        (0..self.dim).map(|i| self.get(i, i)).sum()
    }

    /// tr(AᴴB), the Frobenius inner product of A and B.
    pub fn trace_adjoint_prod(&self, other: &SqMatrix) -> Complex64 {
        debug_assert_eq!(self.dim, other.dim);
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a.conj() * b)
            .sum()
    }

    /// In-place inversion of a Hermitian positive-definite matrix.
    ///
    /// Factors A = L·Lᴴ, inverts the triangle, and assembles
    /// A⁻¹ = L⁻ᴴ·L⁻¹ without temporary storage. Fails if any pivot is
    /// non-positive.
    pub fn invert_hpd(&mut self) -> Result<(), EigenError> {
        let p = self.dim;

        // Cholesky factor, lower triangle in place.
        for j in 0..p {
            let mut diag = self.get(j, j).re;
            for k in 0..j {
                diag -= self.get(j, k).norm_sqr();
            }
            if !(diag > 0.0) || !diag.is_finite() {
                return Err(EigenError::IndefiniteGram);
            }
            let ljj = diag.sqrt();
            self.set(j, j, Complex64::new(ljj, 0.0));
            for i in (j + 1)..p {
                let mut sum = self.get(i, j);
                for k in 0..j {
                    sum -= self.get(i, k) * self.get(j, k).conj();
                }
                self.set(i, j, sum / ljj);
            }
        }

        // Invert L in place (column by column; entries above the diagonal
        // of column j are untouched until the assembly step).
        for j in 0..p {
            let inv_diag = 1.0 / self.get(j, j).re;
            self.set(j, j, Complex64::new(inv_diag, 0.0));
            for i in (j + 1)..p {
                let mut sum = Complex64::ZERO;
                for k in j..i {
                    sum += self.get(i, k) * self.get(k, j);
                }
                let value = -sum / self.get(i, i).re;
                self.set(i, j, value);
            }
        }

        // A⁻¹ = L⁻ᴴ·L⁻¹. Writing entry (i, j) with i < j lands in the
        // unused upper triangle, and the diagonal entry of a column is
        // consumed only by itself, so the assembly can run in place.
        for j in 0..p {
            for i in 0..=j {
                let mut acc = Complex64::ZERO;
                for k in j..p {
                    acc += self.get(k, i).conj() * self.get(k, j);
                }
                self.set(i, j, acc);
            }
        }

        // Mirror the Hermitian lower triangle.
        for j in 0..p {
            for i in (j + 1)..p {
                let value = self.get(j, i).conj();
                self.set(i, j, value);
            }
        }

        Ok(())
    }
}

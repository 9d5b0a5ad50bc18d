//! The Rayleigh trace along the line-search curve.
//!
//! With Y(θ) = cos θ · Y + (sin θ / ‖D‖) · D, the Gram and Rayleigh blocks
//! of Y(θ) are quadratic in (cos θ, sin θ), so the trace and its derivative
//! can be evaluated from six cached p×p matrices without touching the n×p
//! blocks again. Evaluation is allocation-free: the three scratch matrices
//! are borrowed from the driver.

use crate::{dense::SqMatrix, error::EigenError};

pub(crate) struct TraceFunc<'a> {
    /// ‖D‖ = √(tr(DᴴD)/p).
    pub d_norm: f64,
    pub ytay: &'a SqMatrix,
    pub dtad: &'a SqMatrix,
    pub sym_ytad: &'a SqMatrix,
    pub yty: &'a SqMatrix,
    pub dtd: &'a SqMatrix,
    pub sym_ytd: &'a SqMatrix,
    pub m1: &'a mut SqMatrix,
    pub m2: &'a mut SqMatrix,
    pub m3: &'a mut SqMatrix,
}

impl TraceFunc<'_> {
    /// f(θ) and, when requested, f′(θ).
    ///
    /// The arithmetic order matters: the derivative's sign and symmetry
    /// depend on assembling the rescaled difference blocks exactly as
    /// written here.
    pub fn eval(&mut self, theta: f64, want_derivative: bool) -> Result<(f64, f64), EigenError> {
        let c = theta.cos();
        let s = theta.sin() / self.d_norm;

        // M1 = YᴴY(θ), then inverted in place.
        self.m1.copy_from(self.yty);
        self.m1.scale_add(c * c, s * s, self.dtd);
        self.m1.add_scaled(2.0 * s * c, self.sym_ytd);
        self.m1.invert_hpd()?;

        // M2 = YᴴAY(θ).
        self.m2.copy_from(self.ytay);
        self.m2.scale_add(c * c, s * s, self.dtad);
        self.m2.add_scaled(2.0 * s * c, self.sym_ytad);

        let trace = self.m2.trace_adjoint_prod(self.m1).re;

        let mut deriv = 0.0;
        if want_derivative {
            let c2 = (2.0 * theta).cos();
            let s2 = (2.0 * theta).sin();
            let inv_dn2 = 1.0 / (self.d_norm * self.d_norm);

            self.m3.copy_from(self.ytay);
            self.m3.add_scaled(-inv_dn2, self.dtad);
            self.m3.scale_add(-0.5 * s2, c2 / self.d_norm, self.sym_ytad);

            deriv = self.m1.trace_adjoint_prod(self.m3).re;

            // Sandwich M1⁻¹·M2·M1⁻¹, built in two products.
            self.m3.set_product(self.m1, self.m2);
            self.m2.set_product(self.m3, self.m1);

            self.m3.copy_from(self.yty);
            self.m3.add_scaled(-inv_dn2, self.dtd);
            self.m3.scale_add(-0.5 * s2, c2 / self.d_norm, self.sym_ytd);

            deriv -= self.m2.trace_adjoint_prod(self.m3).re;
            deriv *= 2.0;
        }

        Ok((trace, deriv))
    }
}

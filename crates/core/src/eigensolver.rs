//! Block preconditioned conjugate-gradient minimization of the Rayleigh trace.
//!
//! Finds the p-dimensional invariant subspace belonging to the lowest
//! eigenvalues of a Hermitian operator A by minimizing the trace of the
//! Rayleigh quotient
//!
//! ```text
//! E(Y) = tr( (YᴴY)⁻¹ · YᴴAY )
//! ```
//!
//! over n×p blocks Y, a block generalization of Polak-Ribière /
//! Fletcher-Reeves nonlinear conjugate gradient with a unit-circle line
//! search Y(θ) = cos θ · Y + (sin θ / ‖D‖) · D. The block formulation
//! shares operator applications across columns and tolerates
//! non-orthonormal Y throughout; orthonormality is only restored when the
//! converged subspace is diagonalized by [`spectrum::resolve_eigenvalues`].
//!
//! # Module Structure
//!
//! - [`mod@linmin`]: the exact one-dimensional minimizer (bracket + Ridders)
//! - [`trace_func`]: the trace functional along the search curve
//! - [`spectrum`]: eigenvalue resolution from the converged subspace

pub mod linmin;
pub mod spectrum;
pub mod trace_func;

use log::{debug, info};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use std::f64::consts::PI;

use crate::{
    backend::{BlockBackend, BlockStore},
    dense::SqMatrix,
    error::EigenError,
    operator::{BlockConstraint, BlockOperator, BlockPreconditioner},
    timing::Timer,
};
use linmin::{initial_search_angle, linmin};
use trace_func::TraceFunc;

// ============================================================================
// Constants
// ============================================================================

/// Hard iteration cap; reaching it is a failure, not a result.
pub const MAX_ITERATIONS: usize = 10_000;

/// Seconds of wall clock between progress feedback lines when not verbose.
const FEEDBACK_SECS: f64 = 4.0;

/// Period of the optional conjugate-gradient direction reset.
const CG_RESET_ITERS: usize = 70;

/// Assumed convergence slowdown of the approximate line search. The exact
/// search is abandoned only for at least this factor of kernel-time gain.
const APPROX_SLOWDOWN_GUESS: f64 = 2.0;

/// Largest exact-linmin improvement at which one Newton step is still
/// considered a faithful substitute for the full search.
const APPROX_IMPROVEMENT_THRESHOLD: f64 = 0.05;

/// Absolute floor inside the relative convergence test.
const CONVERGENCE_EPSILON: f64 = 1e-7;

// ============================================================================
// Options & Result
// ============================================================================

/// Line-search strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineSearchPolicy {
    /// Start exact; let measured kernel timings decide per iteration.
    #[default]
    Auto,
    /// Pin the exact line search.
    ForceExact,
    /// Pin the approximate (single Newton step) line search.
    ForceApprox,
}

/// Solver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EigenOptions {
    /// Fractional convergence target on the Rayleigh trace.
    pub tolerance: f64,
    /// Emit a progress line every iteration instead of every few seconds.
    pub verbose: bool,
    /// Project the preconditioned gradient back onto the complement of Y:
    /// X ← (1 − Y·U·Yᴴ)·X.
    pub project_preconditioning: bool,
    /// Forget accumulated search directions every 70 iterations.
    pub reset_cg: bool,
    /// Line-search strategy.
    pub line_search: LineSearchPolicy,
    /// Record the per-iteration trace into the result (diagnostics).
    pub record_trace: bool,
}

impl Default for EigenOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-7,
            verbose: false,
            project_preconditioning: false,
            reset_cg: false,
            line_search: LineSearchPolicy::Auto,
            record_trace: false,
        }
    }
}

impl EigenOptions {
    /// Builder method: set tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Builder method: set the line-search policy.
    pub fn with_line_search(mut self, policy: LineSearchPolicy) -> Self {
        self.line_search = policy;
        self
    }

    /// Builder method: enable trace recording.
    pub fn with_trace_recording(mut self) -> Self {
        self.record_trace = true;
        self
    }
}

/// Result of a successful trace minimization.
#[derive(Debug, Clone)]
pub struct TraceMinResult {
    /// Eigenvalues in ascending order, aligned with the columns of Y.
    pub eigenvalues: Vec<f64>,
    /// Number of iterations performed.
    pub iterations: usize,
    /// The converged Rayleigh trace (sum of the eigenvalues).
    pub trace: f64,
    /// Per-iteration trace values; empty unless
    /// [`EigenOptions::record_trace`] was set.
    pub trace_history: Vec<f64>,
}

// ============================================================================
// Adaptive Line-Search Selection
// ============================================================================

/// Measured per-kernel seconds from the current iteration.
#[derive(Debug, Clone, Copy, Default)]
struct KernelTimes {
    /// A applied to a block.
    apply: f64,
    /// Preconditioner applied to the gradient.
    precondition: f64,
    /// XᴴY inner product block.
    inner_xty: f64,
    /// Block-times-small-matrix product.
    product_ys: f64,
    /// XᴴX Gram block.
    gram_xtx: f64,
    /// The whole exact line search.
    linmin: f64,
}

impl KernelTimes {
    /// Modelled cost of an iteration with the exact line search.
    fn exact_cost(&self) -> f64 {
        2.0 * self.apply
            + self.precondition
            + 4.0 * self.inner_xty
            + 2.0 * self.product_ys
            + 2.0 * self.gram_xtx
            + self.linmin
    }

    /// Modelled cost of an iteration with the approximate line search.
    fn approx_cost(&self) -> f64 {
        2.0 * self.apply
            + self.precondition
            + 2.0 * self.inner_xty
            + 2.0 * self.product_ys
            + 2.0 * self.gram_xtx
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchKind {
    Exact,
    Approx,
}

/// The line-search strategy state machine.
///
/// Transitions are driven by measured kernel times and by the reliability
/// of the last approximate step; all the state lives here rather than in
/// scattered booleans.
#[derive(Debug)]
struct LinminScheduler {
    kind: SearchKind,
    revert_to_exact: bool,
}

impl LinminScheduler {
    fn new() -> Self {
        Self {
            kind: SearchKind::Exact,
            revert_to_exact: false,
        }
    }

    /// Strategy for the iteration about to start. A pending revert from an
    /// unreliable quadratic fit wins once, even over `ForceApprox`, so a
    /// forced-approximate run cannot spin without progress.
    fn begin_iteration(&mut self, policy: LineSearchPolicy) -> SearchKind {
        if self.revert_to_exact {
            self.revert_to_exact = false;
            self.kind = SearchKind::Exact;
        } else {
            match policy {
                LineSearchPolicy::ForceApprox => self.kind = SearchKind::Approx,
                LineSearchPolicy::ForceExact => self.kind = SearchKind::Exact,
                LineSearchPolicy::Auto => {}
            }
        }
        self.kind
    }

    /// The Newton fit disagreed with itself; run the exact search next.
    fn note_unreliable_fit(&mut self) {
        self.revert_to_exact = true;
    }

    /// End-of-iteration transition: abandon the exact search only when it
    /// was barely improving on one Newton step and its modelled cost
    /// clearly dominates.
    fn end_iteration(
        &mut self,
        policy: LineSearchPolicy,
        times: &KernelTimes,
        improvement: Option<f64>,
        projected_preconditioning: bool,
    ) {
        if policy == LineSearchPolicy::ForceExact {
            self.kind = SearchKind::Exact;
            return;
        }
        let mut t_exact = times.exact_cost();
        let mut t_approx = times.approx_cost();
        if projected_preconditioning {
            t_exact += times.inner_xty + times.product_ys;
            t_approx += times.inner_xty + times.product_ys;
        }
        let favor_approx =
            matches!(improvement, Some(imp) if imp > 0.0 && imp <= APPROX_IMPROVEMENT_THRESHOLD)
                && t_exact > t_approx * APPROX_SLOWDOWN_GUESS;
        if favor_approx {
            if self.kind == SearchKind::Exact {
                debug!(
                    "switching to approximate line minimization ({:.1}% kernel time saved)",
                    (t_exact - t_approx) * 100.0 / t_exact
                );
            }
            self.kind = SearchKind::Approx;
        } else {
            if self.kind == SearchKind::Approx {
                debug!("switching back to exact line minimization");
            }
            self.kind = SearchKind::Exact;
        }
    }
}

// ============================================================================
// The Driver
// ============================================================================

/// Minimize the Rayleigh trace of `operator` over the block `y`.
///
/// On entry `y` holds the initial guess; on successful return it spans the
/// invariant subspace of the lowest eigenvalues, with columns rotated to
/// align with the returned ascending eigenvalues.
///
/// # Arguments
/// - `y`: the n×p iterate, owned by the caller and updated in place.
/// - `operator`: the Hermitian operator A.
/// - `preconditioner`: optional K ≈ A⁻¹ applied to the gradient.
/// - `constraint`: optional idempotent projection applied to Y after every
///   update (and once on entry).
/// - `work`: caller-owned scratch blocks, each shaped like `y`. Index 0 is
///   the gradient, index 1 the preconditioned gradient; index 2, when
///   present, enables conjugate-gradient directions, and index 3 enables
///   the Polak-Ribière variant (otherwise Fletcher-Reeves).
/// - `options`: tolerance and behavior flags.
///
/// # Errors
/// [`EigenError::InsufficientWorkspace`] for fewer than two work blocks,
/// [`EigenError::DivergentTrace`] if the trace turns non-finite,
/// [`EigenError::NonConvergence`] after [`MAX_ITERATIONS`], and the
/// line-search errors of [`linmin::linmin`].
pub fn minimize_trace<B, O>(
    y: &mut B::Block,
    operator: &mut O,
    mut preconditioner: Option<&mut dyn BlockPreconditioner<B>>,
    mut constraint: Option<&mut dyn BlockConstraint<B>>,
    work: &mut [B::Block],
    options: &EigenOptions,
) -> Result<TraceMinResult, EigenError>
where
    B: BlockBackend,
    O: BlockOperator<B>,
{
    let p = y.cols();
    let nwork = work.len();
    if nwork < 2 {
        return Err(EigenError::InsufficientWorkspace { got: nwork });
    }

    let (g_slice, rest) = work.split_at_mut(1);
    let g = &mut g_slice[0];
    let (x_slice, rest) = rest.split_at_mut(1);
    let x = &mut x_slice[0];
    let (d_slice, rest) = rest.split_at_mut(rest.len().min(1));
    let mut d = d_slice.first_mut();
    let mut prev_g = rest.first_mut();

    // Accumulated CG state starts from zero.
    if let Some(d_block) = &mut d {
        d_block.as_mut_slice().fill(Complex64::ZERO);
    }
    if let Some(pg) = &mut prev_g {
        pg.as_mut_slice().fill(Complex64::ZERO);
    }

    // p×p state. ytayu holds YᴴAY·U for most of an iteration and doubles
    // as trace-functional scratch inside the exact line search.
    let mut ytayu = SqMatrix::zeros(p);
    let mut dtad = SqMatrix::zeros(p);
    let mut sym_ytad = SqMatrix::zeros(p);
    let mut yty = SqMatrix::zeros(p);
    let mut u = SqMatrix::zeros(p);
    let mut dtd = SqMatrix::zeros(p);
    let mut sym_ytd = SqMatrix::zeros(p);
    let mut s1 = SqMatrix::zeros(p);
    let mut s2 = SqMatrix::zeros(p);
    let mut s3 = SqMatrix::zeros(p);

    let mut e = 0.0;
    let mut prev_e = 0.0;
    let mut prev_trace_gtx = 0.0;
    let mut prev_theta: f64 = 0.5;
    let mut linmin_improvement: Option<f64> = None;
    let mut times = KernelTimes::default();
    let mut scheduler = LinminScheduler::new();
    let mut trace_history = Vec::new();

    let backend = operator.backend().clone();

    if let Some(c) = &mut constraint {
        c.project(&backend, y);
    }

    let mut feedback_timer = Timer::start();
    let mut iteration = 0usize;

    let converged = 'iter: loop {
        let search = scheduler.begin_iteration(options.line_search);

        let clock = Timer::start();
        backend.xtx(&mut yty, y);
        times.gram_xtx = clock.elapsed_secs();

        // Keep the global column scale bounded.
        let y_norm = (yty.trace().re / p as f64).sqrt();
        backend.scal(1.0 / y_norm, y);
        yty.scale(1.0 / (y_norm * y_norm));

        u.copy_from(&yty);
        u.invert_hpd()?;

        let clock = Timer::start();
        operator.apply(y, x, Some(&mut *g), true);
        times.apply = clock.elapsed_secs();

        // G = A·Y·U; U is Hermitian.
        let clock = Timer::start();
        backend.xe_ys(g, x, &u, true);
        times.product_ys = clock.elapsed_secs();

        let clock = Timer::start();
        backend.xty(&mut ytayu, y, g);
        times.inner_xty = clock.elapsed_secs();

        e = ytayu.trace().re;
        if !e.is_finite() {
            return Err(EigenError::DivergentTrace { iteration });
        }
        if options.record_trace {
            trace_history.push(e);
        }

        if iteration > 0
            && (e - prev_e).abs()
                < options.tolerance * 0.5 * (e.abs() + prev_e.abs() + CONVERGENCE_EPSILON)
        {
            break 'iter true;
        }

        if options.verbose || feedback_timer.elapsed_secs() > FEEDBACK_SECS {
            info!(
                "iteration {:>4}: trace = {:.10e} ({:.3}% change)",
                iteration + 1,
                e,
                200.0 * (e - prev_e).abs() / (e.abs() + prev_e.abs())
            );
            feedback_timer = Timer::start();
        }

        // Euclidean gradient of the trace in the non-orthonormal basis:
        // G ← (1 − Y·U·Yᴴ)·A·Y·U, i.e. G − Y·(U·YᴴAY·U).
        s1.set_product(&u, &ytayu);
        backend.xpa_ys(g, -1.0, y, &s1);

        // X ← K·G, or plain G without a preconditioner.
        if let Some(k) = &mut preconditioner {
            let clock = Timer::start();
            k.apply(&backend, g, x, y, None, &yty);
            times.precondition = clock.elapsed_secs();
        } else {
            backend.copy(x, g);
            times.precondition = 0.0;
        }

        if options.project_preconditioning {
            // X ← X − Y·(U·YᴴX).
            backend.xty(&mut sym_ytd, y, x);
            s1.set_product(&u, &sym_ytd);
            backend.xpa_ys(x, -1.0, y, &s1);
        }

        // Search direction: D = γ·D + X, or just X without CG blocks.
        let trace_gtx = backend.trace_xty(g, x).re;
        if d.is_some() {
            let gamma_numerator = if let Some(pg) = &mut prev_g {
                // Polak-Ribière: G ← G − prev_G and prev_G ← old G in one
                // fused traversal, so no extra n×p block is needed.
                for (g_val, prev_val) in g
                    .as_mut_slice()
                    .iter_mut()
                    .zip(pg.as_mut_slice().iter_mut())
                {
                    let fresh = *g_val;
                    *g_val -= *prev_val;
                    *prev_val = fresh;
                }
                backend.trace_xty(g, x).re
            } else {
                // Fletcher-Reeves.
                trace_gtx
            };

            let mut gamma = if prev_trace_gtx == 0.0 {
                0.0
            } else {
                gamma_numerator / prev_trace_gtx
            };
            if options.reset_cg && (iteration + 1) % CG_RESET_ITERS == 0 {
                gamma = 0.0;
                debug!("resetting conjugate-gradient direction");
            }

            if let Some(d_block) = &mut d {
                backend.axpby(gamma, d_block, 1.0, x);
            }
        }

        let theta;
        match search {
            SearchKind::Approx => {
                // One Newton step on a two-point quadratic fit along D.
                let (d_norm, de) = {
                    let dir: &B::Block = match &d {
                        Some(dd) => &**dd,
                        None => &*x,
                    };
                    // prev_G holds the unmodified gradient when the
                    // Polak-Ribière update has rewritten G.
                    let grad: &B::Block = match &prev_g {
                        Some(pg) => &**pg,
                        None => &*g,
                    };
                    let d_norm = (backend.trace_xty(dir, dir).re / p as f64).sqrt();
                    let de = 2.0 * backend.trace_xty(grad, dir).re / d_norm;
                    (d_norm, de)
                };

                // Probe downhill by the previously accepted angle.
                let t = if de < 0.0 {
                    prev_theta.abs()
                } else {
                    -prev_theta.abs()
                };
                {
                    let dir: &B::Block = match &d {
                        Some(dd) => &**dd,
                        None => &*x,
                    };
                    backend.axpby(1.0, y, t / d_norm, dir);
                }

                backend.xtx(&mut u, y);
                u.invert_hpd()?;
                // Without CG blocks the direction *is* X, so no scratch
                // can be spared for the operator.
                match &mut d {
                    Some(_) => operator.apply(y, g, Some(&mut *x), true),
                    None => operator.apply(y, g, None, true),
                }
                backend.xty(&mut s1, y, g);
                let e2 = s1.trace_adjoint_prod(&u).re;

                // Fit E(θ) ≈ E + dE·θ + ½·d2E·θ², solve for the vertex.
                let d2e = (e2 - e - de * t) / (0.5 * t * t);
                let theta_guess = -de / d2e;

                if d2e < 0.0 || -0.5 * de * theta_guess > 20.0 * (e - prev_e).abs() {
                    // The fit is not trustworthy. Undo the probe and let
                    // the next iteration run the exact search from the
                    // unchanged iterate.
                    debug!(
                        "approximate line minimization unreliable \
                         (dE = {de:.3e}, d2E = {d2e:.3e}, θ = {theta_guess:.3e}); \
                         deferring to exact"
                    );
                    let dir: &B::Block = match &d {
                        Some(dd) => &**dd,
                        None => &*x,
                    };
                    backend.axpby(1.0, y, -t / d_norm, dir);
                    scheduler.note_unreliable_fit();
                    iteration += 1;
                    if iteration >= MAX_ITERATIONS {
                        break 'iter false;
                    }
                    continue 'iter;
                }

                let dir: &B::Block = match &d {
                    Some(dd) => &**dd,
                    None => &*x,
                };
                backend.axpby(1.0, y, (theta_guess - t) / d_norm, dir);
                theta = theta_guess;
                // One Newton step measures no improvement of its own; the
                // scheduler cannot justify staying approximate from this
                // iteration alone.
                linmin_improvement = None;
            }
            SearchKind::Exact => {
                // G ← A·D, with X as operator scratch when D is its own
                // block.
                match &mut d {
                    Some(dd) => operator.apply(&**dd, g, Some(&mut *x), false),
                    None => operator.apply(&*x, g, None, false),
                }
                let dir: &B::Block = match &d {
                    Some(dd) => &**dd,
                    None => &*x,
                };

                backend.xtx(&mut dtd, dir);
                let d_norm2 = dtd.trace().re / p as f64;
                let d_norm = d_norm2.sqrt();

                backend.xty(&mut dtad, dir, g);

                backend.xty(&mut s1, y, dir);
                sym_ytd.symmetrize_from(&s1);
                backend.xty(&mut s1, y, g);
                sym_ytad.symmetrize_from(&s1);

                // Derivatives of the trace at θ = 0.
                s1.set_product(&u, &sym_ytd);
                let de = 2.0
                    * (u.trace_adjoint_prod(&sym_ytad).re - ytayu.trace_adjoint_prod(&s1).re)
                    / d_norm;

                s2.copy_from(&dtd);
                s2.add_product(-4.0, &sym_ytd, &s1);
                s3.set_product(&sym_ytad, &s1);
                s1.set_product(&u, &s2);
                let d2e = 2.0
                    * (u.trace_adjoint_prod(&dtad).re
                        - ytayu.trace_adjoint_prod(&s1).re
                        - 4.0 * u.trace_adjoint_prod(&s3).re)
                    / d_norm2;

                let theta0 = initial_search_angle(de, d2e, prev_theta, e - prev_e);

                // YᴴAY for the trace functional: (YᴴAY·U)·(YᴴY).
                s1.set_product(&ytayu, &yty);

                let clock = Timer::start();
                let mut objective = TraceFunc {
                    d_norm,
                    ytay: &s1,
                    dtad: &dtad,
                    sym_ytad: &sym_ytad,
                    yty: &yty,
                    dtd: &dtd,
                    sym_ytd: &sym_ytd,
                    m1: &mut ytayu,
                    m2: &mut s2,
                    m3: &mut s3,
                };
                let xmax = if de > 0.0 { -PI } else { PI };
                let found = linmin(0.0, e, de, xmax, theta0, options.tolerance, |angle, want| {
                    objective.eval(angle, want)
                })?;
                times.linmin = clock.elapsed_secs();

                theta = found.x;
                linmin_improvement = Some(found.improvement);

                backend.axpby(theta.cos(), y, theta.sin() / d_norm, dir);
            }
        }

        if let Some(c) = &mut constraint {
            c.project(&backend, y);
        }

        prev_trace_gtx = trace_gtx;
        prev_theta = theta;
        prev_e = e;

        scheduler.end_iteration(
            options.line_search,
            &times,
            linmin_improvement,
            options.project_preconditioning,
        );

        iteration += 1;
        if iteration >= MAX_ITERATIONS {
            break 'iter false;
        }
    };

    if !converged {
        return Err(EigenError::NonConvergence(MAX_ITERATIONS));
    }

    let eigenvalues = spectrum::resolve_eigenvalues(&backend, operator, y, g, x)?;

    Ok(TraceMinResult {
        eigenvalues,
        iterations: iteration,
        trace: e,
        trace_history,
    })
}

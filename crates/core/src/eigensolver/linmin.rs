//! One-dimensional exact line minimization.
//!
//! Two pieces live here: the Newton-step clamps that produce a safe
//! initial angle from the trace derivatives, and `linmin` itself, a
//! bracketing scan followed by Ridders' root finding on the derivative.

use log::debug;

use std::f64::consts::PI;

use crate::error::EigenError;

/// Outcome of a line minimization.
#[derive(Debug, Clone, Copy)]
pub struct LinminResult {
    /// The minimizing abscissa.
    pub x: f64,
    /// Fractional decrease relative to the first evaluated guess:
    /// 2·(f_start − f_final) / (|f_start| + |f_final| + tol).
    pub improvement: f64,
}

/// Clamp the Newton step θ = −dE/d2E into a usable initial angle.
///
/// Three guards, all load-bearing on indefinite curvature:
/// negative second derivative (near a trace maximum), an oversized
/// predicted trace change, and |θ| ≥ π. The fallback in the first and
/// third cases is the previous accepted angle, signed downhill.
pub(crate) fn initial_search_angle(
    de: f64,
    d2e: f64,
    prev_theta: f64,
    energy_change: f64,
) -> f64 {
    let downhill = if de > 0.0 {
        -prev_theta.abs()
    } else {
        prev_theta.abs()
    };

    let mut theta = -de / d2e;
    if d2e < 0.0 {
        debug!("line search near a trace maximum (d2E = {d2e:.3e})");
        theta = downhill;
    } else if -0.5 * de * theta > 2.0 * energy_change.abs() {
        debug!(
            "large trace change predicted (ΔE ≈ {:.3e})",
            -0.5 * de * theta
        );
    }
    if theta.abs() >= PI {
        debug!("oversized search angle ({theta:.3}), falling back");
        theta = downhill;
    }
    theta
}

/// Minimize a one-dimensional function to a fractional tolerance in x.
///
/// `func(x, want_derivative)` returns (f, f′); the derivative slot is
/// meaningful only when requested. The minimum is sought between `xmin`
/// and `xmax` with `x0` an initial guess; `f_xmin`/`df_xmin` are the
/// function and derivative at `xmin`. `x0` must lie downhill from `xmin`
/// and `xmax` downhill from `x0`; for df_xmin > 0 the bracket runs
/// backwards, xmax < x0 < xmin.
///
/// A zero derivative at `xmin` means `xmin` already minimizes: it is
/// returned immediately with zero improvement.
pub fn linmin<F>(
    mut xmin: f64,
    f_xmin: f64,
    mut df_xmin: f64,
    mut xmax: f64,
    mut x0: f64,
    tolerance: f64,
    mut func: F,
) -> Result<LinminResult, EigenError>
where
    F: FnMut(f64, bool) -> Result<(f64, f64), EigenError>,
{
    if df_xmin == 0.0 {
        return Ok(LinminResult {
            x: xmin,
            improvement: 0.0,
        });
    }
    if df_xmin * (x0 - xmin) >= 0.0 {
        return Err(EigenError::BadBracket { xmin, x0, df_xmin });
    }
    let s = if xmax > xmin { 1.0 } else { -1.0 };
    if !(x0 * s < xmax * s && x0 * s > xmin * s) {
        return Err(EigenError::GuessOutOfRange { xmin, xmax, x0 });
    }

    // Phase 1: bracket the minimum by scanning downhill in steps of
    // 2·(x0 − xmin) until the derivative changes sign. If the scan runs
    // past xmax, halve x0 toward xmin and rescan.
    let mut df_xmax;
    loop {
        let mut xmin2 = xmin;
        let mut df_xmin2 = df_xmin;
        let dx = (x0 - xmin) * 2.0;
        let mut x = xmin + dx;
        let mut bracket = None;
        while x * s <= xmax * s {
            let (_f, df) = func(x, true)?;
            if df * (x - xmin) > 0.0 {
                bracket = Some(df);
                break;
            }
            xmin2 = x;
            df_xmin2 = df;
            x += dx;
        }
        if let Some(df) = bracket {
            xmin = xmin2;
            df_xmin = df_xmin2;
            xmax = x;
            df_xmax = df;
            break;
        }
        x0 = 0.5 * (x0 + xmin);
        if (x0 - xmin).abs() <= tolerance * (x0.abs() + tolerance) {
            return Err(EigenError::BracketFailure { tolerance });
        }
    }

    if x0 * s <= xmin * s || x0 * s >= xmax * s {
        x0 = 0.5 * (xmin + xmax);
    }

    // Phase 2: Ridders' method on the derivative. Canonicalize the
    // bracket so xmin < xmax first.
    if xmin > xmax {
        std::mem::swap(&mut xmin, &mut xmax);
        std::mem::swap(&mut df_xmin, &mut df_xmax);
    }

    let mut x_prev = x0;
    let mut f_xstart = f_xmin;
    let mut is_xstart = true;
    let x_final = loop {
        let (f_x0, df_x0) = func(x0, true)?;
        if is_xstart {
            f_xstart = f_x0;
            is_xstart = false;
        }

        if df_x0 == 0.0 {
            break x0;
        }
        if df_xmin == 0.0 {
            break xmin;
        }
        if df_xmax == 0.0 {
            break xmax;
        }

        let side = if df_xmin > df_xmax { 1.0 } else { -1.0 };
        let x = x0 + (x0 - xmin) * side * df_x0 / (df_x0 * df_x0 - df_xmin * df_xmax).sqrt();

        if (x - x_prev)
            .abs()
            .max((x - xmin).abs().min((x - xmax).abs()))
            < tolerance * (x.abs() + tolerance)
        {
            break x;
        }

        let (_f, df) = func(x, true)?;

        // Rebracket. The first case covers a same-signed or non-monotone
        // derivative pair; the second a clean sign crossing between x
        // and x0.
        if df * df_x0 > 0.0 || (df - df_x0) * (x - x0) < 0.0 {
            if x < x0 {
                if df_xmin * df > 0.0 || (df_xmin - df) * (xmin - x) < 0.0 {
                    xmin = x0;
                    df_xmin = df_x0;
                } else {
                    xmax = x;
                    df_xmax = df;
                }
            } else if df_xmin * df_x0 > 0.0 || (df_xmin - df_x0) * (xmin - x0) < 0.0 {
                xmin = x;
                df_xmin = df;
            } else {
                xmax = x0;
                df_xmax = df_x0;
            }
        } else if x < x0 {
            xmin = x;
            df_xmin = df;
            xmax = x0;
            df_xmax = df_x0;
        } else {
            xmin = x0;
            df_xmin = df_x0;
            xmax = x;
            df_xmax = df;
        }

        x0 = 0.5 * (xmin + xmax);
        x_prev = x;
    };

    let (f_final, _) = func(x_final, false)?;
    let improvement = (f_xstart - f_final) * 2.0 / (f_xstart.abs() + f_final.abs() + tolerance);

    Ok(LinminResult {
        x: x_final,
        improvement,
    })
}

//! # Bounded proportional controller module
//!
//! A single axis proportional law whose output never implies exceeding a
//! given second derivative. Close to the setpoint the law is linear, further
//! out the output follows a square root curve so that the rate of change of
//! the output (for example the acceleration implied by a velocity demand) is
//! bounded. The two regions meet with matching value and slope.
//!
//! The inverse mapping, from an output to the error which would produce it,
//! is used to turn velocity limits into error limits ahead of time so that
//! targets can be re-anchored before the output saturates.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod controller;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use controller::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use util::maths::{is_negative, is_positive, is_zero, safe_sqrt};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Proportional controller with a square root section which constrains the
/// second derivative of the output to `d_max`.
///
/// If `d_max` is not positive the law is purely linear. If `p` is zero the
/// law is a pure square root. If `dt` is positive the output is limited so
/// that it cannot overshoot the whole error within one step.
pub fn sqrt_controller(error: f64, p: f64, d_max: f64, dt: f64) -> f64 {
    let output = if !is_positive(d_max) {
        error * p
    }
    else if is_zero(p) {
        if is_positive(error) {
            safe_sqrt(2.0 * d_max * error)
        }
        else if is_negative(error) {
            -safe_sqrt(-2.0 * d_max * error)
        }
        else {
            0.0
        }
    }
    else {
        let linear_dist = d_max / (p * p);
        if error > linear_dist {
            safe_sqrt(2.0 * d_max * (error - 0.5 * linear_dist))
        }
        else if error < -linear_dist {
            -safe_sqrt(2.0 * d_max * (-error - 0.5 * linear_dist))
        }
        else {
            error * p
        }
    };

    if dt > 0.0 {
        let max_output = error.abs() / dt;
        output.max(-max_output).min(max_output)
    }
    else {
        output
    }
}

/// Inverse of `sqrt_controller` (without the timestep limit).
///
/// Returns the error which would produce `output`, with the same sign as
/// `output`. If both `p` and `d_max` are zero no error can produce an output
/// and zero is returned.
pub fn inv_sqrt_controller(output: f64, p: f64, d_max: f64) -> f64 {
    let out = output.abs();

    let error = if !is_positive(d_max) && is_zero(p) {
        0.0
    }
    else if !is_positive(d_max) {
        out / p
    }
    else if is_zero(p) {
        out * out / (2.0 * d_max)
    }
    else {
        let linear_out = d_max / p;
        if out > linear_out {
            out * out / (2.0 * d_max) + d_max / (2.0 * p * p)
        }
        else {
            out / p
        }
    };

    if output < 0.0 {
        -error
    }
    else {
        error
    }
}

/// Clamp an error to `[min, max]`.
///
/// Returns the clamped error along with flags marking whether the lower or
/// upper bound was hit.
pub fn limit_error(error: f64, min: f64, max: f64) -> (f64, bool, bool) {
    let mut limited = error;
    let mut limit_min = false;
    let mut limit_max = false;

    if limited < min {
        limited = min;
        limit_min = true;
    }
    if limited > max {
        limited = max;
        limit_max = true;
    }

    (limited, limit_min, limit_max)
}

#[cfg(test)]
mod test {
    use super::*;

    /// Representative (error, p, d_max) combinations
    const CASES: [(f64, f64, f64); 10] = [
        (0.5, 1.0, 2.0),
        (-0.5, 1.0, 2.0),
        (10.0, 1.0, 2.0),
        (-10.0, 1.0, 2.0),
        (3.0, 0.0, 2.0),
        (-3.0, 0.0, 2.0),
        (3.0, 2.0, 0.0),
        (-3.0, 2.0, 0.0),
        (250.0, 0.5, 5.0),
        (0.0, 1.0, 1.0)
    ];

    #[test]
    fn test_linear_region() {
        assert_eq!(sqrt_controller(0.5, 2.0, 0.0, 0.0), 1.0);
        assert_eq!(sqrt_controller(-0.5, 2.0, -1.0, 0.0), -1.0);

        // Linear distance is d/p^2 = 2
        assert_eq!(sqrt_controller(1.5, 1.0, 2.0, 0.0), 1.5);
    }

    #[test]
    fn test_sqrt_region() {
        // Outside the linear region output = sqrt(2d(e - d/2p^2))
        let out = sqrt_controller(10.0, 1.0, 2.0, 0.0);
        assert!((out - (2.0 * 2.0 * 9.0f64).sqrt()).abs() < 1e-12);

        let out = sqrt_controller(-10.0, 1.0, 2.0, 0.0);
        assert!((out + 6.0).abs() < 1e-12);

        // Pure sqrt law with no gain
        assert!((sqrt_controller(4.0, 0.0, 2.0, 0.0) - 4.0).abs() < 1e-12);
        assert_eq!(sqrt_controller(0.0, 0.0, 2.0, 0.0), 0.0);
    }

    #[test]
    fn test_region_boundary_is_continuous() {
        let (p, d) = (1.5, 3.0);
        let edge = d / (p * p);
        let below = sqrt_controller(edge - 1e-9, p, d, 0.0);
        let above = sqrt_controller(edge + 1e-9, p, d, 0.0);
        assert!((below - above).abs() < 1e-6);

        // Slopes match as well
        let slope_above = (sqrt_controller(edge + 1e-6, p, d, 0.0) - above) / (1e-6 - 1e-9);
        assert!((slope_above - p).abs() < 1e-3);
    }

    #[test]
    fn test_dt_limit() {
        for &(e, p, d) in CASES.iter() {
            for &dt in [0.01, 0.1, 1.0, 10.0].iter() {
                let out = sqrt_controller(e, p, d, dt);
                assert!(out.abs() <= e.abs() / dt + 1e-12, "{:?} dt={}", (e, p, d), dt);
            }
        }

        // Large gain with a long step is cut down to the error per step
        assert_eq!(sqrt_controller(1.0, 100.0, 0.0, 0.5), 2.0);
    }

    #[test]
    fn test_inverse() {
        for &(e, p, d) in CASES.iter() {
            let out = sqrt_controller(e, p, d, 0.0);
            let inv = inv_sqrt_controller(out, p, d);
            assert!((inv - e).abs() < 1e-9 * (1.0 + e.abs()), "{:?}: {} != {}", (e, p, d), inv, e);
        }

        // And the other way round
        for &out in [-7.0, -0.1, 0.0, 0.3, 12.0].iter() {
            let e = inv_sqrt_controller(out, 0.8, 1.5);
            assert!((sqrt_controller(e, 0.8, 1.5, 0.0) - out).abs() < 1e-9);
        }
    }

    #[test]
    fn test_inverse_degenerate() {
        assert_eq!(inv_sqrt_controller(5.0, 0.0, 0.0), 0.0);
        assert_eq!(inv_sqrt_controller(-5.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_limit_error() {
        assert_eq!(limit_error(0.5, -1.0, 1.0), (0.5, false, false));
        assert_eq!(limit_error(-2.0, -1.0, 1.0), (-1.0, true, false));
        assert_eq!(limit_error(3.0, -1.0, 2.0), (2.0, false, true));
    }
}

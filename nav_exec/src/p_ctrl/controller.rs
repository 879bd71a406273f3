//! Bounded proportional controller state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use super::{inv_sqrt_controller, limit_error, sqrt_controller};
use util::maths::is_positive;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// First derivative limit used until `set_limits` is called.
pub const DEFAULT_D_OUT_MAX: f64 = 10.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Persistent gains of a `BoundedPController`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PGains {
    /// Proportional gain
    pub k_p: f64
}

/// A proportional controller on a single axis whose output is bounded by a
/// first derivative limit.
#[derive(Debug, Clone)]
pub struct BoundedPController {
    /// Proportional gain
    kp: f64,

    /// Timestep used to limit the output, zero disables the limit.
    dt: f64,

    /// Lowest error before the target is re-anchored
    error_min: f64,

    /// Highest error before the target is re-anchored
    error_max: f64,

    /// Limit on the first derivative of the output
    d_out_max: f64,

    /// Error from the most recent update, after limiting
    error: f64
}

/// Output of a single controller update.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct PUpdate {
    pub output: f64,

    /// True if the error was limited by the lower bound
    pub limit_min: bool,

    /// True if the error was limited by the upper bound
    pub limit_max: bool
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BoundedPController {
    /// Create a new controller with unbounded error.
    pub fn new(kp: f64, dt: f64) -> Self {
        Self {
            kp,
            dt,
            error_min: f64::NEG_INFINITY,
            error_max: f64::INFINITY,
            d_out_max: DEFAULT_D_OUT_MAX,
            error: 0.0
        }
    }

    /// Create a new controller from stored gains.
    pub fn from_gains(gains: &PGains, dt: f64) -> Self {
        Self::new(gains.k_p, dt)
    }

    /// Get the gains for storage.
    pub fn gains(&self) -> PGains {
        PGains {
            k_p: self.kp
        }
    }

    /// Change the gain and timestep, keeping the limits.
    ///
    /// Limits depend on the gain, so `set_limits` should be called again if
    /// the gain has changed.
    pub fn reconfigure(&mut self, kp: f64, dt: f64) {
        self.kp = kp;
        self.dt = dt;
    }

    /// Set the limits of the controller.
    ///
    /// The error bounds are the errors which would produce `output_min` and
    /// `output_max`. If `d2_out_max` is positive the first derivative limit
    /// is reduced so that the second derivative is not exceeded either.
    pub fn set_limits(
        &mut self,
        output_min: f64,
        output_max: f64,
        d_out_max: f64,
        d2_out_max: f64
    ) {
        self.d_out_max = d_out_max;
        if is_positive(d2_out_max) && is_positive(self.kp) {
            self.d_out_max = self.d_out_max.min(d2_out_max / self.kp);
        }

        self.error_min = inv_sqrt_controller(output_min, self.kp, self.d_out_max);
        self.error_max = inv_sqrt_controller(output_max, self.kp, self.d_out_max);
    }

    /// Run the controller on the error between `target` and `measurement`.
    ///
    /// If the error exceeds the limits the target is moved towards the
    /// measurement until the error is within them.
    pub fn update(&mut self, target: &mut f64, measurement: f64) -> PUpdate {
        let (error, limit_min, limit_max) = limit_error(
            *target - measurement,
            self.error_min,
            self.error_max
        );

        if limit_min || limit_max {
            *target = measurement + error;
        }

        self.error = error;

        PUpdate {
            output: sqrt_controller(error, self.kp, self.d_out_max, self.dt),
            limit_min,
            limit_max
        }
    }

    /// Proportional term from the most recent update.
    pub fn get_p(&self) -> f64 {
        self.error * self.kp
    }

    pub fn kp(&self) -> f64 {
        self.kp
    }

    pub fn d_out_max(&self) -> f64 {
        self.d_out_max
    }

    /// The (min, max) error bounds.
    pub fn error_limits(&self) -> (f64, f64) {
        (self.error_min, self.error_max)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unlimited_update() {
        let mut ctrl = BoundedPController::new(2.0, 0.0);
        let mut target = 1.0;
        let upd = ctrl.update(&mut target, 0.5);

        assert_eq!(target, 1.0);
        assert!(!upd.limit_min && !upd.limit_max);
        assert_eq!(upd.output, 1.0);
        assert_eq!(ctrl.get_p(), 1.0);
    }

    #[test]
    fn test_limits_are_independent() {
        let mut ctrl = BoundedPController::new(1.0, 0.0);
        ctrl.set_limits(-1.0, 4.0, 2.0, 0.0);

        let (min, max) = ctrl.error_limits();
        assert_eq!(min, -1.0);
        // Output of 4 is in the sqrt region: 16/4 + 2/2
        assert!((max - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_second_derivative_limit() {
        let mut ctrl = BoundedPController::new(2.0, 0.0);
        ctrl.set_limits(-1.0, 1.0, 5.0, 4.0);
        assert_eq!(ctrl.d_out_max(), 2.0);

        // Without a gain the second derivative cannot be applied
        let mut ctrl = BoundedPController::new(0.0, 0.0);
        ctrl.set_limits(-1.0, 1.0, 5.0, 4.0);
        assert_eq!(ctrl.d_out_max(), 5.0);
    }

    #[test]
    fn test_limited_update_reanchors_target() {
        let mut ctrl = BoundedPController::new(1.0, 0.0);
        ctrl.set_limits(-1.0, 1.0, 10.0, 0.0);

        let mut target = 0.0;
        let upd = ctrl.update(&mut target, 3.0);
        assert!(upd.limit_min);
        assert!(!upd.limit_max);
        assert_eq!(target, 2.0);
        assert_eq!(upd.output, -1.0);

        let mut target = 10.0;
        let upd = ctrl.update(&mut target, 3.0);
        assert!(upd.limit_max);
        assert_eq!(target, 4.0);
        assert_eq!(upd.output, 1.0);
    }

    #[test]
    fn test_reconfigure_keeps_limits() {
        let mut ctrl = BoundedPController::from_gains(&PGains { k_p: 1.0 }, 0.1);
        ctrl.set_limits(-1.0, 1.0, 10.0, 0.0);
        ctrl.reconfigure(3.0, 0.01);

        assert_eq!(ctrl.gains(), PGains { k_p: 3.0 });
        assert_eq!(ctrl.error_limits(), (-1.0, 1.0));
    }
}

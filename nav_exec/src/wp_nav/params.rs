//! Waypoint navigation parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Minimum speed in any direction
///
/// Units: meters/second
pub const SPEED_MIN_MS: f64 = 0.2;

/// Minimum waypoint radius
///
/// Units: meters
pub const RADIUS_MIN_M: f64 = 0.05;

/// Minimum acceleration in any direction
///
/// Units: meters/second^2
pub const ACCEL_MIN_MSS: f64 = 0.5;

/// Minimum jerk
///
/// Units: meters/second^3
pub const JERK_MIN_MSSS: f64 = 0.1;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for waypoint navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {

    // ---- SPEEDS ----

    /// Default horizontal speed along a leg.
    ///
    /// Units: meters/second
    pub speed_xy_ms: f64,

    /// Default climb speed.
    ///
    /// Units: meters/second
    pub speed_up_ms: f64,

    /// Default descent speed, positive.
    ///
    /// Units: meters/second
    pub speed_down_ms: f64,

    // ---- LIMITS ----

    /// Horizontal acceleration limit.
    ///
    /// Units: meters/second^2
    pub accel_xy_mss: f64,

    /// Vertical acceleration limit.
    ///
    /// Units: meters/second^2
    pub accel_z_mss: f64,

    /// Jerk limit.
    ///
    /// Units: meters/second^3
    pub jerk_msss: f64,

    // ---- TRACKING ----

    /// Horizontal distance from a stop waypoint at which it is considered
    /// reached.
    ///
    /// Units: meters
    pub radius_m: f64,

    /// Gain of the cross-track position controller.
    pub pos_k_p: f64,

    /// If true a healthy rangefinder is preferred over the terrain source for
    /// terrain relative altitudes.
    pub rangefinder_use: bool,

    /// Legs with a horizontal length below this do not change the yaw
    /// target.
    ///
    /// Units: meters
    pub yaw_dist_min_m: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            speed_xy_ms: 5.0,
            speed_up_ms: 2.5,
            speed_down_ms: 1.5,
            accel_xy_mss: 1.0,
            accel_z_mss: 1.0,
            jerk_msss: 1.0,
            radius_m: 2.0,
            pos_k_p: 1.0,
            rangefinder_use: true,
            yaw_dist_min_m: 2.0
        }
    }
}

impl Params {
    /// Clamp all parameters to their minimum valid values.
    ///
    /// Returns true if any parameter was changed.
    pub fn sanitise(&mut self) -> bool {
        let mut changed = false;

        {
            let mut clamp = |name: &str, value: &mut f64, min: f64| {
                if !(*value >= min) {
                    warn!("Parameter {} = {} is below its minimum, using {}", name, value, min);
                    *value = min;
                    changed = true;
                }
            };

            clamp("speed_xy_ms", &mut self.speed_xy_ms, SPEED_MIN_MS);
            clamp("speed_up_ms", &mut self.speed_up_ms, SPEED_MIN_MS);
            clamp("speed_down_ms", &mut self.speed_down_ms, SPEED_MIN_MS);
            clamp("accel_xy_mss", &mut self.accel_xy_mss, ACCEL_MIN_MSS);
            clamp("accel_z_mss", &mut self.accel_z_mss, ACCEL_MIN_MSS);
            clamp("jerk_msss", &mut self.jerk_msss, JERK_MIN_MSSS);
            clamp("radius_m", &mut self.radius_m, RADIUS_MIN_M);
            clamp("pos_k_p", &mut self.pos_k_p, 0.0);
            clamp("yaw_dist_min_m", &mut self.yaw_dist_min_m, 0.0);
        }

        changed
    }
}

//! Trajectory legs and the slots which hold them

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use nalgebra::Vector3;

// Internal
use super::{Params, MIN_LEG_LENGTH_M};
use crate::scurve::{ScurveError, ScurveLimits, ScurveProfile};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A straight trajectory between an origin and a destination.
///
/// Positions are in the altitude frame of the destination.
#[derive(Debug, Clone)]
pub struct Leg {
    origin_m: Vector3<f64>,
    destination_m: Vector3<f64>,

    /// Unit vector from origin to destination, zero for a stationary leg
    direction: Vector3<f64>,

    length_m: f64,

    limits: ScurveLimits,

    /// Profile along the leg, `None` for a stationary leg
    profile: Option<ScurveProfile>
}

/// Desired state along a leg at a given time.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LegTarget {
    pub pos_m: Vector3<f64>,
    pub vel_ms: Vector3<f64>,
    pub accel_mss: Vector3<f64>,
    pub jerk_msss: Vector3<f64>
}

/// The previous, current and next legs.
#[derive(Debug, Default, Clone)]
pub struct LegSlots {
    previous: Option<Leg>,
    current: Option<Leg>,
    next: Option<Leg>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Leg {
    /// Plan a leg from `origin_m` to `destination_m`.
    ///
    /// Start and end speeds are along the leg and are clamped to the leg's
    /// speed limit.
    pub fn new(
        origin_m: Vector3<f64>,
        destination_m: Vector3<f64>,
        limits: ScurveLimits,
        start_speed_ms: f64,
        end_speed_ms: f64
    ) -> Result<Self, ScurveError> {
        let delta = destination_m - origin_m;
        let length_m = delta.norm();

        if length_m < MIN_LEG_LENGTH_M {
            return Ok(Self {
                origin_m: destination_m,
                destination_m,
                direction: Vector3::zeros(),
                length_m: 0.0,
                limits,
                profile: None
            })
        }

        if start_speed_ms > limits.vel_max {
            warn!(
                "Start speed {:.2} m/s is above the leg's limit of {:.2} m/s, clamping it",
                start_speed_ms,
                limits.vel_max
            );
        }

        let profile = ScurveProfile::new(
            limits,
            start_speed_ms.max(0.0).min(limits.vel_max),
            end_speed_ms.max(0.0).min(limits.vel_max),
            length_m
        )?;

        Ok(Self {
            origin_m,
            destination_m,
            direction: delta / length_m,
            length_m,
            limits,
            profile: Some(profile)
        })
    }

    /// Evaluate the desired state at `t` seconds after the start of the leg.
    pub fn evaluate(&self, t: f64) -> LegTarget {
        match self.profile {
            Some(ref p) => {
                let s = p.evaluate(t);
                LegTarget {
                    pos_m: self.origin_m + self.direction * s.pos,
                    vel_ms: self.direction * s.vel,
                    accel_mss: self.direction * s.accel,
                    jerk_msss: self.direction * s.jerk
                }
            },
            None => LegTarget {
                pos_m: self.destination_m,
                ..Default::default()
            }
        }
    }

    pub fn duration(&self) -> f64 {
        self.profile.as_ref().map(|p| p.duration()).unwrap_or(0.0)
    }

    pub fn start_speed_ms(&self) -> f64 {
        self.profile.as_ref().map(|p| p.start_vel()).unwrap_or(0.0)
    }

    pub fn end_speed_ms(&self) -> f64 {
        self.profile.as_ref().map(|p| p.end_vel()).unwrap_or(0.0)
    }

    pub fn origin_m(&self) -> &Vector3<f64> {
        &self.origin_m
    }

    pub fn destination_m(&self) -> &Vector3<f64> {
        &self.destination_m
    }

    pub fn direction(&self) -> &Vector3<f64> {
        &self.direction
    }

    pub fn length_m(&self) -> f64 {
        self.length_m
    }

    /// Horizontal length of the leg.
    pub fn length_xy_m(&self) -> f64 {
        (self.destination_m - self.origin_m).xy().norm()
    }

    pub fn limits(&self) -> &ScurveLimits {
        &self.limits
    }

    pub fn profile(&self) -> Option<&ScurveProfile> {
        self.profile.as_ref()
    }

    /// Returns true if the leg would be planned identically for these
    /// boundary conditions and limits.
    pub fn matches(
        &self,
        origin_m: &Vector3<f64>,
        destination_m: &Vector3<f64>,
        limits: &ScurveLimits,
        start_speed_ms: f64,
        end_speed_ms: f64
    ) -> bool {
        const TOL: f64 = 1e-6;

        (self.limits.vel_max - limits.vel_max).abs() < TOL
            && (self.limits.accel_max - limits.accel_max).abs() < TOL
            && (self.limits.jerk_max - limits.jerk_max).abs() < TOL
            && (self.origin_m - origin_m).norm() < TOL
            && (self.destination_m - destination_m).norm() < TOL
            && (self.start_speed_ms() - start_speed_ms.min(self.limits.vel_max)).abs() < TOL
            && (self.end_speed_ms() - end_speed_ms.min(self.limits.vel_max)).abs() < TOL
    }
}

impl LegSlots {
    pub fn previous(&self) -> Option<&Leg> {
        self.previous.as_ref()
    }

    pub fn current(&self) -> Option<&Leg> {
        self.current.as_ref()
    }

    pub fn next(&self) -> Option<&Leg> {
        self.next.as_ref()
    }

    /// Replace the current leg, moving the old current leg into the previous
    /// slot and replacing the next leg.
    pub fn retarget(&mut self, current: Leg, next: Option<Leg>) {
        self.previous = self.current.take();
        self.current = Some(current);
        self.next = next;
    }

    /// Move the next leg into the current slot and the current leg into the
    /// previous slot.
    ///
    /// Returns false, leaving the slots untouched, if there is no next leg.
    pub fn promote_next(&mut self) -> bool {
        match self.next.take() {
            Some(next) => {
                self.previous = self.current.take();
                self.current = Some(next);
                true
            },
            None => false
        }
    }

    /// Replace the current and next legs, keeping the previous leg.
    ///
    /// Used when the remainder of the current leg is replanned rather than a
    /// new leg being started.
    pub fn replace_current(&mut self, current: Leg, next: Option<Leg>) {
        self.current = Some(current);
        self.next = next;
    }

    /// Set the next leg without changing the current one.
    pub fn set_next(&mut self, next: Option<Leg>) {
        self.next = next;
    }

    /// Empty all slots.
    pub fn clear(&mut self) {
        self.previous = None;
        self.current = None;
        self.next = None;
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the largest magnitude along `direction` which stays within the
/// horizontal, upward and downward limits.
///
/// The limits form an ellipsoid so that the magnitude changes smoothly with
/// the climb angle.
pub fn kinematic_limit(direction: &Vector3<f64>, max_xy: f64, max_up: f64, max_down: f64) -> f64 {
    let norm = direction.norm();
    if norm <= 0.0 || !norm.is_finite() {
        return 0.0
    }

    let xy = direction.xy().norm() / norm;
    let z = direction[2] / norm;
    let max_z = if z > 0.0 { max_up } else { max_down };

    if xy <= 0.0 {
        return max_z
    }
    if z == 0.0 {
        return max_xy
    }

    1.0 / ((xy / max_xy).powi(2) + (z / max_z).powi(2)).sqrt()
}

/// Get the kinematic limits along a leg direction.
///
/// Speed limits are given separately so that speed overrides can be used in
/// place of the default speeds in the parameters.
pub fn leg_limits(
    direction: &Vector3<f64>,
    speed_xy_ms: f64,
    speed_up_ms: f64,
    speed_down_ms: f64,
    params: &Params
) -> ScurveLimits {
    let vel = kinematic_limit(direction, speed_xy_ms, speed_up_ms, speed_down_ms);
    let accel = kinematic_limit(direction, params.accel_xy_mss, params.accel_z_mss, params.accel_z_mss);

    // Stationary legs still need valid limits
    if vel > 0.0 && accel > 0.0 {
        ScurveLimits::new(vel, accel, params.jerk_msss)
    }
    else {
        ScurveLimits::new(speed_xy_ms, params.accel_xy_mss, params.jerk_msss)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn limits() -> ScurveLimits {
        ScurveLimits::new(5.0, 1.0, 1.0)
    }

    #[test]
    fn test_kinematic_limit() {
        let (xy, up, down) = (5.0, 2.0, 1.0);
        assert_eq!(kinematic_limit(&Vector3::new(1.0, 0.0, 0.0), xy, up, down), 5.0);
        assert_eq!(kinematic_limit(&Vector3::new(0.0, 0.0, 3.0), xy, up, down), 2.0);
        assert_eq!(kinematic_limit(&Vector3::new(0.0, 0.0, -3.0), xy, up, down), 1.0);
        assert_eq!(kinematic_limit(&Vector3::zeros(), xy, up, down), 0.0);

        // Diagonal climbs sit between the two
        let lim = kinematic_limit(&Vector3::new(1.0, 0.0, 1.0), xy, up, down);
        assert!(lim > 2.0 && lim < 5.0);
        let v = Vector3::new(1.0, 0.0, 1.0).normalize() * lim;
        assert!(((v[0] / xy).powi(2) + (v[2] / up).powi(2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_leg_evaluate() {
        let leg = Leg::new(
            Vector3::new(0.0, 0.0, 10.0),
            Vector3::new(30.0, 40.0, 10.0),
            limits(),
            0.0,
            0.0
        ).unwrap();

        assert_eq!(leg.length_m(), 50.0);
        let start = leg.evaluate(0.0);
        let end = leg.evaluate(leg.duration());
        assert_eq!(start.pos_m, Vector3::new(0.0, 0.0, 10.0));
        assert!((end.pos_m - Vector3::new(30.0, 40.0, 10.0)).norm() < 1e-6);
        assert!(end.vel_ms.norm() < 1e-6);

        // Velocity always points along the leg
        let mid = leg.evaluate(0.5 * leg.duration());
        assert!((mid.vel_ms.normalize() - leg.direction()).norm() < 1e-9);
    }

    #[test]
    fn test_stationary_leg() {
        let dest = Vector3::new(1.0, 2.0, 3.0);
        let leg = Leg::new(dest, dest, limits(), 2.0, 0.0).unwrap();

        assert_eq!(leg.duration(), 0.0);
        assert_eq!(leg.evaluate(10.0).pos_m, dest);
        assert_eq!(leg.evaluate(10.0).vel_ms, Vector3::zeros());
    }

    #[test]
    fn test_slot_transitions() {
        let a = Vector3::zeros();
        let b = Vector3::new(10.0, 0.0, 0.0);
        let c = Vector3::new(10.0, 10.0, 0.0);
        let ab = Leg::new(a, b, limits(), 0.0, 0.0).unwrap();
        let bc = Leg::new(b, c, limits(), 0.0, 0.0).unwrap();

        let mut slots = LegSlots::default();
        assert!(!slots.promote_next());

        slots.retarget(ab, Some(bc));
        assert!(slots.previous().is_none());
        assert_eq!(slots.current().unwrap().destination_m(), &b);

        assert!(slots.promote_next());
        assert_eq!(slots.previous().unwrap().destination_m(), &b);
        assert_eq!(slots.current().unwrap().destination_m(), &c);
        assert!(slots.next().is_none());

        // Replanning in place leaves the previous leg alone
        let replanned = Leg::new(Vector3::new(10.0, 5.0, 0.0), c, limits(), 1.0, 0.0).unwrap();
        slots.replace_current(replanned, None);
        assert_eq!(slots.previous().unwrap().destination_m(), &b);
        assert_eq!(slots.current().unwrap().origin_m(), &Vector3::new(10.0, 5.0, 0.0));

        slots.clear();
        assert!(slots.current().is_none() && slots.previous().is_none());
    }

    #[test]
    fn test_start_speed_clamped_to_limit() {
        let leg = Leg::new(
            Vector3::zeros(),
            Vector3::new(100.0, 0.0, 0.0),
            limits(),
            8.0,
            9.0
        ).unwrap();

        assert_eq!(leg.start_speed_ms(), 5.0);
        assert_eq!(leg.end_speed_ms(), 5.0);
        assert!((leg.evaluate(0.0).vel_ms - Vector3::new(5.0, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_matches() {
        let leg = Leg::new(
            Vector3::zeros(),
            Vector3::new(0.0, 20.0, 0.0),
            limits(),
            0.0,
            0.0
        ).unwrap();

        let dest = Vector3::new(0.0, 20.0, 0.0);
        assert!(leg.matches(&Vector3::zeros(), &dest, &limits(), 0.0, 0.0));
        assert!(!leg.matches(&Vector3::zeros(), &dest, &limits(), 1.0, 0.0));
        assert!(!leg.matches(&Vector3::zeros(), &Vector3::new(0.0, 21.0, 0.0), &limits(), 0.0, 0.0));

        // A speed change since planning means replanning
        let slower = ScurveLimits::new(2.0, 1.0, 1.0);
        assert!(!leg.matches(&Vector3::zeros(), &dest, &slower, 0.0, 0.0));
    }
}

//! Jerk-limited profile synthesis

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::{Deserialize, Serialize};

// Internal
use super::{Breakpoint, KinematicState, ScurveError, SegmentTable};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of bisection iterations used to find the peak velocity of a profile
/// which cannot reach its cruise velocity.
const PEAK_VEL_ITERATIONS: usize = 64;

/// Relative tolerance on distances when checking a profile is feasible.
const DISTANCE_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Kinematic limits of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScurveLimits {
    /// Duration of each half-sine jerk transition.
    pub jerk_time_s: f64,

    /// Peak jerk.
    pub jerk_max: f64,

    /// Peak acceleration.
    pub accel_max: f64,

    /// Cruise velocity.
    pub vel_max: f64
}

/// A jerk-limited motion profile along a single axis.
///
/// The profile starts at position zero with `start_vel` and zero
/// acceleration, and finishes at `distance` with `end_vel` and zero
/// acceleration. Profiles are immutable once built.
#[derive(Debug, Clone)]
pub struct ScurveProfile {
    table: SegmentTable,

    limits: ScurveLimits,

    /// Highest velocity reached, equal to `limits.vel_max` if the profile
    /// cruises.
    peak_vel: f64,

    /// Duration of the constant velocity section.
    cruise_time_s: f64,

    distance: f64
}

/// Timing of a single velocity ramp.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct RampTiming {
    /// Jerk used during the ramp, at most `jerk_max`.
    jerk: f64,

    /// Acceleration held in the middle of the ramp, at most `accel_max`.
    accel: f64,

    /// Duration of each constant jerk plateau.
    jerk_plateau_s: f64,

    /// Duration of the constant acceleration section.
    accel_hold_s: f64,

    /// Duration of each half-sine pulse.
    jerk_time_s: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScurveLimits {
    /// Build limits from the velocity, acceleration and jerk bounds.
    ///
    /// The half-sine transitions last half of the time the peak jerk would
    /// take to build up the peak acceleration, leaving an equal constant jerk
    /// plateau.
    pub fn new(vel_max: f64, accel_max: f64, jerk_max: f64) -> Self {
        let jerk_time_s = if jerk_max > 0.0 {
            0.5 * accel_max / jerk_max
        }
        else {
            0.0
        };

        Self {
            jerk_time_s,
            jerk_max,
            accel_max,
            vel_max
        }
    }

    /// Returns true if all limits are positive and finite.
    pub fn is_valid(&self) -> bool {
        [self.jerk_time_s, self.jerk_max, self.accel_max, self.vel_max]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

impl ScurveProfile {
    /// Synthesise the minimum time profile covering `distance` from
    /// `start_vel` to `end_vel` within the given limits.
    pub fn new(
        limits: ScurveLimits,
        start_vel: f64,
        end_vel: f64,
        distance: f64
    ) -> Result<Self, ScurveError> {
        check_inputs(&limits, start_vel, end_vel, distance)?;

        let ramps_dist = |vel: f64| {
            ramp_distance(&limits, start_vel, vel) + ramp_distance(&limits, vel, end_vel)
        };

        // The lowest velocity the profile can peak at is the higher of the
        // two boundary velocities, if ramping to it alone overshoots the
        // profile cannot be built.
        let min_peak = start_vel.max(end_vel);
        let min_dist = ramps_dist(min_peak);
        if min_dist > distance * (1.0 + DISTANCE_TOLERANCE) {
            return Err(ScurveError::Infeasible {
                distance,
                required: min_dist
            })
        }

        // Cruise at the limit if the ramps fit, otherwise find the peak
        // velocity whose ramps exactly cover the distance. Ramp distance is
        // monotonic in the peak velocity so bisection always converges.
        let peak_vel = if ramps_dist(limits.vel_max) <= distance {
            limits.vel_max
        }
        else {
            let mut lo = min_peak;
            let mut hi = limits.vel_max;
            for _ in 0..PEAK_VEL_ITERATIONS {
                let mid = 0.5 * (lo + hi);
                if ramps_dist(mid) <= distance {
                    lo = mid;
                }
                else {
                    hi = mid;
                }
            }
            lo
        };

        let cruise_time_s = if peak_vel > 0.0 {
            ((distance - ramps_dist(peak_vel)) / peak_vel).max(0.0)
        }
        else {
            0.0
        };

        // Build the segments
        let mut table = SegmentTable::new(KinematicState {
            vel: start_vel,
            ..Default::default()
        });
        append_ramp(&mut table, &limits, start_vel, peak_vel)?;
        table.append_constant(cruise_time_s, 0.0)?;
        append_ramp(&mut table, &limits, peak_vel, end_vel)?;

        trace!(
            "Synthesised profile: {} breakpoints, {:.3} s, peak vel {:.3}, cruise {:.3} s",
            table.len(),
            table.duration(),
            peak_vel,
            cruise_time_s
        );

        Ok(Self {
            table,
            limits,
            peak_vel,
            cruise_time_s,
            distance
        })
    }

    /// The highest end velocity reachable from `start_vel` within `distance`.
    ///
    /// Returns `None` if even the lowest reachable end velocity overshoots the
    /// distance or the inputs are invalid.
    pub fn max_end_velocity(
        limits: ScurveLimits,
        start_vel: f64,
        distance: f64
    ) -> Option<f64> {
        check_inputs(&limits, start_vel, 0.0, distance).ok()?;

        // Any end velocity at or above the start is reachable if the ramp
        // between them fits
        let up_dist = |vel: f64| ramp_distance(&limits, start_vel, vel);
        if up_dist(limits.vel_max) <= distance {
            return Some(limits.vel_max)
        }
        if up_dist(start_vel) <= distance {
            let mut lo = start_vel;
            let mut hi = limits.vel_max;
            for _ in 0..PEAK_VEL_ITERATIONS {
                let mid = 0.5 * (lo + hi);
                if up_dist(mid) <= distance {
                    lo = mid;
                }
                else {
                    hi = mid;
                }
            }
            return Some(lo)
        }

        None
    }

    /// Evaluate the jerk, acceleration, velocity and position at time `t`.
    ///
    /// Before the start and after the end the boundary state is extrapolated
    /// with zero jerk.
    pub fn evaluate(&self, t: f64) -> KinematicState {
        self.table.evaluate(t)
    }

    /// Total duration of the profile.
    pub fn duration(&self) -> f64 {
        self.table.duration()
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        self.table.breakpoints()
    }

    pub fn limits(&self) -> &ScurveLimits {
        &self.limits
    }

    pub fn start_vel(&self) -> f64 {
        self.table.breakpoints()[0].vel
    }

    pub fn end_vel(&self) -> f64 {
        self.table.last().vel
    }

    pub fn peak_vel(&self) -> f64 {
        self.peak_vel
    }

    pub fn cruise_time_s(&self) -> f64 {
        self.cruise_time_s
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }
}

impl RampTiming {
    /// Duration of the whole ramp.
    fn duration(&self) -> f64 {
        2.0 * (2.0 * self.jerk_time_s + self.jerk_plateau_s) + self.accel_hold_s
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn check_inputs(
    limits: &ScurveLimits,
    start_vel: f64,
    end_vel: f64,
    distance: f64
) -> Result<(), ScurveError> {
    if !limits.is_valid() {
        return Err(ScurveError::InvalidLimits(*limits))
    }

    let vel_ok = |v: f64| v.is_finite() && v >= 0.0 && v <= limits.vel_max;
    if !vel_ok(start_vel) || !vel_ok(end_vel) {
        return Err(ScurveError::InvalidBoundary {
            start: start_vel,
            end: end_vel,
            max: limits.vel_max
        })
    }

    if !(distance > 0.0) || !distance.is_finite() {
        return Err(ScurveError::ZeroDistance(distance))
    }

    Ok(())
}

/// Calculate the timing of the quickest ramp changing velocity by `delta_vel`.
fn ramp_timing(limits: &ScurveLimits, delta_vel: f64) -> RampTiming {
    let dv = delta_vel.abs();
    let tj = limits.jerk_time_s;

    if dv <= 0.0 {
        return RampTiming {
            jerk_time_s: tj,
            ..Default::default()
        }
    }

    // A single pulse of the peak jerk raises the acceleration by this much
    let pulse_accel = limits.jerk_max * tj;

    if limits.accel_max <= pulse_accel {
        // The pulse alone would break the acceleration limit so the jerk is
        // reduced instead of adding a plateau.
        let accel = limits.accel_max.min(dv / (2.0 * tj));
        RampTiming {
            jerk: accel / tj,
            accel,
            jerk_plateau_s: 0.0,
            accel_hold_s: (dv / accel - 2.0 * tj).max(0.0),
            jerk_time_s: tj
        }
    }
    else {
        // Velocity gained ramping up to and back down from full acceleration
        let full_accel_dv = limits.accel_max * (tj + limits.accel_max / limits.jerk_max);

        if dv >= full_accel_dv {
            RampTiming {
                jerk: limits.jerk_max,
                accel: limits.accel_max,
                jerk_plateau_s: (limits.accel_max / limits.jerk_max - tj).max(0.0),
                accel_hold_s: (dv / limits.accel_max - tj - limits.accel_max / limits.jerk_max)
                    .max(0.0),
                jerk_time_s: tj
            }
        }
        else if dv >= 2.0 * pulse_accel * tj {
            // Peak acceleration a solves a^2/J + a*tj = dv
            let accel = 0.5
                * limits.jerk_max
                * (-tj + (tj * tj + 4.0 * dv / limits.jerk_max).sqrt());
            RampTiming {
                jerk: limits.jerk_max,
                accel,
                jerk_plateau_s: (accel / limits.jerk_max - tj).max(0.0),
                accel_hold_s: 0.0,
                jerk_time_s: tj
            }
        }
        else {
            let accel = dv / (2.0 * tj);
            RampTiming {
                jerk: accel / tj,
                accel,
                jerk_plateau_s: 0.0,
                accel_hold_s: 0.0,
                jerk_time_s: tj
            }
        }
    }
}

/// Distance covered by the quickest ramp between two velocities.
///
/// The acceleration of a ramp is symmetric about its midpoint so the mean
/// velocity is the mean of the two boundary velocities.
fn ramp_distance(limits: &ScurveLimits, from_vel: f64, to_vel: f64) -> f64 {
    if from_vel == to_vel {
        return 0.0
    }

    0.5 * (from_vel + to_vel) * ramp_timing(limits, to_vel - from_vel).duration()
}

/// Append the segments of a ramp between two velocities.
fn append_ramp(
    table: &mut SegmentTable,
    limits: &ScurveLimits,
    from_vel: f64,
    to_vel: f64
) -> Result<(), ScurveError> {
    if from_vel == to_vel {
        return Ok(())
    }

    let timing = ramp_timing(limits, to_vel - from_vel);
    let jerk = timing.jerk * (to_vel - from_vel).signum();
    let tj = timing.jerk_time_s;

    table.append_rising_half_sine(tj, jerk)?;
    table.append_constant(timing.jerk_plateau_s, jerk)?;
    table.append_falling_half_sine(tj, jerk)?;
    table.append_constant(timing.accel_hold_s, 0.0)?;
    table.append_rising_half_sine(tj, -jerk)?;
    table.append_constant(timing.jerk_plateau_s, -jerk)?;
    table.append_falling_half_sine(tj, -jerk)
}

#[cfg(test)]
mod test {
    use super::*;

    const VEL: f64 = 500.0;
    const ACCEL: f64 = 250.0;
    const JERK: f64 = 2500.0;

    fn limits() -> ScurveLimits {
        ScurveLimits::new(VEL, ACCEL, JERK)
    }

    /// Sample the profile and check the state never exceeds the limits.
    fn assert_within_limits(profile: &ScurveProfile) {
        let l = profile.limits();
        let steps = 5000;
        for i in 0..=steps {
            let t = profile.duration() * i as f64 / steps as f64;
            let s = profile.evaluate(t);
            assert!(s.vel.abs() <= l.vel_max + 1e-6, "vel {} at t={}", s.vel, t);
            assert!(s.accel.abs() <= l.accel_max + 1e-6, "accel {} at t={}", s.accel, t);
            assert!(s.jerk.abs() <= l.jerk_max + 1e-6, "jerk {} at t={}", s.jerk, t);
        }
    }

    #[test]
    fn test_limits_new() {
        let l = limits();
        assert!((l.jerk_time_s - 0.05).abs() < 1e-12);
        assert!(l.is_valid());
        assert!(!ScurveLimits::new(VEL, ACCEL, 0.0).is_valid());
    }

    #[test]
    fn test_rest_to_rest_scenario() {
        let profile = ScurveProfile::new(limits(), 0.0, 0.0, 1000.0).unwrap();

        // With these limits the ramps alone need more than 1000 units to reach
        // 500, so the peak v solves v*(v/A + tj + A/J) = 1000.
        let tj = 0.05;
        let k = tj + ACCEL / JERK;
        let expected_peak = 0.5 * ACCEL * (-k + (k * k + 4.0 * 1000.0 / ACCEL).sqrt());
        let expected_time = 2.0 * (expected_peak / ACCEL + k);

        assert!((profile.peak_vel() - expected_peak).abs() < 1e-6);
        assert!(profile.peak_vel() > 0.95 * VEL);
        assert!((profile.duration() - expected_time).abs() < 1e-6);

        let end = profile.evaluate(profile.duration());
        assert!((end.pos - 1000.0).abs() < 1e-6);
        assert!(end.vel.abs() < 1e-6);

        assert_within_limits(&profile);
    }

    #[test]
    fn test_cruise_scenario() {
        let profile = ScurveProfile::new(limits(), 0.0, 0.0, 2000.0).unwrap();

        // Each ramp takes 500/250 + 0.05 + 0.1 s and covers 250 units per
        // second of it
        let ramp_time = VEL / ACCEL + 0.05 + ACCEL / JERK;
        let ramp_dist = 0.5 * VEL * ramp_time;
        let cruise_time = (2000.0 - 2.0 * ramp_dist) / VEL;

        assert_eq!(profile.peak_vel(), VEL);
        assert!((profile.cruise_time_s() - cruise_time).abs() < 1e-9);
        assert!(profile.cruise_time_s() > 0.0);
        assert!((profile.duration() - (2.0 * ramp_time + cruise_time)).abs() < 1e-9);

        let mid = profile.evaluate(0.5 * profile.duration());
        assert!((mid.vel - VEL).abs() < 1e-6);
        assert!(mid.accel.abs() < 1e-6);

        assert_within_limits(&profile);
    }

    #[test]
    fn test_numeric_integration_matches() {
        let profile = ScurveProfile::new(limits(), 0.0, 0.0, 1000.0).unwrap();

        let steps = 200_000;
        let dt = profile.duration() / steps as f64;
        let (mut accel, mut vel, mut pos) = (0.0, 0.0, 0.0);
        let mut jerk_prev = profile.evaluate(0.0).jerk;
        for i in 1..=steps {
            let jerk = profile.evaluate(i as f64 * dt).jerk;
            let a_next = accel + 0.5 * (jerk_prev + jerk) * dt;
            let v_next = vel + 0.5 * (accel + a_next) * dt;
            pos += 0.5 * (vel + v_next) * dt;
            vel = v_next;
            accel = a_next;
            jerk_prev = jerk;
        }

        assert!(accel.abs() < 1e-3);
        assert!(vel.abs() < 1e-2);
        assert!((pos - 1000.0).abs() < 1e-2);
    }

    #[test]
    fn test_breakpoint_continuity() {
        let profile = ScurveProfile::new(limits(), 120.0, 40.0, 900.0).unwrap();

        for bp in profile.breakpoints().iter().skip(1) {
            let before = profile.evaluate(bp.time - 1e-9);
            let after = profile.evaluate(bp.time + 1e-9);
            for (x, y) in [
                (before.accel, bp.accel),
                (before.vel, bp.vel),
                (before.pos, bp.pos),
                (after.accel, bp.accel),
                (after.vel, bp.vel),
                (after.pos, bp.pos)
            ].iter() {
                assert!((x - y).abs() <= 1e-3 * (1.0 + y.abs()), "{} != {}", x, y);
            }
        }

        // Times never decrease
        for w in profile.breakpoints().windows(2) {
            assert!(w[1].time >= w[0].time);
        }
    }

    #[test]
    fn test_time_reversal_symmetry() {
        for &dist in [5.0, 300.0, 1000.0, 2500.0].iter() {
            let profile = ScurveProfile::new(limits(), 0.0, 0.0, dist).unwrap();
            let total = profile.duration();

            for i in 0..=200 {
                let t = total * i as f64 / 200.0;
                let fwd = profile.evaluate(t);
                let rev = profile.evaluate(total - t);
                assert!((fwd.accel + rev.accel).abs() < 1e-6 * ACCEL, "accel at {}", t);
                assert!((fwd.vel - rev.vel).abs() < 1e-6 * VEL, "vel at {}", t);
            }
        }
    }

    #[test]
    fn test_boundary_velocities() {
        let cases = [
            (100.0, 0.0, 500.0),
            (0.0, 200.0, 800.0),
            (300.0, 300.0, 50.0),
            (500.0, 500.0, 10.0),
            (0.0, 0.0, 0.01),
            (450.0, 20.0, 600.0)
        ];

        for &(v0, v1, dist) in cases.iter() {
            let profile = ScurveProfile::new(limits(), v0, v1, dist).unwrap();
            let start = profile.evaluate(0.0);
            let end = profile.evaluate(profile.duration());

            assert!((start.vel - v0).abs() < 1e-9);
            assert!((end.vel - v1).abs() < 1e-6, "end vel {} for {:?}", end.vel, (v0, v1, dist));
            assert!((end.pos - dist).abs() < 1e-6 * (1.0 + dist), "end pos {}", end.pos);
            assert!(end.accel.abs() < 1e-6);

            assert_within_limits(&profile);
        }
    }

    #[test]
    fn test_low_accel_limit_reduces_jerk() {
        // Jerk time longer than accel/jerk, so pulses run at reduced jerk
        let l = ScurveLimits {
            jerk_time_s: 0.5,
            jerk_max: 10.0,
            accel_max: 2.0,
            vel_max: 5.0
        };
        let profile = ScurveProfile::new(l, 0.0, 0.0, 40.0).unwrap();

        assert_eq!(profile.peak_vel(), 5.0);
        assert_within_limits(&profile);
        let end = profile.evaluate(profile.duration());
        assert!((end.pos - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible() {
        let res = ScurveProfile::new(limits(), 500.0, 0.0, 10.0);
        assert!(matches!(res, Err(ScurveError::Infeasible { .. })));
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(
            ScurveProfile::new(limits(), 0.0, 0.0, 0.0).unwrap_err(),
            ScurveError::ZeroDistance(0.0)
        );
        assert!(matches!(
            ScurveProfile::new(limits(), 600.0, 0.0, 1000.0),
            Err(ScurveError::InvalidBoundary { .. })
        ));
        assert!(matches!(
            ScurveProfile::new(ScurveLimits::new(VEL, 0.0, JERK), 0.0, 0.0, 10.0),
            Err(ScurveError::InvalidLimits(_))
        ));
    }

    #[test]
    fn test_max_end_velocity() {
        // Plenty of room to reach full speed
        assert_eq!(ScurveProfile::max_end_velocity(limits(), 0.0, 1000.0), Some(VEL));

        // Short leg, the exit velocity is limited and exactly reachable
        let v = ScurveProfile::max_end_velocity(limits(), 0.0, 100.0).unwrap();
        assert!(v > 0.0 && v < VEL);
        let profile = ScurveProfile::new(limits(), 0.0, v, 100.0).unwrap();
        assert!((profile.end_vel() - v).abs() < 1e-6);
    }
}

//! Trajectory segments and the fixed-capacity breakpoint table

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;
use std::f64::consts::PI;

// Internal
use super::{ScurveError, SEGMENT_CAPACITY};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The jerk, acceleration, velocity and position of a profile at an instant.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct KinematicState {
    pub jerk: f64,
    pub accel: f64,
    pub vel: f64,
    pub pos: f64
}

/// The end of a single analytic segment.
///
/// The state values are cumulative, i.e. they are the acceleration, velocity
/// and position of the profile at `time`, not the change over the segment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct Breakpoint {
    /// Time since the start of the profile.
    pub time: f64,

    /// Shape of the jerk over the segment ending here.
    pub kind: JerkKind,

    /// Jerk parameter of the segment ending here. For half-sine segments this
    /// is the peak jerk of the pulse.
    pub jerk: f64,

    pub accel: f64,
    pub vel: f64,
    pub pos: f64
}

/// An ordered, append-only table of breakpoints with a fixed capacity.
///
/// The first breakpoint is always the initial state of the profile at time
/// zero.
#[derive(Debug, Clone)]
pub struct SegmentTable {
    items: [Breakpoint; SEGMENT_CAPACITY],
    num_items: usize
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Shape of the jerk within a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JerkKind {
    /// Jerk held at a constant value.
    Constant,

    /// Jerk rising from zero to its peak along half a cosine period.
    RisingHalfSine,

    /// Jerk falling from its peak to zero along half a cosine period.
    FallingHalfSine
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for JerkKind {
    fn default() -> Self {
        JerkKind::Constant
    }
}

impl Breakpoint {
    /// The kinematic state of the profile at this breakpoint.
    pub fn state(&self) -> KinematicState {
        let jerk = match self.kind {
            JerkKind::FallingHalfSine => 0.0,
            _ => self.jerk
        };

        KinematicState {
            jerk,
            accel: self.accel,
            vel: self.vel,
            pos: self.pos
        }
    }
}

impl SegmentTable {
    /// Create a new table starting from the given state at time zero.
    pub fn new(start: KinematicState) -> Self {
        let mut items = [Breakpoint::default(); SEGMENT_CAPACITY];
        items[0] = Breakpoint {
            time: 0.0,
            kind: JerkKind::Constant,
            jerk: 0.0,
            accel: start.accel,
            vel: start.vel,
            pos: start.pos
        };

        Self {
            items,
            num_items: 1
        }
    }

    /// The breakpoints currently stored in the table.
    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.items[..self.num_items]
    }

    pub fn len(&self) -> usize {
        self.num_items
    }

    /// The last breakpoint in the table.
    pub fn last(&self) -> &Breakpoint {
        &self.items[self.num_items - 1]
    }

    /// Time of the last breakpoint.
    pub fn duration(&self) -> f64 {
        self.last().time
    }

    /// Append a segment of constant jerk.
    pub fn append_constant(&mut self, duration: f64, jerk: f64) -> Result<(), ScurveError> {
        self.append(JerkKind::Constant, duration, jerk)
    }

    /// Append a segment over which the jerk rises from zero to `peak_jerk`.
    pub fn append_rising_half_sine(
        &mut self,
        duration: f64,
        peak_jerk: f64
    ) -> Result<(), ScurveError> {
        self.append(JerkKind::RisingHalfSine, duration, peak_jerk)
    }

    /// Append a segment over which the jerk falls from `peak_jerk` to zero.
    pub fn append_falling_half_sine(
        &mut self,
        duration: f64,
        peak_jerk: f64
    ) -> Result<(), ScurveError> {
        self.append(JerkKind::FallingHalfSine, duration, peak_jerk)
    }

    /// Evaluate the profile at time `t`.
    ///
    /// Outside of the table the first or last state is extrapolated with zero
    /// jerk. A NaN time holds the first state and an infinite time holds the
    /// state at the nearer end of the table.
    pub fn evaluate(&self, t: f64) -> KinematicState {
        let items = self.breakpoints();
        let first = &items[0];
        let last = self.last();

        if t.is_nan() || t == f64::NEG_INFINITY {
            return first.state()
        }
        if t == f64::INFINITY {
            return last.state()
        }

        if t <= first.time {
            return integrate(JerkKind::Constant, 0.0, 0.0, &first.state(), t - first.time);
        }
        if t >= last.time {
            return integrate(JerkKind::Constant, 0.0, 0.0, &last.state(), t - last.time);
        }

        // First breakpoint strictly after t, always in 1..num_items here
        let idx = items.partition_point(|b| b.time <= t).max(1);
        let start = &items[idx - 1];
        let segment = &items[idx];

        integrate(
            segment.kind,
            segment.time - start.time,
            segment.jerk,
            &start.state(),
            t - start.time
        )
    }

    /// Append a segment of the given kind, integrating from the last
    /// breakpoint. Segments with no duration are not recorded.
    fn append(&mut self, kind: JerkKind, duration: f64, jerk: f64) -> Result<(), ScurveError> {
        if !(duration > 0.0) {
            return Ok(())
        }

        if self.num_items >= SEGMENT_CAPACITY {
            return Err(ScurveError::CapacityExceeded(SEGMENT_CAPACITY))
        }

        let start = *self.last();
        let end = integrate(kind, duration, jerk, &start.state(), duration);

        self.items[self.num_items] = Breakpoint {
            time: start.time + duration,
            kind,
            jerk,
            accel: end.accel,
            vel: end.vel,
            pos: end.pos
        };
        self.num_items += 1;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Integrate a single segment from `start` for `tau` seconds.
///
/// `duration` is the full length of the segment, which sets the period of the
/// half-sine jerk shapes, and `jerk` is the segment's jerk parameter. `tau`
/// may lie outside of `[0, duration]` for constant jerk segments.
pub fn integrate(
    kind: JerkKind,
    duration: f64,
    jerk: f64,
    start: &KinematicState,
    tau: f64
) -> KinematicState {
    let (a0, v0, p0) = (start.accel, start.vel, start.pos);

    // Contribution of the initial state alone
    let a_base = a0;
    let v_base = v0 + a0 * tau;
    let p_base = p0 + v0 * tau + 0.5 * a0 * tau * tau;

    match kind {
        JerkKind::Constant => KinematicState {
            jerk,
            accel: a_base + jerk * tau,
            vel: v_base + 0.5 * jerk * tau * tau,
            pos: p_base + jerk * tau * tau * tau / 6.0
        },
        JerkKind::RisingHalfSine | JerkKind::FallingHalfSine => {
            let alpha = 0.5 * jerk;
            let beta = PI / duration;
            let (sin, cos) = (beta * tau).sin_cos();

            // The falling shape is the rising one with the cosine term negated
            let sign = match kind {
                JerkKind::RisingHalfSine => 1.0,
                _ => -1.0
            };

            KinematicState {
                jerk: alpha * (1.0 - sign * cos),
                accel: a_base + alpha * tau - sign * (alpha / beta) * sin,
                vel: v_base
                    + 0.5 * alpha * tau * tau
                    + sign * (alpha / beta.powi(2)) * (cos - 1.0),
                pos: p_base
                    + alpha * tau.powi(3) / 6.0
                    - sign * (alpha / beta.powi(2)) * tau
                    + sign * (alpha / beta.powi(3)) * sin
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn at_rest() -> KinematicState {
        KinematicState::default()
    }

    #[test]
    fn test_constant_jerk_closed_form() {
        let mut table = SegmentTable::new(KinematicState {
            jerk: 0.0,
            accel: 1.0,
            vel: 2.0,
            pos: 3.0
        });
        table.append_constant(2.0, 0.5).unwrap();

        let bp = table.last();
        assert_eq!(bp.time, 2.0);
        assert!((bp.accel - 2.0).abs() < 1e-12);
        assert!((bp.vel - (2.0 + 2.0 + 1.0)).abs() < 1e-12);
        assert!((bp.pos - (3.0 + 4.0 + 2.0 + 0.5 * 8.0 / 6.0)).abs() < 1e-12);
    }

    #[test]
    fn test_half_sine_pulse() {
        // A rising then falling pulse raises acceleration by peak * duration
        let mut table = SegmentTable::new(at_rest());
        table.append_rising_half_sine(0.5, 4.0).unwrap();

        let mid = table.last();
        assert!((mid.accel - 1.0).abs() < 1e-12);
        assert!((table.evaluate(0.5 - 1e-12).jerk - 4.0).abs() < 1e-6);

        table.append_falling_half_sine(0.5, 4.0).unwrap();
        let end = table.last();
        assert!((end.accel - 2.0).abs() < 1e-12);
        assert_eq!(end.state().jerk, 0.0);

        // Jerk is continuous over the join
        let before = table.evaluate(0.5 - 1e-9);
        let after = table.evaluate(0.5 + 1e-9);
        assert!((before.jerk - after.jerk).abs() < 1e-6);
        assert!((before.accel - after.accel).abs() < 1e-6);
    }

    #[test]
    fn test_half_sine_matches_numeric_integration() {
        let mut table = SegmentTable::new(KinematicState {
            jerk: 0.0,
            accel: -0.3,
            vel: 1.2,
            pos: 0.0
        });
        table.append_rising_half_sine(0.4, 3.0).unwrap();
        table.append_falling_half_sine(0.4, 3.0).unwrap();

        let steps = 80_000;
        let dt = table.duration() / steps as f64;
        let mut accel = -0.3;
        let mut vel = 1.2;
        let mut pos = 0.0;
        for i in 0..steps {
            let t = i as f64 * dt;
            let j0 = table.evaluate(t).jerk;
            let j1 = table.evaluate(t + dt).jerk;
            let a_next = accel + 0.5 * (j0 + j1) * dt;
            let v_next = vel + 0.5 * (accel + a_next) * dt;
            pos += 0.5 * (vel + v_next) * dt;
            vel = v_next;
            accel = a_next;
        }

        let end = table.last();
        assert!((end.accel - accel).abs() < 1e-6);
        assert!((end.vel - vel).abs() < 1e-6);
        assert!((end.pos - pos).abs() < 1e-6);
    }

    #[test]
    fn test_zero_duration_not_recorded() {
        let mut table = SegmentTable::new(at_rest());
        table.append_constant(0.0, 1.0).unwrap();
        table.append_rising_half_sine(-1.0, 1.0).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut table = SegmentTable::new(at_rest());
        for _ in 1..SEGMENT_CAPACITY {
            table.append_constant(0.1, 0.0).unwrap();
        }
        assert_eq!(table.len(), SEGMENT_CAPACITY);
        assert_eq!(
            table.append_constant(0.1, 0.0),
            Err(ScurveError::CapacityExceeded(SEGMENT_CAPACITY))
        );

        // The table is unchanged by the failed append
        assert_eq!(table.len(), SEGMENT_CAPACITY);
        assert!((table.duration() - 0.1 * (SEGMENT_CAPACITY - 1) as f64).abs() < 1e-9);
    }

    #[test]
    fn test_extrapolation() {
        let mut table = SegmentTable::new(KinematicState {
            jerk: 0.0,
            accel: 0.0,
            vel: 1.0,
            pos: 0.0
        });
        table.append_constant(1.0, 2.0).unwrap();

        // Before the start the initial velocity is held
        let before = table.evaluate(-1.0);
        assert_eq!(before.pos, -1.0);
        assert_eq!(before.jerk, 0.0);

        // After the end the jerk is dropped but acceleration is held
        let end = *table.last();
        let after = table.evaluate(2.0);
        assert_eq!(after.jerk, 0.0);
        assert!((after.accel - end.accel).abs() < 1e-12);
        assert!((after.vel - (end.vel + end.accel)).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_time_holds() {
        let mut table = SegmentTable::new(KinematicState {
            jerk: 0.0,
            accel: 0.0,
            vel: 1.0,
            pos: 2.0
        });
        table.append_rising_half_sine(0.5, 2.0).unwrap();
        table.append_falling_half_sine(0.5, 2.0).unwrap();

        let first = table.breakpoints()[0].state();
        let last = table.last().state();

        assert_eq!(table.evaluate(f64::NAN), first);
        assert_eq!(table.evaluate(f64::NEG_INFINITY), first);
        assert_eq!(table.evaluate(f64::INFINITY), last);
    }
}

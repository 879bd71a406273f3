//! # S-curve trajectory module
//!
//! This module synthesises jerk-limited, time-parameterised motion profiles
//! along a single axis. A profile moves from a start velocity to an end
//! velocity over a fixed distance, never exceeding the configured velocity,
//! acceleration and jerk limits, and is the shortest profile of its shape to
//! do so.
//!
//! Profiles are made of two velocity ramps separated by an optional cruise.
//! Each ramp raises (or lowers) the acceleration with a half-sine jerk pulse,
//! an optional constant jerk plateau and a falling half-sine pulse, holds the
//! acceleration, then brings it back to zero with the mirrored jerk sequence.
//!
//! Every segment is stored as a breakpoint holding the cumulative jerk,
//! acceleration, velocity and position at the end of the segment. Evaluation
//! at any time integrates the closed-form segment from the preceding
//! breakpoint.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod profile;
mod segment;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use profile::*;
pub use segment::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of segments appended for a single velocity ramp.
pub const RAMP_SEGMENTS: usize = 7;

/// Maximum number of breakpoints a profile can hold.
///
/// One initial state, two velocity ramps and a cruise segment.
pub const SEGMENT_CAPACITY: usize = 1 + 2 * RAMP_SEGMENTS + 1;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors that can occur while synthesising a profile.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ScurveError {
    #[error("The breakpoint table is full ({0} breakpoints)")]
    CapacityExceeded(usize),

    #[error("Invalid kinematic limits: {0:?}")]
    InvalidLimits(ScurveLimits),

    #[error("Boundary velocities must be within [0, {max}], got start {start} and end {end}")]
    InvalidBoundary {
        start: f64,
        end: f64,
        max: f64
    },

    #[error("Profile distance must be positive, got {0}")]
    ZeroDistance(f64),

    #[error("Cannot change velocity within {distance} m, at least {required} m is needed")]
    Infeasible {
        distance: f64,
        required: f64
    }
}

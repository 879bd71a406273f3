//! # Waypoint navigation module
//!
//! Waypoint navigation turns a sequence of destinations into target
//! positions, velocities and accelerations for the position controller.
//!
//! Each straight leg between an origin and a destination is planned as a
//! jerk-limited S-curve profile along the leg. Every cycle the module
//! advances a time parameter along the current leg and evaluates the profile
//! to get the desired state. The vehicle's error perpendicular to the
//! direction of travel (the cross-track error) is corrected by a bounded
//! proportional controller, and if the error grows the time parameter is
//! slowed down so that the target does not run away from the vehicle.
//!
//! Up to three legs are held at once, the previous leg, the current leg and
//! the next leg. When the next destination is known ahead of time the vehicle
//! can pass through the current destination without stopping (a "fast"
//! waypoint) with its speed reduced according to the angle of the turn.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod legs;
mod params;
mod state;
mod terrain;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use legs::*;
pub use params::*;
pub use state::*;
pub use terrain::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::scurve::ScurveError;
use util::params::{LoadError, SaveError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Legs shorter than this are treated as stationary holds at the destination.
///
/// Units: meters
pub const MIN_LEG_LENGTH_M: f64 = 1e-3;

/// Lowest value of the track time scaler, so the target never stops moving
/// completely while the vehicle is off track.
pub const MIN_TRACK_SCALER: f64 = 0.1;

/// Horizontal speeds below this are considered stationary when deriving yaw.
///
/// Units: meters/second
pub const YAW_SPEED_MIN_MS: f64 = 0.05;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors that can occur during waypoint navigation.
#[derive(Debug, thiserror::Error)]
pub enum WpNavError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(#[from] LoadError),

    #[error("Could not save parameters: {0}")]
    ParamSaveError(#[from] SaveError),

    #[error("Could not create the archive: {0}")]
    ArchiveError(String),

    #[error("No destination has been set")]
    NoDestination,

    #[error("The estimated position or velocity is not finite")]
    NonFiniteNav,

    #[error("Terrain altitude is not available")]
    TerrainUnavailable,

    #[error("Location cannot be converted to an offset from the origin")]
    InvalidLocation,

    #[error("Could not plan the leg: {0}")]
    LegPlanningError(#[from] ScurveError)
}

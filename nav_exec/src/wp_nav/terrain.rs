//! Terrain altitude sources

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::Serialize;

use crate::loc::AltFrame;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Latest rangefinder reading as supplied by the rangefinder driver.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RangefinderState {
    /// True if the rangefinder is enabled
    pub available: bool,

    /// True if the reading is within the sensor's valid range
    pub healthy: bool,

    /// Altitude of the vehicle above the terrain.
    ///
    /// Units: meters
    pub alt_m: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Where terrain altitudes would come from if a terrain relative destination
/// were set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerrainSourceKind {
    Unavailable,
    Rangefinder,
    TerrainDatabase
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A source of terrain heights, typically a terrain database.
pub trait TerrainSource {
    /// Height of the terrain above the navigation origin at the horizontal
    /// position of `position_m`, or `None` if it is not known.
    fn terrain_height_m(&self, position_m: &Vector3<f64>) -> Option<f64>;

    /// Returns true if the source is able to provide heights at all.
    fn is_available(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

/// A fixed terrain height, or none at all.
impl TerrainSource for Option<f64> {
    fn terrain_height_m(&self, _position_m: &Vector3<f64>) -> Option<f64> {
        *self
    }

    fn is_available(&self) -> bool {
        self.is_some()
    }
}

impl RangefinderState {
    /// Returns true if the rangefinder can be used for terrain altitudes.
    pub fn used_and_healthy(&self, use_rangefinder: bool) -> bool {
        use_rangefinder && self.available && self.healthy
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the height of the altitude frame's reference above the origin.
///
/// Returns `None` if the frame is terrain relative and no terrain height is
/// available.
pub fn get_alt_offset(
    frame: AltFrame,
    position_m: &Vector3<f64>,
    rangefinder: Option<&RangefinderState>,
    terrain: &dyn TerrainSource
) -> Option<f64> {
    match frame {
        AltFrame::AboveOrigin => Some(0.0),
        AltFrame::AboveTerrain => match rangefinder {
            Some(rf) => Some(position_m[2] - rf.alt_m),
            None => terrain.terrain_height_m(position_m)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_alt_offset() {
        let pos = Vector3::new(10.0, 5.0, 30.0);
        let rf = RangefinderState {
            available: true,
            healthy: true,
            alt_m: 12.0
        };

        assert_eq!(get_alt_offset(AltFrame::AboveOrigin, &pos, None, &None::<f64>), Some(0.0));
        assert_eq!(get_alt_offset(AltFrame::AboveTerrain, &pos, None, &None::<f64>), None);
        assert_eq!(get_alt_offset(AltFrame::AboveTerrain, &pos, None, &Some(4.0f64)), Some(4.0));
        assert_eq!(
            get_alt_offset(AltFrame::AboveTerrain, &pos, Some(&rf), &Some(4.0f64)),
            Some(18.0)
        );
    }

    #[test]
    fn test_rangefinder_health() {
        let mut rf = RangefinderState {
            available: true,
            healthy: false,
            alt_m: 1.0
        };
        assert!(!rf.used_and_healthy(true));

        rf.healthy = true;
        assert!(rf.used_and_healthy(true));
        assert!(!rf.used_and_healthy(false));
    }
}

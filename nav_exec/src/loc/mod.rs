//! # Localisation module
//!
//! This module provides the vehicle's estimated state as consumed by
//! navigation, and conversions between geodetic locations and offsets from
//! the navigation origin.
//!
//! All offsets are in the North-East-Up (NEU) frame centred on the
//! navigation origin, in meters.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Equatorial radius of the earth (WGS-84).
///
/// Units: meters
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The estimated position and velocity of the vehicle.
///
/// Supplied by the state estimator once per cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavState {
    /// Position relative to the navigation origin.
    ///
    /// Units: meters,
    /// Frame: NEU
    pub position_m: Vector3<f64>,

    /// Velocity.
    ///
    /// Units: meters/second,
    /// Frame: NEU
    pub velocity_ms: Vector3<f64>
}

/// A geodetic location with an altitude in a given frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat_deg: f64,

    pub lon_deg: f64,

    /// Altitude in the frame given by `frame`.
    ///
    /// Units: meters
    pub alt_m: f64,

    pub frame: AltFrame
}

/// Converts between locations and offsets using a flat earth approximation
/// about the origin.
///
/// Accurate to well under a meter within a few kilometers of the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatEarthConverter {
    origin_lat_deg: f64,
    origin_lon_deg: f64,

    /// Scale of longitude, cos(latitude)
    lon_scale: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The reference from which an altitude is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AltFrame {
    /// Altitude above the navigation origin
    AboveOrigin,

    /// Altitude above the terrain directly below the vehicle
    AboveTerrain
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Converts between geodetic locations and offsets from the navigation
/// origin.
pub trait FrameConverter {
    /// Get the NEU offset of a location from the origin.
    ///
    /// The vertical component stays in the location's altitude frame.
    /// Returns `None` if the location cannot be converted.
    fn location_to_offset(&self, loc: &Location) -> Option<Vector3<f64>>;

    /// Get the location of an offset from the origin, with its altitude in
    /// the given frame.
    fn offset_to_location(&self, offset_m: &Vector3<f64>, frame: AltFrame) -> Option<Location>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl NavState {
    pub fn new(position_m: Vector3<f64>, velocity_ms: Vector3<f64>) -> Self {
        Self {
            position_m,
            velocity_ms
        }
    }

    /// Horizontal speed of the vehicle.
    pub fn speed_xy_ms(&self) -> f64 {
        self.velocity_ms.xy().norm()
    }

    /// Returns true if every component of the position and velocity is
    /// finite.
    pub fn is_finite(&self) -> bool {
        self.position_m.iter().chain(self.velocity_ms.iter()).all(|v| v.is_finite())
    }
}

impl Default for AltFrame {
    fn default() -> Self {
        AltFrame::AboveOrigin
    }
}

impl FlatEarthConverter {
    /// Create a converter centred on the given origin.
    pub fn new(origin_lat_deg: f64, origin_lon_deg: f64) -> Self {
        Self {
            origin_lat_deg,
            origin_lon_deg,
            lon_scale: origin_lat_deg.to_radians().cos()
        }
    }

    pub fn origin(&self) -> Location {
        Location {
            lat_deg: self.origin_lat_deg,
            lon_deg: self.origin_lon_deg,
            alt_m: 0.0,
            frame: AltFrame::AboveOrigin
        }
    }
}

impl FrameConverter for FlatEarthConverter {
    fn location_to_offset(&self, loc: &Location) -> Option<Vector3<f64>> {
        if !loc.lat_deg.is_finite() || !loc.lon_deg.is_finite() || loc.lat_deg.abs() > 90.0 {
            return None
        }

        // Wrap the longitude difference across the antimeridian
        let mut d_lon = loc.lon_deg - self.origin_lon_deg;
        if d_lon > 180.0 {
            d_lon -= 360.0;
        }
        else if d_lon < -180.0 {
            d_lon += 360.0;
        }

        Some(Vector3::new(
            (loc.lat_deg - self.origin_lat_deg).to_radians() * EARTH_RADIUS_M,
            d_lon.to_radians() * EARTH_RADIUS_M * self.lon_scale,
            loc.alt_m
        ))
    }

    fn offset_to_location(&self, offset_m: &Vector3<f64>, frame: AltFrame) -> Option<Location> {
        // At the poles longitude is undefined
        if self.lon_scale.abs() < 1e-9 {
            return None
        }

        Some(Location {
            lat_deg: self.origin_lat_deg + (offset_m[0] / EARTH_RADIUS_M).to_degrees(),
            lon_deg: self.origin_lon_deg
                + (offset_m[1] / (EARTH_RADIUS_M * self.lon_scale)).to_degrees(),
            alt_m: offset_m[2],
            frame
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_flat_earth_offsets() {
        let conv = FlatEarthConverter::new(51.0, -1.0);

        // One thousandth of a degree north is about 111 m
        let loc = Location {
            lat_deg: 51.001,
            lon_deg: -1.0,
            alt_m: 20.0,
            frame: AltFrame::AboveOrigin
        };
        let offset = conv.location_to_offset(&loc).unwrap();
        assert!((offset[0] - 111.32).abs() < 0.1);
        assert!(offset[1].abs() < 1e-9);
        assert_eq!(offset[2], 20.0);

        // East offsets shrink with latitude
        let loc = Location { lat_deg: 51.0, lon_deg: -0.999, ..loc };
        let offset = conv.location_to_offset(&loc).unwrap();
        assert!((offset[1] - 111.32 * 51f64.to_radians().cos()).abs() < 0.1);
    }

    #[test]
    fn test_flat_earth_inverse() {
        let conv = FlatEarthConverter::new(-33.9, 151.2);
        let offset = Vector3::new(-420.0, 1250.0, 35.0);

        let loc = conv.offset_to_location(&offset, AltFrame::AboveTerrain).unwrap();
        assert_eq!(loc.frame, AltFrame::AboveTerrain);

        let back = conv.location_to_offset(&loc).unwrap();
        assert!((back - offset).norm() < 1e-6);
    }

    #[test]
    fn test_nav_state_finite() {
        let mut nav = NavState::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.5, 0.0, -0.5));
        assert!(nav.is_finite());

        nav.velocity_ms[2] = f64::INFINITY;
        assert!(!nav.is_finite());

        nav.velocity_ms[2] = 0.0;
        nav.position_m[0] = f64::NAN;
        assert!(!nav.is_finite());
    }

    #[test]
    fn test_invalid_location() {
        let conv = FlatEarthConverter::new(0.0, 0.0);
        let loc = Location {
            lat_deg: 95.0,
            lon_deg: 0.0,
            alt_m: 0.0,
            frame: AltFrame::AboveOrigin
        };
        assert!(conv.location_to_offset(&loc).is_none());
    }

    #[test]
    fn test_antimeridian() {
        let conv = FlatEarthConverter::new(0.0, 179.999);
        let loc = Location {
            lat_deg: 0.0,
            lon_deg: -179.999,
            alt_m: 0.0,
            frame: AltFrame::AboveOrigin
        };
        let offset = conv.location_to_offset(&loc).unwrap();
        assert!((offset[1] - 222.64).abs() < 0.1);
    }
}

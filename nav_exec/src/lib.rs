//! # Navigation library.
//!
//! This library allows other crates in the workspace, and the benchmarks, to
//! access items defined inside the navigation crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Localisation types - estimated vehicle state, locations and frame conversions
pub mod loc;

/// Bounded proportional controller and the square root controller functions
pub mod p_ctrl;

/// Jerk limited S-curve profile generation
pub mod scurve;

/// Waypoint navigation - tracks a sequence of destinations with S-curve legs
pub mod wp_nav;

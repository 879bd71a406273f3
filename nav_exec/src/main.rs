//! Main navigation executable entry point.
//!
//! # Architecture
//!
//! The executable flies a mission loaded from `mission.toml` against a
//! simulated vehicle:
//!
//!     - Initialise the session, logger and modules
//!     - Main loop:
//!         - Waypoint sequencing
//!         - Waypoint navigation processing
//!         - Vehicle simulation
//!     - Write the mission summary into the session directory
//!
//! # Modules
//!
//! All modules (e.g. `wp_nav`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::State` trait.
//!

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use nav_lib::{
    loc::{AltFrame, FlatEarthConverter, Location, NavState},
    wp_nav::{InputData, TargetState, WpNav}
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use color_eyre::{Report, eyre::{WrapErr, eyre}};
use log::{debug, info, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Gain of the simulated vehicle's position loop.
const SIM_POS_GAIN: f64 = 2.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Mission to fly.
#[derive(Debug, Deserialize)]
struct MissionParams {
    /// Target period of one cycle.
    cycle_period_s: f64,

    /// If true each cycle sleeps until its period has elapsed.
    real_time: bool,

    /// The mission is abandoned after this long.
    max_duration_s: f64,

    origin_lat_deg: f64,
    origin_lon_deg: f64,

    /// Height of the terrain above the origin, leave out to simulate having
    /// no terrain data.
    terrain_height_m: Option<f64>,

    /// Starting position of the simulated vehicle.
    ///
    /// Units: meters,
    /// Frame: NEU
    start_pos_m: [f64; 3],

    waypoints: Vec<MissionWaypoint>
}

/// A single waypoint of the mission.
#[derive(Debug, Clone, Copy, Deserialize)]
struct MissionWaypoint {
    lat_deg: f64,
    lon_deg: f64,
    alt_m: f64,

    #[serde(default)]
    frame: AltFrame,

    /// If true the vehicle stops at the waypoint, otherwise it passes
    /// through it on the way to the next one.
    #[serde(default)]
    is_stop: bool
}

/// Summary written at the end of the mission.
#[derive(Debug, Default, Serialize)]
struct MissionSummary {
    started_at: String,
    num_waypoints: usize,
    num_reached: usize,
    num_cycles: u64,
    mission_time_s: f64,
    max_track_error_m: f64,
    final_pos_m: [f64; 3],
    completed: bool
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "nav_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Waypoint Navigation Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let mission: MissionParams = util::params::load("mission.toml")
        .wrap_err("Could not load mission params")?;

    if mission.waypoints.is_empty() {
        return Err(eyre!("The mission contains no waypoints"))
    }
    if !(mission.cycle_period_s > 0.0) {
        return Err(eyre!(
            "Expected a positive cycle period, found {}", mission.cycle_period_s
        ))
    }

    info!(
        "Mission loaded with {} waypoints, cycle period {:.3} s",
        mission.waypoints.len(),
        mission.cycle_period_s
    );

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut wp_nav = WpNav::default();
    wp_nav.init("wp_nav.toml", &session)
        .wrap_err("Failed to initialise WpNav")?;
    info!("WpNav init complete");

    info!("Module initialisation complete\n");

    let converter = FlatEarthConverter::new(mission.origin_lat_deg, mission.origin_lon_deg);
    let mut nav = NavState::new(Vector3::from(mission.start_pos_m), Vector3::zeros());

    let mut summary = MissionSummary {
        started_at: Utc::now().to_rfc3339(),
        num_waypoints: mission.waypoints.len(),
        ..Default::default()
    };

    // ---- MAIN LOOP ----

    let mut wp_index = 0;
    set_waypoint(&mut wp_nav, &mission, wp_index, &converter, &nav)
        .wrap_err("Failed to set the first waypoint")?;

    info!("Begining main loop\n");

    loop {

        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- WAYPOINT NAVIGATION ----

        let input = InputData {
            nav,
            dt_s: mission.cycle_period_s,
            terrain_height_m: mission.terrain_height_m
        };

        let (target, report) = wp_nav.proc(&input)
            .wrap_err("Error during WpNav processing")?;

        if report.target_held {
            warn!("Terrain data unavailable, WpNav is holding its target");
        }

        summary.max_track_error_m = summary.max_track_error_m.max(report.track_error_m);

        // ---- VEHICLE SIMULATION ----

        sim_step(&mut nav, &target, mission.cycle_period_s);

        summary.num_cycles += 1;
        summary.mission_time_s += mission.cycle_period_s;

        // ---- WAYPOINT SEQUENCING ----

        if report.reached_destination {
            info!(
                "Waypoint {} reached at {:.2} s",
                wp_index,
                summary.mission_time_s
            );
            summary.num_reached += 1;
            wp_index += 1;

            if wp_index >= mission.waypoints.len() {
                info!("All waypoints reached");
                summary.completed = true;
                break
            }

            set_waypoint(&mut wp_nav, &mission, wp_index, &converter, &nav)
                .wrap_err_with(|| format!("Failed to set waypoint {}", wp_index))?;
        }

        if summary.mission_time_s > mission.max_duration_s {
            warn!(
                "Mission abandoned after {:.2} s with {} of {} waypoints reached",
                summary.mission_time_s,
                summary.num_reached,
                summary.num_waypoints
            );
            break
        }

        // ---- CYCLE MANAGEMENT ----

        if mission.real_time {
            let cycle_dur = Instant::now() - cycle_start_instant;

            match Duration::from_secs_f64(mission.cycle_period_s)
                .checked_sub(cycle_dur)
            {
                Some(d) => thread::sleep(d),
                None => warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - mission.cycle_period_s
                )
            }
        }
    }

    // ---- SHUTDOWN ----

    summary.final_pos_m = [nav.position_m[0], nav.position_m[1], nav.position_m[2]];

    let mut summary_path = session.session_root.clone();
    summary_path.push("summary.json");
    let summary_file = File::create(&summary_path)
        .wrap_err("Could not create the mission summary file")?;
    serde_json::to_writer_pretty(summary_file, &summary)
        .wrap_err("Could not write the mission summary")?;

    info!("Mission summary written to {:?}", summary_path);
    info!("End of execution");

    Ok(())
}

/// Set the destination to the waypoint at `index`, passing the following
/// waypoint along so it can be flown through without stopping.
fn set_waypoint(
    wp_nav: &mut WpNav,
    mission: &MissionParams,
    index: usize,
    converter: &FlatEarthConverter,
    nav: &NavState
) -> Result<(), Report> {
    let wp = mission.waypoints.get(index)
        .ok_or_else(|| eyre!("No waypoint at index {}", index))?;
    let next = mission.waypoints.get(index + 1).map(|n| n.location());

    // The final waypoint is always a stop
    let is_stop = wp.is_stop || next.is_none();

    debug!("Setting waypoint {}: {:?} (stop: {})", index, wp.location(), is_stop);

    wp_nav.set_destination_loc(
        &wp.location(),
        next.as_ref(),
        is_stop,
        converter,
        nav,
        &mission.terrain_height_m
    )?;

    Ok(())
}

/// Move the simulated vehicle towards the target for one cycle.
///
/// The vehicle follows the target velocity with a proportional correction on
/// its position error.
fn sim_step(nav: &mut NavState, target: &TargetState, dt: f64) {
    nav.velocity_ms = target.vel_ms + (target.pos_m - nav.position_m) * SIM_POS_GAIN;
    nav.position_m += nav.velocity_ms * dt;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MissionWaypoint {
    fn location(&self) -> Location {
        Location {
            lat_deg: self.lat_deg,
            lon_deg: self.lon_deg,
            alt_m: self.alt_m,
            frame: self.frame
        }
    }
}

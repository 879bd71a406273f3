//! Waypoint navigation module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use nalgebra::{Vector2, Vector3};
use serde::Serialize;

// Internal
use super::*;
use crate::loc::{AltFrame, FrameConverter, Location, NavState};
use crate::p_ctrl::{inv_sqrt_controller, BoundedPController};
use crate::scurve::{ScurveError, ScurveLimits, ScurveProfile};
use util::{
    archive::{Archived, Archiver},
    maths::{is_positive, wrap_2pi},
    module::State,
    params::{self, ParamStore},
    session::{self, Session}
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Waypoint navigation.
pub struct WpNav {
    params: Params,

    // ---- SPEED DEMANDS ----

    /// Horizontal speed the legs are planned with
    speed_xy_ms: f64,

    /// Horizontal speed requested by `set_speed_xy`, which `speed_xy_ms` is
    /// slewed towards while a leg is active
    desired_speed_xy_ms: f64,
    speed_up_ms: f64,
    speed_down_ms: f64,

    // ---- LEGS ----

    legs: LegSlots,

    /// Origin of the current leg, in the leg's altitude frame
    origin_m: Vector3<f64>,

    /// Destination of the current leg, in the leg's altitude frame
    destination_m: Vector3<f64>,

    frame: AltFrame,

    // ---- TRACKING ----

    /// Time along the current leg's profile
    track_time_s: f64,

    /// Rate at which the track time advances relative to real time
    track_scaler: f64,

    /// Distance of the vehicle from the track, perpendicular to the direction
    /// of travel
    track_error_m: f64,

    /// Cross-track position controller
    pos_ctrl: BoundedPController,

    flags: Flags,

    yaw_rad: f64,
    yaw_rate_rads: f64,

    // ---- EXTERNAL DATA ----

    /// Most recent estimated state
    nav: NavState,

    rangefinder: RangefinderState,

    // ---- OUTPUTS ----

    target: TargetState,
    report: StatusReport,

    arch: Archiver
}

/// Input data to the module
#[derive(Debug, Default, Clone, Copy)]
pub struct InputData {
    pub nav: NavState,

    /// Time since the previous cycle
    pub dt_s: f64,

    /// Height of the terrain above the origin if known.
    pub terrain_height_m: Option<f64>
}

/// Target for the position controller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct TargetState {
    /// Units: meters,
    /// Frame: NEU, above origin
    pub pos_m: Vector3<f64>,

    /// Desired velocity including the cross-track correction.
    pub vel_ms: Vector3<f64>,

    pub accel_mss: Vector3<f64>,

    /// Heading, clockwise from north in [0, 2pi)
    pub yaw_rad: f64,

    pub yaw_rate_rads: f64
}

/// The status report containing various flags and monitoring quantities.
#[derive(Debug, Default, Copy, Clone, Serialize)]
pub struct StatusReport {
    /// True if external data was missing and the previous target was held
    pub target_held: bool,

    pub reached_destination: bool,

    pub fast_waypoint: bool,

    /// True if the cross-track error was large enough to be limited, moving
    /// the target towards the vehicle
    pub error_limited: bool,

    pub track_time_s: f64,

    pub track_scaler: f64,

    pub track_error_m: f64,

    /// Horizontal distance to the destination
    pub distance_to_dest_m: f64
}

#[derive(Debug, Default, Copy, Clone)]
struct Flags {
    reached_destination: bool,

    /// The vehicle passes through the destination without stopping
    fast_waypoint: bool,

    /// The current leg is a spline. Only straight legs are planned so this
    /// is cleared by every new leg.
    segment_is_spline: bool,

    /// A yaw target has been set since the module was reset
    yaw_set: bool
}

/// A single row of the archive.
#[derive(Serialize)]
struct ArchiveRow {
    time_s: f64,
    track_time_s: f64,
    target_pos_n_m: f64,
    target_pos_e_m: f64,
    target_pos_u_m: f64,
    target_vel_n_ms: f64,
    target_vel_e_ms: f64,
    target_vel_u_ms: f64,
    yaw_rad: f64,
    pos_n_m: f64,
    pos_e_m: f64,
    pos_u_m: f64,
    track_error_m: f64,
    track_scaler: f64,
    reached_destination: bool,
    target_held: bool
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for WpNav {
    type InitData = &'static str;

    type InputData = InputData;
    type OutputData = TargetState;
    type StatusReport = StatusReport;
    type Error = WpNavError;

    /// Initialise the WpNav module.
    ///
    /// Expected init data is a path to the parameter file, relative to the
    /// params directory.
    fn init(
        &mut self,
        init_data: Self::InitData,
        session: &Session
    ) -> Result<(), Self::Error> {
        let params: Params = params::load(init_data)?;
        *self = WpNav::new(params);

        self.arch = Archiver::from_path(session, "wp_nav.csv")
            .map_err(|e| WpNavError::ArchiveError(e.to_string()))?;

        Ok(())
    }

    /// Advance along the current leg.
    ///
    /// If external data is missing the previous target is returned with
    /// `target_held` set in the report.
    fn proc(
        &mut self,
        input_data: &Self::InputData
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::Error> {
        if self.legs.current().is_none() {
            return Err(WpNavError::NoDestination)
        }

        self.advance(input_data.dt_s, &input_data.nav, &input_data.terrain_height_m);

        if let Err(e) = self.write() {
            warn!("Could not write WpNav archive: {}", e);
        }

        Ok((self.target, self.report))
    }
}

impl Archived for WpNav {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let row = ArchiveRow {
            time_s: session::get_elapsed_seconds(),
            track_time_s: self.track_time_s,
            target_pos_n_m: self.target.pos_m[0],
            target_pos_e_m: self.target.pos_m[1],
            target_pos_u_m: self.target.pos_m[2],
            target_vel_n_ms: self.target.vel_ms[0],
            target_vel_e_ms: self.target.vel_ms[1],
            target_vel_u_ms: self.target.vel_ms[2],
            yaw_rad: self.target.yaw_rad,
            pos_n_m: self.nav.position_m[0],
            pos_e_m: self.nav.position_m[1],
            pos_u_m: self.nav.position_m[2],
            track_error_m: self.track_error_m,
            track_scaler: self.track_scaler,
            reached_destination: self.flags.reached_destination,
            target_held: self.report.target_held
        };

        self.arch.serialise(row)
    }
}

impl Default for WpNav {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl WpNav {
    /// Create a new instance with the given parameters.
    ///
    /// Parameters outside of their valid ranges are clamped.
    pub fn new(mut params: Params) -> Self {
        params.sanitise();

        let mut wp_nav = Self {
            speed_xy_ms: params.speed_xy_ms,
            desired_speed_xy_ms: params.speed_xy_ms,
            speed_up_ms: params.speed_up_ms,
            speed_down_ms: params.speed_down_ms,
            legs: LegSlots::default(),
            origin_m: Vector3::zeros(),
            destination_m: Vector3::zeros(),
            frame: AltFrame::AboveOrigin,
            track_time_s: 0.0,
            track_scaler: 1.0,
            track_error_m: 0.0,
            pos_ctrl: BoundedPController::new(params.pos_k_p, 0.0),
            flags: Flags::default(),
            yaw_rad: 0.0,
            yaw_rate_rads: 0.0,
            nav: NavState::default(),
            rangefinder: RangefinderState::default(),
            target: TargetState::default(),
            report: StatusReport::default(),
            arch: Archiver::default(),
            params
        };
        wp_nav.update_pos_ctrl_limits();

        wp_nav
    }

    /// Load the parameters from a store, replacing the current ones.
    pub fn load_params(&mut self, store: &dyn ParamStore<Params>) -> Result<(), WpNavError> {
        let mut params = store.load()?;
        params.sanitise();

        self.speed_xy_ms = params.speed_xy_ms;
        self.desired_speed_xy_ms = params.speed_xy_ms;
        self.speed_up_ms = params.speed_up_ms;
        self.speed_down_ms = params.speed_down_ms;
        self.pos_ctrl.reconfigure(params.pos_k_p, 0.0);
        self.params = params;
        self.update_pos_ctrl_limits();

        Ok(())
    }

    /// Save the current parameters into a store.
    pub fn save_params(&self, store: &dyn ParamStore<Params>) -> Result<(), WpNavError> {
        store.save(&self.params)?;
        Ok(())
    }

    /// Clear all legs and flags, ready for a new mission.
    pub fn reset(&mut self) {
        self.legs.clear();
        self.track_time_s = 0.0;
        self.track_scaler = 1.0;
        self.track_error_m = 0.0;
        self.flags = Flags::default();
        self.yaw_rate_rads = 0.0;
        self.target = TargetState::default();
        self.report = StatusReport::default();

        // Any speed change still being slewed is applied straight away
        self.speed_xy_ms = self.desired_speed_xy_ms;
        self.update_pos_ctrl_limits();
    }

    // ---- DESTINATIONS ----

    /// Set the destination of a new leg.
    ///
    /// If a leg is already being tracked the new leg starts from the current
    /// target, otherwise it starts from the estimated position and velocity.
    /// When `next_m` is given and `is_stop` is false the vehicle passes
    /// through the destination without stopping, and the leg to `next_m` is
    /// planned ahead of time.
    pub fn set_destination(
        &mut self,
        destination_m: Vector3<f64>,
        frame: AltFrame,
        next_m: Option<Vector3<f64>>,
        is_stop: bool,
        nav: &NavState,
        terrain: &dyn TerrainSource
    ) -> Result<(), WpNavError> {
        if !nav.is_finite() {
            return Err(WpNavError::NonFiniteNav)
        }
        self.nav = *nav;

        let offset = self.alt_offset(frame, terrain)
            .ok_or(WpNavError::TerrainUnavailable)?;

        // Find where the new leg starts from
        let mut track_time_s = 0.0;
        let mut carried_fast = false;
        let (origin_m, start_vel) = match self.legs.current() {
            Some(leg) if self.frame == frame => {
                let duration = leg.duration();
                let start = leg.evaluate(self.track_time_s.min(duration));

                // Carry on from a completed fast waypoint at the profile's own
                // exit velocity, keeping the track scaler and any time already
                // spent beyond the end of the leg. Otherwise start from the
                // velocity actually being demanded.
                if self.flags.fast_waypoint && self.flags.reached_destination {
                    carried_fast = true;
                    track_time_s = (self.track_time_s - duration).max(0.0);
                    (start.pos_m, start.vel_ms)
                }
                else {
                    (start.pos_m, start.vel_ms * self.track_scaler)
                }
            },
            _ => (
                nav.position_m - Vector3::new(0.0, 0.0, offset),
                nav.velocity_ms
            )
        };

        let delta = destination_m - origin_m;
        let direction = if delta.norm() > MIN_LEG_LENGTH_M {
            delta.normalize()
        }
        else {
            Vector3::zeros()
        };

        let limits = self.limits_along(&direction);

        // The pass through speed is planned for the exit of a fast waypoint,
        // otherwise only the component along the new leg is kept.
        let start_speed_ms = if carried_fast {
            start_vel.norm()
        }
        else {
            start_vel.dot(&direction).max(0.0)
        };

        let end_speed_ms = match next_m {
            Some(next) if !is_stop => self.pass_through_speed(
                &origin_m,
                &destination_m,
                &next,
                start_speed_ms,
                &limits
            ),
            _ => 0.0
        };

        // Use the precomputed next leg if it was planned for these exact
        // conditions
        let promote = self.legs.next()
            .map(|n| n.matches(&origin_m, &destination_m, &limits, start_speed_ms, end_speed_ms))
            .unwrap_or(false);

        if promote {
            self.legs.promote_next();
            debug!("Promoted next leg to {:?}", destination_m);
        }
        else {
            let leg = self.plan_leg(origin_m, destination_m, limits, start_speed_ms, end_speed_ms)?;
            self.legs.retarget(leg, None);
        }

        // Plan the following leg ahead of time
        let next_leg = match next_m {
            Some(next) => {
                let end_speed = self.legs.current().map(|l| l.end_speed_ms()).unwrap_or(0.0);
                let next_limits = self.limits_along(&(next - destination_m));
                match Leg::new(destination_m, next, next_limits, end_speed, 0.0) {
                    Ok(l) => Some(l),
                    Err(e) => {
                        debug!("Could not plan the leg after {:?}: {}", destination_m, e);
                        None
                    }
                }
            },
            None => None
        };
        self.legs.set_next(next_leg);

        // Update state for the new leg
        let (leg_end_speed, leg_duration, leg_length_xy) = match self.legs.current() {
            Some(l) => (l.end_speed_ms(), l.duration(), l.length_xy_m()),
            None => return Err(WpNavError::NoDestination)
        };

        if !carried_fast {
            self.track_scaler = 1.0;
        }
        self.origin_m = origin_m;
        self.destination_m = destination_m;
        self.frame = frame;
        self.track_time_s = track_time_s;
        self.flags.reached_destination = false;
        self.flags.fast_waypoint = !is_stop && is_positive(leg_end_speed);
        self.flags.segment_is_spline = false;

        // Face along the leg if it's long enough
        if leg_length_xy >= self.params.yaw_dist_min_m {
            self.yaw_rad = wrap_2pi(direction[1].atan2(direction[0]));
            self.flags.yaw_set = true;
        }

        debug!(
            "New leg {:?} -> {:?} ({:?}), {:.2} m/s -> {:.2} m/s over {:.2} s",
            origin_m,
            destination_m,
            frame,
            start_speed_ms,
            leg_end_speed,
            leg_duration
        );

        Ok(())
    }

    /// Set the destination from a location.
    ///
    /// A next location in a different altitude frame is ignored, making the
    /// destination a stop.
    pub fn set_destination_loc(
        &mut self,
        destination: &Location,
        next: Option<&Location>,
        is_stop: bool,
        converter: &dyn FrameConverter,
        nav: &NavState,
        terrain: &dyn TerrainSource
    ) -> Result<(), WpNavError> {
        let destination_m = converter.location_to_offset(destination)
            .ok_or(WpNavError::InvalidLocation)?;

        let next_m = match next {
            Some(n) if n.frame == destination.frame => Some(
                converter.location_to_offset(n).ok_or(WpNavError::InvalidLocation)?
            ),
            Some(_) => {
                debug!("Next location is in a different altitude frame, ignoring it");
                None
            },
            None => None
        };

        self.set_destination(destination_m, destination.frame, next_m, is_stop, nav, terrain)
    }

    /// Set the destination from north, east, down offsets from the origin.
    ///
    /// The destination is always above the origin.
    pub fn set_destination_ned(
        &mut self,
        destination_ned_m: Vector3<f64>,
        next_ned_m: Option<Vector3<f64>>,
        is_stop: bool,
        nav: &NavState,
        terrain: &dyn TerrainSource
    ) -> Result<(), WpNavError> {
        let ned_to_neu = |v: Vector3<f64>| Vector3::new(v[0], v[1], -v[2]);

        self.set_destination(
            ned_to_neu(destination_ned_m),
            AltFrame::AboveOrigin,
            next_ned_m.map(ned_to_neu),
            is_stop,
            nav,
            terrain
        )
    }

    // ---- SHIFTS ----

    /// Move the current leg so that it starts from the vehicle's position,
    /// moving the destination by the same amount.
    ///
    /// Only has an effect before the target has started along the leg, for
    /// example just before takeoff.
    pub fn shift_origin_to_current_pos(
        &mut self,
        nav: &NavState,
        terrain: &dyn TerrainSource
    ) -> Result<(), WpNavError> {
        if !nav.is_finite() {
            return Err(WpNavError::NonFiniteNav)
        }
        self.nav = *nav;

        let leg = self.legs.current().ok_or(WpNavError::NoDestination)?;
        if self.track_time_s > 0.0 {
            debug!("Target already moving along the leg, origin not shifted");
            return Ok(())
        }

        let offset = self.alt_offset(self.frame, terrain)
            .ok_or(WpNavError::TerrainUnavailable)?;
        let shift = nav.position_m - Vector3::new(0.0, 0.0, offset) - leg.origin_m();

        let shifted = Leg::new(
            leg.origin_m() + shift,
            leg.destination_m() + shift,
            *leg.limits(),
            leg.start_speed_ms(),
            leg.end_speed_ms()
        )?;
        let next = self.legs.next().cloned();
        self.legs.replace_current(shifted, next);

        self.origin_m += shift;
        self.destination_m += shift;
        self.target.pos_m = nav.position_m;

        info!("Leg shifted by {:?} to start from the current position", shift);

        Ok(())
    }

    /// Move the origin and destination horizontally onto the vehicle's
    /// position, leaving a vertical leg from the current target altitude.
    pub fn shift_origin_and_destination_to_current_pos_xy(
        &mut self,
        nav: &NavState
    ) -> Result<(), WpNavError> {
        if !nav.is_finite() {
            return Err(WpNavError::NonFiniteNav)
        }
        self.nav = *nav;

        self.shift_xy(nav.position_m.xy())
    }

    /// Move the origin and destination horizontally onto the point where the
    /// vehicle would stop, leaving a vertical leg from the current target
    /// altitude.
    pub fn shift_origin_and_destination_to_stopping_point_xy(
        &mut self,
        nav: &NavState
    ) -> Result<(), WpNavError> {
        if !nav.is_finite() {
            return Err(WpNavError::NonFiniteNav)
        }
        self.nav = *nav;

        let stop = self.get_stopping_point_xy();
        self.shift_xy(stop.xy())
    }

    // ---- TRACKING ----

    /// Advance the target along the current leg.
    ///
    /// Returns false if there is no leg, if the estimated state or time step
    /// are not finite, or if the terrain altitude needed by the leg's frame
    /// is not available. In all of these cases the previous target is held.
    pub fn advance(&mut self, dt: f64, nav: &NavState, terrain: &dyn TerrainSource) -> bool {
        self.report.target_held = true;

        if !nav.is_finite() || !dt.is_finite() {
            warn!("Non-finite navigation state or time step, holding target");
            return false
        }
        self.nav = *nav;

        let offset = match self.alt_offset(self.frame, terrain) {
            Some(o) => o,
            None => {
                trace!("Terrain altitude unavailable, holding target");
                return false
            }
        };

        if self.legs.current().is_none() {
            return false
        }
        let dt = dt.max(0.0);

        // ---- SPEED CHANGES ----

        self.update_speed_xy(dt);

        let leg = match self.legs.current() {
            Some(l) => l,
            None => return false
        };

        // ---- TRACK TIME ----

        // Slow the target down as the vehicle falls behind, relative to how
        // far it could be before the correction saturates
        let (_, leash_m) = self.pos_ctrl.error_limits();
        let target_scaler = if leash_m.is_finite() && is_positive(leash_m) {
            (1.0 - self.track_error_m / leash_m).clamp(MIN_TRACK_SCALER, 1.0)
        }
        else {
            1.0
        };

        let limits = *leg.limits();
        let max_change = 0.5 * limits.accel_max / limits.vel_max * dt;
        self.track_scaler += (target_scaler - self.track_scaler).clamp(-max_change, max_change);
        self.track_time_s += dt * self.track_scaler;

        // ---- DESIRED STATE ----

        let desired = leg.evaluate(self.track_time_s);
        let leg_direction = *leg.direction();
        let leg_duration = leg.duration();
        let leg_length_xy = leg.length_xy_m();

        let mut pos_m = desired.pos_m + Vector3::new(0.0, 0.0, offset);
        let vel_ms = desired.vel_ms * self.track_scaler;
        let accel_mss = desired.accel_mss * self.track_scaler.powi(2);

        // ---- CROSS-TRACK CORRECTION ----

        let along = if vel_ms.norm() > 0.0 {
            vel_ms.normalize()
        }
        else {
            leg_direction
        };
        let error = nav.position_m - pos_m;
        let perp = error - along * error.dot(&along);
        self.track_error_m = perp.norm();

        self.pos_ctrl.reconfigure(self.params.pos_k_p, dt);
        let mut correction_ms = Vector3::zeros();
        let mut error_limited = false;

        if is_positive(self.track_error_m) {
            // Unit vector from the vehicle towards the track, along which the
            // track is at zero and the vehicle is at -track_error
            let towards_track = -perp / self.track_error_m;
            let mut track_offset_m = 0.0;
            let update = self.pos_ctrl.update(&mut track_offset_m, -self.track_error_m);

            pos_m += towards_track * track_offset_m;
            correction_ms = towards_track * update.output;
            error_limited = update.limit_min || update.limit_max;
        }

        // ---- REACHED ----

        if !self.flags.reached_destination {
            let reached = if self.flags.fast_waypoint {
                self.track_time_s >= leg_duration
            }
            else {
                self.reached_destination_xy()
            };

            if reached {
                self.flags.reached_destination = true;
                info!("Reached destination {:?}", self.destination_m);
            }
        }

        // ---- YAW ----

        self.update_yaw(&vel_ms, &accel_mss, leg_length_xy);

        // ---- OUTPUTS ----

        self.target = TargetState {
            pos_m,
            vel_ms: vel_ms + correction_ms,
            accel_mss,
            yaw_rad: self.yaw_rad,
            yaw_rate_rads: self.yaw_rate_rads
        };

        self.report = StatusReport {
            target_held: false,
            reached_destination: self.flags.reached_destination,
            fast_waypoint: self.flags.fast_waypoint,
            error_limited,
            track_time_s: self.track_time_s,
            track_scaler: self.track_scaler,
            track_error_m: self.track_error_m,
            distance_to_dest_m: self.get_distance_to_destination()
        };

        trace!(
            "t = {:.3} s, scaler = {:.3}, xtrack = {:.3} m",
            self.track_time_s,
            self.track_scaler,
            self.track_error_m
        );

        true
    }

    // ---- SPEEDS ----

    /// Set the horizontal speed.
    ///
    /// With no leg active the speed applies straight away. Otherwise it is
    /// slewed towards the new value at the horizontal acceleration limit by
    /// `advance`, replanning the rest of the current leg as it changes.
    pub fn set_speed_xy(&mut self, speed_ms: f64) {
        self.desired_speed_xy_ms = speed_ms.max(SPEED_MIN_MS);

        if self.legs.current().is_none() {
            self.speed_xy_ms = self.desired_speed_xy_ms;
            self.update_pos_ctrl_limits();
        }
    }

    /// Horizontal speed the current leg is planned with.
    pub fn get_speed_xy(&self) -> f64 {
        self.speed_xy_ms
    }

    /// Set the climb speed for future legs.
    pub fn set_speed_up(&mut self, speed_ms: f64) {
        self.speed_up_ms = speed_ms.abs().max(SPEED_MIN_MS);
    }

    /// Set the descent speed for future legs.
    pub fn set_speed_down(&mut self, speed_ms: f64) {
        self.speed_down_ms = speed_ms.abs().max(SPEED_MIN_MS);
    }

    pub fn get_default_speed_xy(&self) -> f64 {
        self.params.speed_xy_ms
    }

    pub fn get_default_speed_up(&self) -> f64 {
        self.params.speed_up_ms
    }

    pub fn get_default_speed_down(&self) -> f64 {
        self.params.speed_down_ms
    }

    // ---- TERRAIN ----

    /// Provide the latest rangefinder reading.
    pub fn set_rangefinder_alt(&mut self, available: bool, healthy: bool, alt_m: f64) {
        self.rangefinder = RangefinderState {
            available,
            healthy,
            alt_m
        };
    }

    /// Returns true if the rangefinder is enabled by parameter and reading
    /// healthily.
    pub fn rangefinder_used_and_healthy(&self) -> bool {
        self.rangefinder.used_and_healthy(self.params.rangefinder_use)
    }

    /// Where terrain altitudes would come from for a terrain relative leg.
    pub fn get_terrain_source(&self, terrain: &dyn TerrainSource) -> TerrainSourceKind {
        if self.rangefinder.available && self.params.rangefinder_use {
            TerrainSourceKind::Rangefinder
        }
        else if terrain.is_available() {
            TerrainSourceKind::TerrainDatabase
        }
        else {
            TerrainSourceKind::Unavailable
        }
    }

    // ---- QUERIES ----

    /// Estimate where the vehicle would stop if it decelerated now within
    /// the acceleration limits.
    pub fn get_stopping_point(&self) -> Vector3<f64> {
        let mut stop = self.get_stopping_point_xy();

        stop[2] += inv_sqrt_controller(
            self.nav.velocity_ms[2],
            self.params.pos_k_p,
            self.params.accel_z_mss
        );

        stop
    }

    /// Estimate where the vehicle would stop horizontally, keeping the
    /// current altitude.
    pub fn get_stopping_point_xy(&self) -> Vector3<f64> {
        let mut stop = self.nav.position_m;

        let vel_xy = self.nav.velocity_ms.xy();
        let speed = vel_xy.norm();
        if is_positive(speed) {
            let dist = inv_sqrt_controller(speed, self.params.pos_k_p, self.pos_ctrl.d_out_max());
            stop[0] += vel_xy[0] / speed * dist;
            stop[1] += vel_xy[1] / speed * dist;
        }

        stop
    }

    /// Horizontal distance from the vehicle to the destination.
    pub fn get_distance_to_destination(&self) -> f64 {
        (self.destination_m.xy() - self.nav.position_m.xy()).norm()
    }

    /// Bearing from the vehicle to the destination, clockwise from north in
    /// [0, 2pi).
    pub fn get_bearing_to_destination(&self) -> f64 {
        let delta = self.destination_m - self.nav.position_m;
        wrap_2pi(delta[1].atan2(delta[0]))
    }

    pub fn get_yaw(&self) -> f64 {
        self.yaw_rad
    }

    pub fn get_yaw_rate(&self) -> f64 {
        self.yaw_rate_rads
    }

    pub fn is_yaw_set(&self) -> bool {
        self.flags.yaw_set
    }

    pub fn crosstrack_error(&self) -> f64 {
        self.track_error_m
    }

    /// Returns true once the destination has been reached. Stays true until
    /// a new destination is set.
    pub fn reached_destination(&self) -> bool {
        self.flags.reached_destination
    }

    /// Returns true if the vehicle is currently within the waypoint radius.
    pub fn reached_destination_xy(&self) -> bool {
        self.get_distance_to_destination() < self.params.radius_m
    }

    pub fn is_fast_waypoint(&self) -> bool {
        self.flags.fast_waypoint
    }

    pub fn is_segment_spline(&self) -> bool {
        self.flags.segment_is_spline
    }

    pub fn get_origin(&self) -> &Vector3<f64> {
        &self.origin_m
    }

    pub fn get_destination(&self) -> &Vector3<f64> {
        &self.destination_m
    }

    pub fn get_frame(&self) -> AltFrame {
        self.frame
    }

    /// Get the destination as a location, if one has been set.
    pub fn get_destination_loc(&self, converter: &dyn FrameConverter) -> Option<Location> {
        self.legs.current()?;
        converter.offset_to_location(&self.destination_m, self.frame)
    }

    pub fn target(&self) -> &TargetState {
        &self.target
    }

    pub fn report(&self) -> &StatusReport {
        &self.report
    }

    pub fn legs(&self) -> &LegSlots {
        &self.legs
    }

    pub fn track_time_s(&self) -> f64 {
        self.track_time_s
    }

    pub fn track_scaler(&self) -> f64 {
        self.track_scaler
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    // ---- PRIVATE ----

    fn alt_offset(&self, frame: AltFrame, terrain: &dyn TerrainSource) -> Option<f64> {
        let rangefinder = if self.rangefinder_used_and_healthy() {
            Some(&self.rangefinder)
        }
        else {
            None
        };

        get_alt_offset(frame, &self.nav.position_m, rangefinder, terrain)
    }

    fn limits_along(&self, direction: &Vector3<f64>) -> ScurveLimits {
        leg_limits(
            direction,
            self.speed_xy_ms,
            self.speed_up_ms,
            self.speed_down_ms,
            &self.params
        )
    }

    /// Error limits of the cross-track controller follow from the horizontal
    /// speed and acceleration limits.
    fn update_pos_ctrl_limits(&mut self) {
        self.pos_ctrl.set_limits(
            -self.speed_xy_ms,
            self.speed_xy_ms,
            self.params.accel_xy_mss,
            self.params.jerk_msss
        );
    }

    /// Slew the horizontal speed towards the requested speed, replanning the
    /// rest of the current leg whenever it changes.
    fn update_speed_xy(&mut self, dt: f64) {
        let change = self.desired_speed_xy_ms - self.speed_xy_ms;
        let max_change = self.params.accel_xy_mss * dt;
        if change == 0.0 || !(max_change > 0.0) {
            return
        }

        if change.abs() <= max_change {
            self.speed_xy_ms = self.desired_speed_xy_ms;
        }
        else {
            self.speed_xy_ms += max_change.copysign(change);
        }
        self.update_pos_ctrl_limits();

        if let Err(e) = self.replan_current_leg() {
            debug!("Could not replan the leg at {:.2} m/s: {}", self.speed_xy_ms, e);
        }
    }

    /// Replan the rest of the current leg from the current desired state with
    /// the current speed limits.
    ///
    /// The previous leg is kept, the next leg is replanned from the new exit
    /// speed and the track scaler is left alone.
    fn replan_current_leg(&mut self) -> Result<(), WpNavError> {
        let leg = match self.legs.current() {
            Some(l) => l,
            None => return Ok(())
        };

        // Nothing left to replan
        if self.flags.reached_destination || self.track_time_s >= leg.duration() {
            return Ok(())
        }

        let start = leg.evaluate(self.track_time_s);
        let destination_m = *leg.destination_m();
        let direction = *leg.direction();
        let limits = self.limits_along(&direction);

        let start_speed_ms = start.vel_ms.dot(&direction).max(0.0).min(limits.vel_max);
        let end_speed_ms = leg.end_speed_ms().min(limits.vel_max);

        let replanned = Leg::new(start.pos_m, destination_m, limits, start_speed_ms, end_speed_ms)?;

        let next = match self.legs.next() {
            Some(n) => {
                let next_dest = *n.destination_m();
                let next_limits = self.limits_along(&(next_dest - destination_m));
                Leg::new(destination_m, next_dest, next_limits, end_speed_ms, 0.0).ok()
            },
            None => None
        };

        self.legs.replace_current(replanned, next);
        self.track_time_s = 0.0;

        trace!(
            "Replanned leg to {:?} at {:.2} m/s from {:.2} m/s",
            destination_m,
            limits.vel_max,
            start_speed_ms
        );

        Ok(())
    }

    /// Replace the current leg with a vertical leg at `xy`, from the current
    /// target altitude to the destination's altitude.
    fn shift_xy(&mut self, xy: Vector2<f64>) -> Result<(), WpNavError> {
        let leg = self.legs.current().ok_or(WpNavError::NoDestination)?;
        let origin_z = leg.evaluate(self.track_time_s).pos_m[2];

        let origin_m = Vector3::new(xy[0], xy[1], origin_z);
        let destination_m = Vector3::new(xy[0], xy[1], self.destination_m[2]);
        let limits = self.limits_along(&(destination_m - origin_m));
        let shifted = Leg::new(origin_m, destination_m, limits, 0.0, 0.0)?;
        self.legs.replace_current(shifted, None);

        self.origin_m[0] = xy[0];
        self.origin_m[1] = xy[1];
        self.destination_m = destination_m;
        self.track_time_s = 0.0;
        self.track_scaler = 1.0;
        self.track_error_m = 0.0;
        self.flags.reached_destination = false;
        self.flags.fast_waypoint = false;

        self.target.pos_m[0] = xy[0];
        self.target.pos_m[1] = xy[1];
        self.target.vel_ms[0] = 0.0;
        self.target.vel_ms[1] = 0.0;

        info!("Origin and destination shifted horizontally to {:?}", xy);

        Ok(())
    }

    /// Speed at which to pass through `destination_m` on the way to
    /// `next_m`.
    fn pass_through_speed(
        &self,
        origin_m: &Vector3<f64>,
        destination_m: &Vector3<f64>,
        next_m: &Vector3<f64>,
        start_speed_ms: f64,
        limits: &ScurveLimits
    ) -> f64 {
        let this_delta = destination_m - origin_m;
        let next_delta = next_m - destination_m;
        let (this_len, next_len) = (this_delta.norm(), next_delta.norm());
        if this_len < MIN_LEG_LENGTH_M || next_len < MIN_LEG_LENGTH_M {
            return 0.0
        }

        let next_limits = self.limits_along(&next_delta);
        let turn_cos = (this_delta / this_len).dot(&(next_delta / next_len));
        let speed = limits.vel_max.min(next_limits.vel_max) * turn_cos.max(0.0);

        // Must be reachable on this leg and leave room to stop on the next
        let reachable = ScurveProfile::max_end_velocity(*limits, start_speed_ms, this_len)
            .unwrap_or(0.0);
        let stoppable = ScurveProfile::max_end_velocity(next_limits, 0.0, next_len)
            .unwrap_or(0.0);

        speed.min(reachable).min(stoppable)
    }

    /// Plan a leg, falling back to starting from rest if the start speed
    /// makes it impossible.
    fn plan_leg(
        &self,
        origin_m: Vector3<f64>,
        destination_m: Vector3<f64>,
        limits: ScurveLimits,
        start_speed_ms: f64,
        end_speed_ms: f64
    ) -> Result<Leg, WpNavError> {
        match Leg::new(origin_m, destination_m, limits, start_speed_ms, end_speed_ms) {
            Ok(leg) => Ok(leg),
            Err(ScurveError::Infeasible { distance, required }) if is_positive(start_speed_ms) => {
                warn!(
                    "Cannot plan leg from {:.2} m/s within {:.2} m ({:.2} m needed), \
                     planning from rest",
                    start_speed_ms,
                    distance,
                    required
                );

                let end_speed_ms = ScurveProfile::max_end_velocity(
                    limits,
                    0.0,
                    (destination_m - origin_m).norm()
                ).unwrap_or(0.0).min(end_speed_ms);

                Ok(Leg::new(origin_m, destination_m, limits, 0.0, end_speed_ms)?)
            },
            Err(e) => Err(e.into())
        }
    }

    fn update_yaw(&mut self, vel_ms: &Vector3<f64>, accel_mss: &Vector3<f64>, leg_length_xy_m: f64) {
        let speed_xy_sq = vel_ms[0].powi(2) + vel_ms[1].powi(2);

        if leg_length_xy_m >= self.params.yaw_dist_min_m
            && speed_xy_sq > YAW_SPEED_MIN_MS.powi(2)
        {
            self.yaw_rad = wrap_2pi(vel_ms[1].atan2(vel_ms[0]));
            self.yaw_rate_rads = (vel_ms[0] * accel_mss[1] - vel_ms[1] * accel_mss[0]) / speed_xy_sq;
            self.flags.yaw_set = true;
        }
        else {
            self.yaw_rate_rads = 0.0;
        }
    }
}

//! Session logger
//!
//! Records are written to the console and to the session's log file. The
//! console is filtered at the level given to `logger_init`, the file always
//! keeps debug records, and some navigation modules get their own levels on
//! each output.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use fern::{Dispatch, FormatCallback};
use log::{info, Level, Record};
use std::fmt::Arguments;
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Prefix of every record target from the navigation library, dropped from
/// the printed targets.
const NAV_LIB_PREFIX: &str = "nav_lib::";

/// The log file never filters out anything more verbose than this.
const FILE_MIN_LEVEL: LevelFilter = LevelFilter::Debug;

/// Levels for individual modules as (target, console level, file level).
///
/// Console levels are capped at the level passed to `logger_init`.
const MODULE_LEVELS: [(&str, LevelFilter, LevelFilter); 2] = [
    // One trace record per synthesised profile
    ("nav_lib::scurve", LevelFilter::Info, LevelFilter::Trace),
    // One trace record per tracking cycle
    ("nav_lib::wp_nav", LevelFilter::Debug, LevelFilter::Debug)
];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a console log level of at least `INFO`, found `{0}`")]
    InvalidConsoleLevel(LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this session.
///
/// `console_level` must be `Info` or more verbose. Must only be called once.
pub fn logger_init(
    console_level: LevelFilter,
    session: &Session
) -> Result<(), LoggerInitError> {

    if console_level < Level::Info {
        return Err(LoggerInitError::InvalidConsoleLevel(console_level))
    }

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;

    let file_level = console_level.max(FILE_MIN_LEVEL);

    let mut console = Dispatch::new()
        .format(format_console)
        .level(console_level)
        .chain(std::io::stdout());

    let mut file = Dispatch::new()
        .format(format_file)
        .level(file_level)
        .chain(log_file);

    for &(target, console_module, file_module) in MODULE_LEVELS.iter() {
        console = console.level_for(target, console_module.min(console_level));
        file = file.level_for(target, file_module);
    }

    Dispatch::new()
        .chain(console)
        .chain(file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Console level: {:?}, file level: {:?}", console_level, file_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Console records only carry their target at debug and trace.
fn format_console(out: FormatCallback, message: &Arguments, record: &Record) {
    if record.level() > Level::Info {
        out.finish(format_args!(
            "[{:10.6} {}] {}: {}",
            session::get_elapsed_seconds(),
            coloured_level(record.level()),
            short_target(record.target()),
            message
        ))
    }
    else {
        out.finish(format_args!(
            "[{:10.6} {}] {}",
            session::get_elapsed_seconds(),
            coloured_level(record.level()),
            message
        ))
    }
}

fn format_file(out: FormatCallback, message: &Arguments, record: &Record) {
    out.finish(format_args!(
        "[{:10.6} {}] {}: {}",
        session::get_elapsed_seconds(),
        level_tag(record.level()),
        short_target(record.target()),
        message
    ))
}

fn short_target(target: &str) -> &str {
    target.strip_prefix(NAV_LIB_PREFIX).unwrap_or(target)
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRC",
        Level::Debug => "DBG",
        Level::Info  => "INF",
        Level::Warn  => "WRN",
        Level::Error => "ERR"
    }
}

fn coloured_level(level: Level) -> ColoredString {
    let tag = level_tag(level);

    match level {
        Level::Trace => tag.dimmed().italic(),
        Level::Debug => tag.dimmed(),
        Level::Info  => tag.normal(),
        Level::Warn  => tag.yellow(),
        Level::Error => tag.red().bold()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_short_target() {
        assert_eq!(short_target("nav_lib::wp_nav::state"), "wp_nav::state");
        assert_eq!(short_target("nav_exec"), "nav_exec");
        assert_eq!(short_target("util::params"), "util::params");
    }

    #[test]
    fn test_module_levels() {
        for &(target, console, file) in MODULE_LEVELS.iter() {
            assert!(target.starts_with(NAV_LIB_PREFIX));

            // Files always keep at least what the console shows
            assert!(file >= console);
            assert!(file >= FILE_MIN_LEVEL);
        }
    }
}

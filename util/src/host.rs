//! Host platform utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::env;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Environment variable pointing at the root of the software checkout.
///
/// The `params` and `sessions` directories are resolved relative to this root.
pub const SW_ROOT_ENV_VAR: &str = "NAV_SW_ROOT";

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the root directory of the software from the `NAV_SW_ROOT` environment
/// variable.
pub fn get_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}

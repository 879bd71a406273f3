//! Cyclic module interface
//!
//! Modules run by the navigation executable are initialised once from a
//! parameter file at the start of a session, then processed once per control
//! cycle with the latest estimated state.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// A module processed once per control cycle.
pub trait State {
    /// Data required during initialisation, usually the path of the module's
    /// parameter file relative to the params directory.
    type InitData;

    /// Data supplied every cycle.
    type InputData;

    /// The module's demands for this cycle.
    type OutputData;

    /// Flags and monitoring values for this cycle.
    type StatusReport;

    /// Error raised by initialisation or processing.
    type Error: std::error::Error;

    /// Load parameters and open any archives in the session directory.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::Error>;

    /// Process a single cycle.
    ///
    /// Missing or invalid external data should be reported through the
    /// status report where the module can carry on with its previous
    /// output, an error means the outputs cannot be used at all.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::Error>;
}

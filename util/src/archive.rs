//! Struct archiving functionality
//!
//! To add archiving functionality to a struct implement the `Archived` trait.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::path::Path;
use std::fs::{File, OpenOptions};
use csv::WriterBuilder;
pub use csv::Writer;
use serde::Serialize;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
///
/// A default archiver has no writer and silently discards records, which lets
/// modules be used without a session (in tests for example).
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A trait which enables a struct to be archived as a timestamped csv.
///
/// To implement this trait, the struct shall have an `Archiver` member which
/// shall be ignored by Serde using `#[serde(skip_serializing)]. The archiver
/// member shall be setup in the struct's `init` or `new` functions.
pub trait Archived {
    /// Write the archives for this struct
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session, path: P
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut session_path = session.arch_root.clone();
        session_path.push(path);

        // Create the parent directory and the file if they do not exist
        if let Some(parent) = session_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        File::create(session_path.clone())?;

        // Open the file in append mode
        let file = OpenOptions::new()
            .append(true)
            .open(session_path)?;

        let w = WriterBuilder::new()
            .has_headers(true)
            .from_writer(file);

        Ok(Self {
            writer: Some(w)
        })
    }

    /// Serialise a record into the archive.
    ///
    /// CSV rows are flat, so `record` must only contain scalar fields.
    pub fn serialise<T: Serialize>(
        &mut self, record: T
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref mut w) = self.writer {
            w.serialize(record)?;
            w.flush()?
        }

        Ok(())
    }
}

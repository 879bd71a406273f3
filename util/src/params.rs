//! Generic parameters functions
//!
//! Parameters are stored as TOML files. Relative paths are resolved against
//! the `params` directory under the software root (`NAV_SW_ROOT`).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{de::DeserializeOwned, Serialize};
use std::fs::{read_to_string, write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A parameter store backed by a single TOML file.
#[derive(Debug, Clone)]
pub struct FileParamStore {
    path: PathBuf
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable (NAV_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot load the parmeter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error)
}

/// An error that occurs while saving a parameter file.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Cannot serialise the parameters: {0}")]
    SerialiseError(toml::ser::Error),

    #[error("Cannot write the parameter file: {0}")]
    FileWriteError(std::io::Error)
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A persistent store for a set of parameters.
///
/// Modules never reach out to storage themselves, instead a store is handed
/// to them when parameters need to be loaded or saved.
pub trait ParamStore<P> {
    /// Load the parameters from the store.
    fn load(&self) -> Result<P, LoadError>;

    /// Save the parameters into the store, replacing what was there.
    fn save(&self, params: &P) -> Result<(), SaveError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FileParamStore {
    /// Create a store for the given file path.
    pub fn new<T: AsRef<Path>>(path: T) -> Self {
        Self {
            path: path.as_ref().to_path_buf()
        }
    }

    /// Create a store for a file relative to the software's `params` directory.
    pub fn from_params_dir(param_file_path: &str) -> Result<Self, LoadError> {
        Ok(Self::new(params_dir()?.join(param_file_path)))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<P> ParamStore<P> for FileParamStore
where
    P: Serialize + DeserializeOwned
{
    fn load(&self) -> Result<P, LoadError> {
        load_path(&self.path)
    }

    fn save(&self, params: &P) -> Result<(), SaveError> {
        save_path(&self.path, params)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the "params" directory in the software root
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned
{
    load_path(params_dir()?.join(param_file_path))
}

/// Load a parameter file from an explicit path.
pub fn load_path<P, T>(path: T) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    T: AsRef<Path>
{
    // Load the file into a string
    let params_str = match read_to_string(path) {
        Ok(s) => s,
        Err(e) => return Err(LoadError::FileLoadError(e))
    };

    // Parse the string into the parameter struct
    toml::from_str(params_str.as_str()).map_err(LoadError::DeserialiseError)
}

/// Save a parameter struct to an explicit path as TOML.
pub fn save_path<P, T>(path: T, params: &P) -> Result<(), SaveError>
where
    P: Serialize,
    T: AsRef<Path>
{
    let params_str = toml::to_string(params).map_err(SaveError::SerialiseError)?;

    write(path, params_str).map_err(SaveError::FileWriteError)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn params_dir() -> Result<PathBuf, LoadError> {
    let mut path = crate::host::get_sw_root()
        .map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");

    Ok(path)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct TestParams {
        gain: f64,
        name: String
    }

    #[test]
    fn test_file_store_round_trip() {
        let mut path = std::env::temp_dir();
        path.push(format!("util_params_test_{}.toml", std::process::id()));

        let store = FileParamStore::new(&path);
        let params = TestParams { gain: 1.5, name: String::from("wp") };

        store.save(&params).unwrap();
        let loaded: TestParams = store.load().unwrap();
        assert_eq!(loaded, params);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let store = FileParamStore::new("/this/file/does/not/exist.toml");
        let res: Result<TestParams, LoadError> = store.load();
        assert!(matches!(res, Err(LoadError::FileLoadError(_))));
    }
}

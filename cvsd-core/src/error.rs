//! Error types for cvsd-core.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// A value supplied from outside the core failed validation.
///
/// Produced before any file is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundaryError {
    /// Zero-length value.
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    /// Longer than the field allows, counted in bytes.
    #[error("{field} is {len} bytes long; the limit is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Any byte outside 7-bit ASCII.
    #[error("{field} contains non-ASCII characters")]
    NonAscii { field: &'static str },

    /// A character that would corrupt the `passwd` line (`:` or a control
    /// character).
    #[error("{field} contains forbidden character {ch:?}")]
    Forbidden { field: &'static str, ch: char },
}

/// Failures while writing or reading the access-control files.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Reading or replacing one of the credential files failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The hasher rejected the password or salt.
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Failures while opening or initializing a repository.
#[derive(Debug, Error)]
pub enum InitError {
    /// The path exists but is not a directory, or `CVSROOT` is not one.
    #[error("{path} is not usable as a repository (not a directory, or CVSROOT is not a directory)")]
    Invalid { path: PathBuf },

    /// `cvs init` could not be started or waited for.
    #[error("failed to launch {executable}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `cvs init` ran and exited non-zero; `stderr` is its trimmed output.
    #[error("repository init for {path} exited with {status}: {stderr}")]
    Failed {
        path: PathBuf,
        status: ExitStatus,
        stderr: String,
    },

    /// Init succeeded but the default identity could not be written.
    /// `CVSROOT` stays in place.
    #[error("failed to seed default credentials: {0}")]
    Seed(#[from] CredentialError),
}

/// Failures while loading or saving `~/.cvsd/config.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading, writing or renaming the config file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`; `~/.cvsd/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A required path is in neither the flags nor the file.
    #[error("{0} is not set (pass it on the command line or in the config file)")]
    Missing(&'static str),

    /// A configured path failed validation.
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
}

pub(crate) fn credential_io(path: impl Into<PathBuf>, source: std::io::Error) -> CredentialError {
    CredentialError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn config_io(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

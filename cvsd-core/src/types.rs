//! Domain types shared by the daemon and the CLI.
//!
//! Values that arrive from outside (usernames, passwords, paths) are
//! validated by their constructors, so anything holding a [`Username`] or a
//! [`ServiceConfig`] has already passed the boundary checks.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BoundaryError;

/// Longest accepted path, in bytes.
pub const MAX_PATH_LEN: usize = 255;

/// Longest accepted username or password, in bytes.
pub const MAX_CREDENTIAL_LEN: usize = 31;

/// Identity seeded into a freshly initialized repository.
pub const DEFAULT_USERNAME: &str = "User";
pub const DEFAULT_PASSWORD: &str = "Ab-123456";

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A validated pserver login name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// Validate `value`: 1..=31 ASCII bytes, no `:` and no control characters
    /// (either would corrupt the `user:hash:owner` passwd line).
    pub fn parse(value: &str) -> Result<Self, BoundaryError> {
        check_ascii("username", value, MAX_CREDENTIAL_LEN)?;
        if let Some(ch) = value.chars().find(|c| *c == ':' || c.is_ascii_control()) {
            return Err(BoundaryError::Forbidden {
                field: "username",
                ch,
            });
        }
        Ok(Self(value.to_owned()))
    }

    pub fn default_identity() -> Self {
        Self(DEFAULT_USERNAME.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Username {
    type Err = BoundaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A validated plaintext password. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn parse(value: &str) -> Result<Self, BoundaryError> {
        check_ascii("password", value, MAX_CREDENTIAL_LEN)?;
        Ok(Self(value.to_owned()))
    }

    pub fn default_identity() -> Self {
        Self(DEFAULT_PASSWORD.to_owned())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl FromStr for Password {
    type Err = BoundaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn check_ascii(field: &'static str, value: &str, max: usize) -> Result<(), BoundaryError> {
    if value.is_empty() {
        return Err(BoundaryError::Empty { field });
    }
    if !value.is_ascii() {
        return Err(BoundaryError::NonAscii { field });
    }
    if value.len() > max {
        return Err(BoundaryError::TooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Service configuration
// ---------------------------------------------------------------------------

/// The three paths a service is built from. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    repository: PathBuf,
    scratch: PathBuf,
    executable: PathBuf,
}

impl ServiceConfig {
    pub fn new(
        repository: impl Into<PathBuf>,
        scratch: impl Into<PathBuf>,
        executable: impl Into<PathBuf>,
    ) -> Result<Self, BoundaryError> {
        let repository = check_path("repository path", repository.into())?;
        let scratch = check_path("scratch path", scratch.into())?;
        let executable = check_path("executable path", executable.into())?;
        Ok(Self {
            repository,
            scratch,
            executable,
        })
    }

    /// Repository root (`--allow-root` and `-d` argument).
    pub fn repository(&self) -> &Path {
        &self.repository
    }

    /// Scratch directory handed to workers with `-T`.
    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// The `cvs` executable.
    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

fn check_path(field: &'static str, path: PathBuf) -> Result<PathBuf, BoundaryError> {
    let len = path.as_os_str().len();
    if len == 0 {
        return Err(BoundaryError::Empty { field });
    }
    if len > MAX_PATH_LEN {
        return Err(BoundaryError::TooLong {
            field,
            len,
            max: MAX_PATH_LEN,
        });
    }
    Ok(path)
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Result of looking at a repository location on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryState {
    Uninitialized,
    Initialized,
    Invalid,
}

impl fmt::Display for RepositoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryState::Uninitialized => write!(f, "uninitialized"),
            RepositoryState::Initialized => write!(f, "initialized"),
            RepositoryState::Invalid => write!(f, "invalid"),
        }
    }
}

/// A repository location plus whether it has been initialized.
///
/// There is no way to clear `initialized` once it is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    root: PathBuf,
    initialized: bool,
}

impl Repository {
    pub fn new(root: impl Into<PathBuf>, initialized: bool) -> Self {
        Self {
            root: root.into(),
            initialized,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

// ---------------------------------------------------------------------------
// Worker reaping
// ---------------------------------------------------------------------------

/// How exited worker processes are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ChildReaping {
    /// `SIGCHLD` is ignored while the accept loop runs, so the kernel reaps
    /// workers itself. This changes the disposition for the whole process:
    /// while a daemon in this mode is running, nothing else in the process
    /// can wait on a child. `Command::output()` and `Child::wait()` fail with
    /// `ECHILD`, including [`repository::initialize`](crate::repository::initialize)
    /// for a second, fresh repository.
    #[default]
    IgnoreSignal,
    /// Every worker gets a detached thread that waits on it.
    Reaper,
}

impl fmt::Display for ChildReaping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildReaping::IgnoreSignal => write!(f, "ignore-signal"),
            ChildReaping::Reaper => write!(f, "reaper"),
        }
    }
}

impl FromStr for ChildReaping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore-signal" | "signal" => Ok(Self::IgnoreSignal),
            "reaper" => Ok(Self::Reaper),
            other => Err(format!(
                "unknown reaping mode '{other}'; expected: ignore-signal, reaper"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

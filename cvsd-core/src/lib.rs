//! cvsd core library — domain types, boundary validation, access-control
//! files, repository initialization, config file.
//!
//! - [`types`] — validated credentials, [`ServiceConfig`], [`Repository`]
//! - [`credentials`] — [`CredentialStore`] for `CVSROOT/{passwd,readers,writers}`
//! - [`repository`] — inspect / initialize / open
//! - [`config`] — `~/.cvsd/config.yaml`
//! - [`error`] — error enums for all of the above

pub mod config;
pub mod credentials;
pub mod error;
pub mod paths;
pub mod repository;
pub mod types;

pub use credentials::{CredentialStore, PasswdEntry, PasswordHasher, UnixCrypt};
pub use error::{BoundaryError, ConfigError, CredentialError, InitError};
pub use types::{
    ChildReaping, Password, Repository, RepositoryState, ServiceConfig, Username,
    DEFAULT_PASSWORD, DEFAULT_USERNAME,
};

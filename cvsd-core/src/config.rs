//! Optional YAML configuration at `~/.cvsd/config.yaml`.
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! A missing file is not an error: every field has a default or is left for
//! the command line to fill in.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{config_io, ConfigError};
use crate::paths::{config_dir, config_path};
use crate::types::{ChildReaping, ServiceConfig};

/// Well-known pserver port.
pub const DEFAULT_PORT: u16 = 2401;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Root of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    pub listen: ListenConfig,
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub address: IpAddr,
    pub port: u16,
    /// Upper bound on how long the accept loop waits before re-checking for
    /// a stop request.
    pub poll_interval_ms: u64,
    pub reaping: ChildReaping,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            reaping: ChildReaping::default(),
        }
    }
}

impl FileConfig {
    /// Build a [`ServiceConfig`], taking each path from `overrides` first and
    /// falling back to the file.
    pub fn service_config(&self, overrides: &PathOverrides) -> Result<ServiceConfig, ConfigError> {
        let repository = overrides
            .repository
            .clone()
            .or_else(|| self.repository.clone())
            .ok_or(ConfigError::Missing("repository path"))?;
        let scratch = overrides
            .scratch
            .clone()
            .or_else(|| self.scratch.clone())
            .unwrap_or_else(std::env::temp_dir);
        let executable = overrides
            .executable
            .clone()
            .or_else(|| self.executable.clone())
            .ok_or(ConfigError::Missing("cvs executable path"))?;
        Ok(ServiceConfig::new(repository, scratch, executable)?)
    }
}

/// Paths given on the command line.
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub repository: Option<PathBuf>,
    pub scratch: Option<PathBuf>,
    pub executable: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load `<home>/.cvsd/config.yaml`; defaults if absent.
pub fn load_at(home: &Path) -> Result<FileConfig, ConfigError> {
    let path = config_path(home);
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| config_io(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<FileConfig, ConfigError> {
    load_at(&home()?)
}

/// Atomically write `config` to `<home>/.cvsd/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &FileConfig) -> Result<PathBuf, ConfigError> {
    let dir = config_dir(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| config_io(&dir, e))?;
    }
    let path = config_path(home);
    let tmp_path = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| config_io(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| config_io(&path, e))?;
    Ok(path)
}

/// `save_at` convenience wrapper.
pub fn save(config: &FileConfig) -> Result<PathBuf, ConfigError> {
    save_at(&home()?, config)
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| config_io(path, e))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().expect("tempdir");
        let config = load_at(home.path()).expect("load");
        assert_eq!(config, FileConfig::default());
        assert_eq!(config.listen.port, DEFAULT_PORT);
        assert_eq!(config.listen.reaping, ChildReaping::IgnoreSignal);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let home = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(config_dir(home.path())).expect("mkdir");
        std::fs::write(
            config_path(home.path()),
            "repository: /srv/cvs\nlisten:\n  port: 12401\n  reaping: reaper\n",
        )
        .expect("write");

        let config = load_at(home.path()).expect("load");
        assert_eq!(config.repository, Some(PathBuf::from("/srv/cvs")));
        assert_eq!(config.executable, None);
        assert_eq!(config.listen.port, 12401);
        assert_eq!(config.listen.reaping, ChildReaping::Reaper);
        assert_eq!(config.listen.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn save_then_load_and_no_tmp_left() {
        let home = TempDir::new().expect("tempdir");
        let config = FileConfig {
            repository: Some(PathBuf::from("/srv/cvs")),
            scratch: Some(PathBuf::from("/var/tmp")),
            executable: Some(PathBuf::from("/usr/bin/cvs")),
            listen: ListenConfig::default(),
        };
        let path = save_at(home.path(), &config).expect("save");
        assert!(!path.with_extension("yaml.tmp").exists());
        assert_eq!(load_at(home.path()).expect("load"), config);

        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn malformed_file_reports_path() {
        let home = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(config_dir(home.path())).expect("mkdir");
        std::fs::write(config_path(home.path()), "listen: [not, a, mapping").expect("write");

        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn overrides_win_over_file_values() {
        let config = FileConfig {
            repository: Some(PathBuf::from("/from/file")),
            executable: Some(PathBuf::from("/usr/bin/cvs")),
            ..FileConfig::default()
        };
        let overrides = PathOverrides {
            repository: Some(PathBuf::from("/from/flag")),
            ..PathOverrides::default()
        };
        let service = config.service_config(&overrides).expect("service config");
        assert_eq!(service.repository(), Path::new("/from/flag"));
        assert_eq!(service.executable(), Path::new("/usr/bin/cvs"));
        assert_eq!(service.scratch(), std::env::temp_dir().as_path());
    }

    #[test]
    fn missing_executable_is_reported() {
        let config = FileConfig {
            repository: Some(PathBuf::from("/srv/cvs")),
            ..FileConfig::default()
        };
        let err = config
            .service_config(&PathOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("cvs executable path")));
    }
}

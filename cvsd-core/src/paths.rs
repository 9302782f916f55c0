//! Well-known names inside a CVS repository and the per-user config dir.

use std::path::{Path, PathBuf};

/// Subdirectory whose presence marks an initialized repository.
pub const MARKER_DIR: &str = "CVSROOT";

pub const PASSWD_FILE: &str = "passwd";
pub const READERS_FILE: &str = "readers";
pub const WRITERS_FILE: &str = "writers";

pub const CONFIG_DIR: &str = ".cvsd";
pub const CONFIG_FILE: &str = "config.yaml";

pub fn cvsroot_dir(repository: &Path) -> PathBuf {
    repository.join(MARKER_DIR)
}

pub fn passwd_path(repository: &Path) -> PathBuf {
    cvsroot_dir(repository).join(PASSWD_FILE)
}

pub fn readers_path(repository: &Path) -> PathBuf {
    cvsroot_dir(repository).join(READERS_FILE)
}

pub fn writers_path(repository: &Path) -> PathBuf {
    cvsroot_dir(repository).join(WRITERS_FILE)
}

pub fn config_dir(home: &Path) -> PathBuf {
    home.join(CONFIG_DIR)
}

pub fn config_path(home: &Path) -> PathBuf {
    config_dir(home).join(CONFIG_FILE)
}

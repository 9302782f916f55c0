//! Repository detection and first-run initialization.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::credentials::{CredentialStore, PasswordHasher};
use crate::error::InitError;
use crate::paths::cvsroot_dir;
use crate::types::{Password, Repository, RepositoryState, ServiceConfig, Username};

/// Classify `path` without touching it.
///
/// A missing path is `Uninitialized` (it will be created by init). Any stat
/// failure other than not-found makes the location `Invalid`.
pub fn inspect(path: &Path) -> RepositoryState {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return RepositoryState::Invalid,
        Err(err) if err.kind() == ErrorKind::NotFound => return RepositoryState::Uninitialized,
        Err(_) => return RepositoryState::Invalid,
    }

    match fs::metadata(cvsroot_dir(path)) {
        Ok(meta) if meta.is_dir() => RepositoryState::Initialized,
        Ok(_) => RepositoryState::Invalid,
        Err(err) if err.kind() == ErrorKind::NotFound => RepositoryState::Uninitialized,
        Err(_) => RepositoryState::Invalid,
    }
}

/// Run `<executable> -d <path> init` to completion.
///
/// Succeeds only on exit status 0; stderr of a failed run is carried in the
/// error.
///
/// Waits on the child, so `SIGCHLD` must not be ignored in this process
/// (see [`ChildReaping::IgnoreSignal`](crate::ChildReaping::IgnoreSignal));
/// otherwise the wait fails and a successful init is reported as
/// [`InitError::Spawn`].
pub fn initialize(path: &Path, executable: &Path) -> Result<(), InitError> {
    let output = Command::new(executable)
        .arg0("cvs")
        .arg("-d")
        .arg(path)
        .arg("init")
        .stdin(Stdio::null())
        .output()
        .map_err(|source| InitError::Spawn {
            executable: executable.to_path_buf(),
            source,
        })?;

    if output.status.success() {
        return Ok(());
    }

    Err(InitError::Failed {
        path: path.to_path_buf(),
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Open the repository named by `config`, initializing it and seeding the
/// default identity if it has never been initialized.
pub fn open(config: &ServiceConfig) -> Result<Repository, InitError> {
    open_with(config, &CredentialStore::new(config.repository()))
}

/// [`open`] with an explicit credential store.
///
/// If seeding fails after a successful init, `CVSROOT` stays on disk: the
/// next open sees an initialized repository and skips seeding, and the
/// credentials can be set explicitly.
pub fn open_with<H: PasswordHasher>(
    config: &ServiceConfig,
    store: &CredentialStore<H>,
) -> Result<Repository, InitError> {
    let root = config.repository();
    match inspect(root) {
        RepositoryState::Initialized => {
            tracing::debug!(repository = %root.display(), "repository already initialized");
            Ok(Repository::new(root, true))
        }
        RepositoryState::Invalid => Err(InitError::Invalid {
            path: root.to_path_buf(),
        }),
        RepositoryState::Uninitialized => {
            tracing::info!(
                repository = %root.display(),
                executable = %config.executable().display(),
                "initializing repository",
            );
            initialize(root, config.executable())?;

            store
                .write(&Username::default_identity(), &Password::default_identity())
                .map_err(|err| {
                    tracing::warn!(
                        repository = %root.display(),
                        error = %err,
                        "repository initialized but default credentials could not be written",
                    );
                    InitError::Seed(err)
                })?;
            Ok(Repository::new(root, true))
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_path_is_uninitialized() {
        let dir = TempDir::new().expect("tempdir");
        assert_eq!(
            inspect(&dir.path().join("not-yet")),
            RepositoryState::Uninitialized
        );
    }

    #[test]
    fn empty_directory_is_uninitialized() {
        let dir = TempDir::new().expect("tempdir");
        assert_eq!(inspect(dir.path()), RepositoryState::Uninitialized);
    }

    #[test]
    fn regular_file_is_invalid() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("repo");
        fs::write(&file, b"not a directory").expect("write");
        assert_eq!(inspect(&file), RepositoryState::Invalid);
    }

    #[test]
    fn cvsroot_file_is_invalid() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("CVSROOT"), b"").expect("write");
        assert_eq!(inspect(dir.path()), RepositoryState::Invalid);
    }

    #[test]
    fn cvsroot_directory_is_initialized() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir(dir.path().join("CVSROOT")).expect("mkdir");
        assert_eq!(inspect(dir.path()), RepositoryState::Initialized);
    }

    #[test]
    fn initialize_reports_missing_executable() {
        let dir = TempDir::new().expect("tempdir");
        let err = initialize(dir.path(), &dir.path().join("no-such-cvs")).unwrap_err();
        assert!(matches!(err, InitError::Spawn { .. }), "got: {err}");
    }

    #[test]
    fn initialize_reports_nonzero_exit() {
        let dir = TempDir::new().expect("tempdir");
        let err = initialize(dir.path(), Path::new("/bin/false")).unwrap_err();
        match err {
            InitError::Failed { status, .. } => assert!(!status.success()),
            other => panic!("unexpected error: {other}"),
        }
    }
}

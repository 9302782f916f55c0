use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use cvsd_core::{CredentialError, InitError};

/// A worker process could not be started.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The status pipe or the fork itself failed; no worker exists.
    #[error("failed to prepare worker launch: {0}")]
    Setup(#[source] std::io::Error),

    /// The child was forked but could not exec the `cvs` program (missing,
    /// not executable, bad interpreter). It has already exited.
    #[error("failed to launch worker {executable}: {source}")]
    Launch {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `DaemonController::start` failed; the controller is back in `Stopped`.
#[derive(Debug, Error)]
pub enum StartError {
    /// The repository has no `CVSROOT` directory.
    #[error("repository at {path} is not initialized")]
    NotInitialized { path: PathBuf },

    /// The OS refused to create the accept thread.
    #[error("failed to spawn accept thread: {0}")]
    Thread(#[source] std::io::Error),

    /// The accept thread's tokio runtime could not be built.
    #[error("failed to build accept loop runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// Socket creation, bind or listen failed (port in use, no permission).
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The accept thread died before posting the ready signal.
    #[error("accept thread exited before reporting readiness")]
    AcceptThreadExited,
}

/// `DaemonController::stop` failed. The listener is gone either way.
#[derive(Debug, Error)]
pub enum StopError {
    /// The accept thread ended without posting the stopped signal.
    #[error("accept thread panicked")]
    AcceptThreadPanicked,
}

/// Error surface of the service facade.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Opening, initializing or seeding the repository failed.
    #[error("service construction failed: {0}")]
    Construction(#[from] InitError),

    /// Reading or replacing `CVSROOT/{passwd,readers,writers}` failed.
    #[error("credential file access failed: {0}")]
    CredentialWrite(#[from] CredentialError),

    #[error("daemon start failed: {0}")]
    Start(#[from] StartError),

    #[error("daemon stop failed: {0}")]
    Stop(#[from] StopError),

    /// The Ctrl-C / `SIGTERM` listener could not be installed.
    #[error("failed to wait for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

//! The `CvsService` facade: repository, credentials and daemon behind one
//! object that the CLI owns.

use std::net::SocketAddr;

use serde::Serialize;
use serde_json::{json, Value};

use cvsd_core::credentials::{CredentialStore, PasswdEntry};
use cvsd_core::repository;
use cvsd_core::{Password, Repository, ServiceConfig, Username};

use crate::controller::{DaemonController, DaemonSettings, DaemonState, StatusHandle};
use crate::error::ServiceError;
use crate::worker::WorkerLauncher;

pub struct CvsService {
    config: ServiceConfig,
    credentials: CredentialStore,
    daemon: DaemonController,
}

impl CvsService {
    /// Open (initializing and seeding if needed) the repository in `config`.
    ///
    /// The returned service is not running.
    pub fn create(config: ServiceConfig, settings: DaemonSettings) -> Result<Self, ServiceError> {
        let credentials = CredentialStore::new(config.repository());
        let repository = repository::open_with(&config, &credentials)?;
        let daemon = DaemonController::new(repository, WorkerLauncher::new(&config), settings);
        Ok(Self {
            config,
            credentials,
            daemon,
        })
    }

    /// Replace the single authorized user. Allowed while running; running
    /// workers read the files per connection.
    pub fn set_credentials(
        &self,
        username: &Username,
        password: &Password,
    ) -> Result<(), ServiceError> {
        self.credentials.write(username, password)?;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), ServiceError> {
        Ok(self.daemon.start()?)
    }

    pub fn stop(&mut self) -> Result<(), ServiceError> {
        Ok(self.daemon.stop()?)
    }

    pub fn is_running(&self) -> bool {
        self.daemon.is_running()
    }

    pub fn state(&self) -> DaemonState {
        self.daemon.state()
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.daemon.status_handle()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.daemon.local_addr()
    }

    pub fn repository(&self) -> &Repository {
        self.daemon.repository()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Snapshot for `cvsd status --json` and logs.
    pub fn status(&self) -> Result<ServiceStatus, ServiceError> {
        let users = self
            .credentials
            .read_passwd()?
            .into_iter()
            .map(|PasswdEntry { username, .. }| username)
            .collect();
        Ok(ServiceStatus {
            repository: self.config.repository().display().to_string(),
            initialized: self.repository().is_initialized(),
            state: self.state(),
            local_addr: self.local_addr(),
            users,
            readers: self.credentials.read_readers()?,
            writers: self.credentials.read_writers()?,
        })
    }

    pub fn status_payload(&self) -> Result<Value, ServiceError> {
        Ok(json!(self.status()?))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub repository: String,
    pub initialized: bool,
    pub state: DaemonState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_addr: Option<SocketAddr>,
    pub users: Vec<String>,
    pub readers: Vec<String>,
    pub writers: Vec<String>,
}

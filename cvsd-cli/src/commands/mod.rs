//! Subcommands and the flags they share.

pub mod init;
pub mod passwd;
pub mod serve;
pub mod status;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use cvsd_core::config::{self, FileConfig, PathOverrides};
use cvsd_core::{ChildReaping, ServiceConfig};
use cvsd_daemon::{CvsService, DaemonSettings};

/// Paths identifying the repository and the `cvs` program.
#[derive(Args, Debug, Clone, Default)]
pub struct RepoArgs {
    /// Repository root (created and initialized on first use).
    #[arg(long = "repo", value_name = "DIR")]
    pub repository: Option<PathBuf>,

    /// Scratch directory handed to workers as `-T` (default: system temp dir).
    #[arg(long, value_name = "DIR")]
    pub scratch: Option<PathBuf>,

    /// Path to the `cvs` executable.
    #[arg(long = "exec", value_name = "PATH")]
    pub executable: Option<PathBuf>,
}

impl RepoArgs {
    fn overrides(&self) -> PathOverrides {
        PathOverrides {
            repository: self.repository.clone(),
            scratch: self.scratch.clone(),
            executable: self.executable.clone(),
        }
    }
}

/// Listener flags; unset ones fall back to the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct ListenArgs {
    /// Address to listen on.
    #[arg(long)]
    pub address: Option<IpAddr>,

    /// TCP port (0 picks a free one).
    #[arg(long)]
    pub port: Option<u16>,

    /// How finished workers are reaped: ignore-signal | reaper.
    #[arg(long, value_name = "MODE")]
    pub reaping: Option<ChildReaping>,
}

impl ListenArgs {
    fn apply(&self, file: &mut FileConfig) {
        if let Some(address) = self.address {
            file.listen.address = address;
        }
        if let Some(port) = self.port {
            file.listen.port = port;
        }
        if let Some(reaping) = self.reaping {
            file.listen.reaping = reaping;
        }
    }
}

/// Config file merged with command-line flags.
pub(crate) struct Resolved {
    pub file: FileConfig,
    pub service: ServiceConfig,
    pub settings: DaemonSettings,
}

pub(crate) fn resolve(repo: &RepoArgs, listen: &ListenArgs) -> Result<Resolved> {
    let mut file = config::load().context("failed to load ~/.cvsd/config.yaml")?;
    listen.apply(&mut file);
    let service = file
        .service_config(&repo.overrides())
        .context("incomplete service configuration; pass --repo and --exec or set them in ~/.cvsd/config.yaml")?;
    let settings = DaemonSettings::from(&file.listen);
    Ok(Resolved {
        file,
        service,
        settings,
    })
}

pub(crate) fn open_service(resolved: Resolved) -> Result<CvsService> {
    let repository = resolved.service.repository().display().to_string();
    CvsService::create(resolved.service, resolved.settings)
        .with_context(|| format!("failed to open repository '{repository}'"))
}

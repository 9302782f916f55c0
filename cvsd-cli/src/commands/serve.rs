//! `cvsd serve` — foreground pserver listener.

use anyhow::{Context, Result};
use clap::Args;

use cvsd_daemon::serve_blocking;

use super::{open_service, resolve, ListenArgs, RepoArgs};

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    #[command(flatten)]
    pub listen: ListenArgs,
}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let resolved = resolve(&self.repo, &self.listen)?;
        let mut service = open_service(resolved)?;
        serve_blocking(&mut service).context("daemon exited with error")?;
        println!("daemon stopped");
        Ok(())
    }
}

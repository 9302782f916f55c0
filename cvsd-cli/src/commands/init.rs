//! `cvsd init [--repo <dir>] [--exec <cvs>] [--save-config]`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use cvsd_core::config::{self, FileConfig};
use cvsd_core::DEFAULT_USERNAME;

use super::{open_service, resolve, ListenArgs, RepoArgs};

/// Create the repository and seed the default user if needed.
#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Write the resolved paths to ~/.cvsd/config.yaml.
    #[arg(long)]
    pub save_config: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let resolved = resolve(&self.repo, &ListenArgs::default())?;
        let to_save = self.save_config.then(|| FileConfig {
            repository: Some(resolved.service.repository().to_path_buf()),
            scratch: Some(resolved.service.scratch().to_path_buf()),
            executable: Some(resolved.service.executable().to_path_buf()),
            listen: resolved.file.listen.clone(),
        });

        let service = open_service(resolved)?;
        let users = service
            .credentials()
            .read_passwd()
            .context("failed to read CVSROOT/passwd")?;

        println!(
            "{} Repository ready at '{}'",
            "✓".green(),
            service.repository().root().display()
        );
        match users.first() {
            Some(entry) if entry.username == DEFAULT_USERNAME => println!(
                "  Default user '{DEFAULT_USERNAME}' is active; change it with `cvsd passwd`"
            ),
            Some(entry) => println!("  Authorized user: {}", entry.username),
            None => println!("  {}", "No authorized user".yellow()),
        }

        if let Some(file) = to_save {
            let path = config::save(&file).context("failed to save config")?;
            println!("  Saved to: {}", path.display());
        }
        Ok(())
    }
}

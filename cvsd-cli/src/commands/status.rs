//! `cvsd status` — repository state and the authorized user, read straight
//! from disk. Never initializes anything.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;

use cvsd_core::config;
use cvsd_core::repository::inspect;
use cvsd_core::{CredentialStore, RepositoryState};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Repository root (default: from ~/.cvsd/config.yaml).
    #[arg(long = "repo", value_name = "DIR")]
    pub repository: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let repository = match self.repository {
            Some(path) => path,
            None => config::load()
                .context("failed to load ~/.cvsd/config.yaml")?
                .repository
                .context("no repository configured; pass --repo")?,
        };

        let state = inspect(&repository);
        let store = CredentialStore::new(&repository);
        let (users, readers, writers) = if state == RepositoryState::Initialized {
            let users = store
                .read_passwd()
                .context("failed to read CVSROOT/passwd")?
                .into_iter()
                .map(|entry| entry.username)
                .collect::<Vec<_>>();
            let readers = store.read_readers().context("failed to read CVSROOT/readers")?;
            let writers = store.read_writers().context("failed to read CVSROOT/writers")?;
            (users, readers, writers)
        } else {
            (vec![], vec![], vec![])
        };

        if self.json {
            let payload = json!({
                "repository": repository.display().to_string(),
                "state": state,
                "users": users,
                "readers": readers,
                "writers": writers,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status")?
            );
            return Ok(());
        }

        let label = match state {
            RepositoryState::Initialized => state.to_string().green(),
            RepositoryState::Uninitialized => state.to_string().yellow(),
            RepositoryState::Invalid => state.to_string().red(),
        };
        println!("Repository: {}", repository.display());
        println!("State:      {label}");
        if state == RepositoryState::Initialized {
            println!("User:       {}", display_list(&users));
            println!("Readers:    {}", display_list(&readers));
            println!("Writers:    {}", display_list(&writers));
        }
        Ok(())
    }
}

fn display_list(names: &[String]) -> String {
    if names.is_empty() {
        "-".dimmed().to_string()
    } else {
        names.join(", ")
    }
}

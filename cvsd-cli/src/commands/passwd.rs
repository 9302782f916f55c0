//! `cvsd passwd --user <name> [--password <secret>]`
//!
//! The password is taken from `--password`, then `CVSD_PASSWORD`, then the
//! first line of stdin.

use std::io::BufRead;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use cvsd_core::{Password, Username};

use super::{open_service, resolve, ListenArgs, RepoArgs};

/// Replace the single authorized pserver user.
#[derive(Args, Debug)]
pub struct PasswdArgs {
    /// Login name (ASCII, at most 31 bytes, no ':').
    #[arg(long, short = 'u')]
    pub user: String,

    /// Password (ASCII, at most 31 bytes). Visible to other local users
    /// when passed on the command line; prefer CVSD_PASSWORD or stdin.
    #[arg(long, short = 'p', env = "CVSD_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(flatten)]
    pub repo: RepoArgs,
}

impl PasswdArgs {
    pub fn run(self) -> Result<()> {
        // Validate before the repository is opened so nothing is touched.
        let username = Username::parse(&self.user).context("invalid username")?;
        let secret = match self.password {
            Some(secret) => secret,
            None => read_password_line(std::io::stdin().lock())?,
        };
        let password = Password::parse(&secret).context("invalid password")?;

        let service = open_service(resolve(&self.repo, &ListenArgs::default())?)?;
        service
            .set_credentials(&username, &password)
            .context("failed to write credential files")?;

        println!(
            "{} '{}' is now the only authorized user of '{}'",
            "✓".green(),
            username,
            service.repository().root().display()
        );
        Ok(())
    }
}

fn read_password_line(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    if input
        .read_line(&mut line)
        .context("failed to read password from stdin")?
        == 0
    {
        bail!("no password given; pass --password, set CVSD_PASSWORD or pipe it on stdin");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdin_password_drops_line_ending() {
        let secret = read_password_line("s3cret\r\nignored\n".as_bytes()).expect("read");
        assert_eq!(secret, "s3cret");
    }

    #[test]
    fn empty_stdin_is_an_error() {
        let err = read_password_line("".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("no password given"));
    }
}

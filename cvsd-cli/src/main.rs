//! cvsd — supervised CVS pserver daemon.
//!
//! # Usage
//!
//! ```text
//! cvsd serve  [--repo <dir>] [--scratch <dir>] [--exec <cvs>] [--address <ip>] [--port <n>] [--reaping ignore-signal|reaper]
//! cvsd init   [--repo <dir>] [--exec <cvs>] [--save-config]
//! cvsd passwd --user <name> --password <secret> [--repo <dir>] [--exec <cvs>]
//! cvsd status [--repo <dir>] [--json]
//! ```
//!
//! Flags override `~/.cvsd/config.yaml`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, passwd::PasswdArgs, serve::ServeArgs, status::StatusArgs};
use cvsd_daemon::{init_tracing, LogFormat};

#[derive(Parser, Debug)]
#[command(
    name = "cvsd",
    version,
    about = "Serve a CVS repository over pserver with one worker process per connection",
    long_about = None,
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pserver listener in the foreground until Ctrl-C or SIGTERM.
    Serve(ServeArgs),

    /// Create the repository and seed the default user if needed.
    Init(InitArgs),

    /// Replace the single authorized pserver user.
    Passwd(PasswdArgs),

    /// Show repository state and the authorized user.
    Status(StatusArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Init(args) => args.run(),
        Commands::Passwd(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}

pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ffsend")]
#[command(about = "Send messages between two peers pinned to each other's TLS identity")]
#[command(version)]
pub struct Args {
    /// Path to the ffsend config directory (defaults to ~/.ffsend)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}

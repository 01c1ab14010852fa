pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "keynode")]
#[command(about = "A node on the keynode claims network", version)]
pub struct Args {
    /// Path to the keynode config directory (defaults to ~/.keynode)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "lkv",
    about = "Ledger KV gateway: key-value records and private messages on a permissioned ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Gateway config file (TOML); FABRIC_* variables override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the REST server
    Serve(ServeArgs),
    /// Enroll an identity and store it in the wallet
    Enroll(EnrollArgs),
    /// Read a public value
    Get(GetArgs),
    /// Write a public value
    Put(PutArgs),
    /// Private collection messages
    Private(PrivateArgs),
    /// Inspect the connection profile
    Profile(ProfileArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Overrides PORT
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Args)]
pub struct EnrollArgs {
    /// Identity name; defaults to the configured admin user
    pub name: Option<String>,
    /// Enrollment secret for a non-admin identity
    #[arg(long, requires = "name")]
    pub secret: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub key: String,
    pub value: String,
}

#[derive(Args)]
pub struct PrivateArgs {
    #[command(subcommand)]
    pub action: PrivateAction,
}

#[derive(Subcommand)]
pub enum PrivateAction {
    /// Store a message in a collection
    Put { collection: String, message: String },
    /// Read the message stored in a collection
    Get { collection: String },
    /// Check a message against the stored one
    Verify { collection: String, message: String },
}

#[derive(Args)]
pub struct ProfileArgs {
    #[command(subcommand)]
    pub action: ProfileAction,
}

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Validate the profile against the configured CA and channel
    Check {
        /// Profile path; defaults to FABRIC_CONNECTION_PROFILE_PATH
        path: Option<PathBuf>,
    },
}

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "crud",
    about = "CRUD object store with a POSIX-like file layer",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log every bus request
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Append log messages to this file instead of stderr
    #[arg(short = 'l', long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the object store server
    Serve(ServeArgs),
    /// Replay a workload file against the file system
    Sim(SimArgs),
    /// Copy a file out of the file system into the current directory
    Extract(ExtractArgs),
}

/// Where to find the object store server.
#[derive(Args, Clone, Debug, Default)]
pub struct EndpointArgs {
    /// Server IP address
    #[arg(short = 'a', long = "address")]
    pub address: Option<IpAddr>,
    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Client configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    #[arg(long)]
    pub max_connections: Option<usize>,
    /// Server configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct SimArgs {
    pub workload: PathBuf,
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Run against an in-process store instead of a server
    #[arg(long, conflicts_with_all = ["address", "port"])]
    pub local: bool,
}

#[derive(Args)]
pub struct ExtractArgs {
    /// Path of the file inside the file system
    pub file: String,
    /// Where to write it; defaults to the file's own name
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

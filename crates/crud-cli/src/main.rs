use std::sync::Mutex;

use clap::Parser;
use tracing::Level;

mod cli;
mod commands;
mod workload;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt().with_max_level(level);
    match &cli.log_file {
        Some(path) => {
            let file = commands::open_log_file(path)?;
            subscriber.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => subscriber.with_writer(std::io::stderr).init(),
    }
    commands::run_command(cli)
}

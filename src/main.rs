use std::process::exit;

use clap::Parser;
use simsites::cli::{Cli, GetVerbosity};
use simsites::logging;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::setup_logger(cli.cmd.get_verbosity().tracing_level_filter());
    if let Err(e) = cli.cmd.run().await {
        error!("{e}");
        exit(1);
    }
}

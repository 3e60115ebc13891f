use clap::Parser;
use std::sync::Arc;

use piecework::app::{handle_fatal_error, init_logging, AppConfig};
use piecework::cli::{execute_command, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    init_logging(&AppConfig::new(verbose));

    let result = match piecework::demo::word_count() {
        Ok(kind) => execute_command(Arc::new(kind), cli).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        handle_fatal_error(e, verbose);
    }
}

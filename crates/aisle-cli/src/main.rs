use aisle_cli::{run_server, Cli};
use anyhow::Result;
use clap::Parser;

mod bootstrap_helpers;

use bootstrap_helpers::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    run_server(Cli::parse()).await
}

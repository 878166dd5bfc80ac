use anyhow::Result;
use clap::Parser;

use scentmix::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    scentmix::init_tracing();
    run(Cli::parse()).await
}

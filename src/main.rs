mod cli;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting ci-repeat");
    if let Err(e) = cli.execute().await {
        eprintln!("{} {e:#}", output::failed("ERROR:"));
        std::process::exit(1);
    }

    Ok(())
}

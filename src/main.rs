use anyhow::Result;
use clap::Parser;
use cli::Cli;
use reclaimer::logger;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_logger(cli.log_level())?;

    cli::run(cli).await
}

mod cli;
mod run;

use clap::Parser;
use cli::Cli;
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    run::init_tracing(cli.verbose);
    run::run(cli).await
}

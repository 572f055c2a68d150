use clap::Parser;
use nestplan::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    nestplan::logging::init(&cli.settings.log_level);
    cli::run(cli).await
}

//! DynaFlow CLI entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dynaflow::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_ref();

    let result = match cli.command {
        Commands::Worker(args) => dynaflow::cli::commands::worker::execute(args, config, cli.json).await,
        Commands::Workflow(args) => {
            dynaflow::cli::commands::workflow::execute(args, config, cli.json).await
        }
        Commands::Schedule(args) => {
            dynaflow::cli::commands::schedule::execute(args, config, cli.json).await
        }
        Commands::Tenant(args) => dynaflow::cli::commands::tenant::execute(args, config, cli.json).await,
    };

    if let Err(err) = result {
        dynaflow::cli::handle_error(err, cli.json);
    }
}

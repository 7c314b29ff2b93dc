mod cli;
mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use client::AdminClient;
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();
    let client = AdminClient::new(&cli.server);

    match &cli.command {
        Commands::Status => commands::server::status(&client, &cli.server).await?,
        Commands::List(args) => {
            commands::states::list(&client, args.resource_type.as_deref(), format).await?
        }
        Commands::Get(args) => {
            commands::states::get(&client, &args.resource_type, &args.name, format).await?
        }
        Commands::Register(args) => commands::sources::register(&client, args, format).await?,
        Commands::Unregister(args) => commands::sources::unregister(&client, args).await?,
    }

    Ok(())
}

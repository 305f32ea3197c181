mod cli;
mod commands;
mod observability;
mod output;

use anyhow::{Context as _, Result};
use clap::Parser;

use cli::{Cli, Commands, ConfigCommands, OutputFormat};
use commands::Context;
use output::{print_error, print_json};

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        // .env is optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();
    let ctx = Context::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Keygen(args) => commands::keys::keygen(&ctx, args).await?,
        Commands::Jwks => commands::keys::jwks(&ctx).await?,
        Commands::Register(args) => {
            commands::register::register(&ctx, args.auth_method, format).await?;
        }
        Commands::Sign => commands::keys::sign(&ctx, format).await?,
        Commands::Verify(args) => commands::keys::verify(&ctx, &args.assertion, format).await?,
        Commands::Token(args) => commands::token::token(&ctx, args, format).await?,
        Commands::Fetch(args) => {
            commands::fetch::fetch(
                &ctx,
                &args.resource_type,
                &args.params,
                args.count,
                format,
            )
            .await?;
        }
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => match format {
                OutputFormat::Json => print_json(&serde_json::to_value(&ctx.config)?),
                OutputFormat::Table => {
                    let text = toml::to_string_pretty(&ctx.config)
                        .context("Failed to render configuration")?;
                    println!("{text}");
                }
            },
        },
    }

    Ok(())
}

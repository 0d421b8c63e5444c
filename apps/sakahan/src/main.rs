//! # Sakahan
//!
//! Entry point: load `.env`, set up logging, dispatch the subcommand.

use clap::Parser;
use sakahan::cli::{cmd_init, cmd_serve, cmd_status, cmd_token};
use sakahan::config::{Cli, Commands};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sakahan=info,sakahan_core=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Init { force } => cmd_init(&cli.database, force),
        Commands::Status { json } => cmd_status(&cli.database, json),
        Commands::Token(args) => cmd_token(&args),
        Commands::Serve(args) => cmd_serve(&cli.database, args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

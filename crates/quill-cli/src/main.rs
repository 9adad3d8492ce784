//! Quill CLI - a local-first, end-to-end-encrypted note store.
//!
//! This is the command-line interface for Quill. All note content is
//! encrypted client-side; the data directory and any sync endpoint only
//! ever see ciphertext.

mod cli;
mod commands;
mod helpers;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    output::set_quiet(cli.quiet);
    if let Err(err) = run(cli).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let session = commands::open_session(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Init => commands::init(&session).await,
        Commands::List => commands::list(&session).await,
        Commands::Add { title, content } => {
            commands::add(&session, &title, content.as_deref()).await
        }
        Commands::Show { id } => commands::show(&session, &id).await,
        Commands::Edit { id, title, content } => {
            commands::edit(&session, &id, title.as_deref(), content.as_deref()).await
        }
        Commands::Delete { id } => commands::delete(&session, &id).await,
        Commands::Sync { endpoint } => commands::sync(&session, endpoint.as_deref()).await,
        Commands::Resolve { keep } => commands::resolve(&session, keep).await,
        Commands::Rotate => commands::rotate(&session).await,
        Commands::Export { path } => commands::export(&session, &path).await,
        Commands::Import { path, yes } => commands::import(&session, &path, yes).await,
        Commands::Wipe { yes } => commands::wipe(&session, yes).await,
        Commands::Status => commands::status(&session),
    }
}

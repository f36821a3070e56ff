//! Docdex CLI
//!
//! Local-first documentation indexing and hybrid search.

use clap::Parser;
use docdex_core::{Config, Engine};

mod app;
mod commands;
mod output;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return docdex_core::error::exit_codes::INVALID_INPUT;
        }
    };
    let engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {}", e);
            return e.exit_code();
        }
    };

    let result = match cli.command {
        Commands::Add(args) => commands::source::add(&engine, args, cli.json).await,
        Commands::Source(args) => commands::source::run(&engine, args, cli.json).await,
        Commands::Ingest(args) => commands::ingest::run(&engine, args, cli.json).await,
        Commands::Embed(args) => commands::ingest::embed(&engine, args, cli.json).await,
        Commands::Search(args) => commands::search::run(&engine, args, cli.json).await,
        Commands::Library(args) => commands::search::library(&engine, args, cli.json).await,
        Commands::Get(args) => commands::get::run(&engine, args, cli.json).await,
        Commands::Status => commands::status::run(&engine, cli.json).await,
        Commands::Cleanup => commands::status::cleanup(&engine, cli.json).await,
        Commands::Detect => commands::status::detect(&engine, cli.json).await,
        Commands::Seed(args) => commands::seed::run(&engine, args, cli.json).await,
        Commands::Reset(args) => commands::status::reset(&engine, args, cli.json).await,
    };

    engine.shutdown().await;

    match result {
        Ok(()) => docdex_core::error::exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            e.exit_code()
        }
    }
}

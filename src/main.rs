use clap::Parser;
use desksync::cli::handlers;
use desksync::cli::Cli;
use desksync::cli::Commands;
use desksync::AppConfig;
use desksync::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        desksync::logging::init_logging_with_level("debug")?;
    } else {
        desksync::logging::init_logging()?;
    }

    // Load configuration
    let config = AppConfig::load()?;
    tracing::debug!("Configuration loaded successfully");

    match cli.command {
        Commands::Init => handlers::init::handle_init(&config).await,
        Commands::Sync { record_type, full } => {
            handlers::sync::handle_sync(&config, record_type.map(Into::into), full).await
        }
        Commands::ResolveMissing { record_type } => {
            handlers::resolve::handle_resolve_missing(&config, record_type.map(Into::into)).await
        }
        Commands::Tickets { start, end } => {
            handlers::tickets::handle_tickets(&config, start, end).await
        }
        Commands::Run {
            start,
            end,
            full_refs,
        } => handlers::run::handle_run(&config, start, end, full_refs).await,
        Commands::History { limit } => handlers::history::handle_history(&config, limit).await,
        Commands::Config => handlers::config::handle_config(&config),
    }
}

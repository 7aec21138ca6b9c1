use clap::Parser;
use docrag::cli::handle_config_command;
use docrag::cli::handle_index_command;
use docrag::cli::handle_ingest_command;
use docrag::cli::handle_init_kb_command;
use docrag::cli::handle_query_command;
use docrag::cli::handle_serve_api;
use docrag::cli::print_error;
use docrag::cli::Cli;
use docrag::cli::Commands;
use docrag::AppConfig;
use docrag::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            print_error(&format!("Failed to load configuration: {e}"));
            return Err(e);
        }
    };

    // Initialize logging
    if cli.verbose {
        docrag::logging::init_logging_with_level("debug")?;
    } else {
        docrag::logging::init_logging_with_config(Some(&config))?;
    }
    info!("Configuration loaded successfully");

    let outcome = match cli.command {
        Commands::Query { query, json } => handle_query_command(&config, &query, json).await,
        Commands::Index {
            file,
            extract_metadata,
            describe_images,
        } => handle_index_command(&config, &file, extract_metadata, describe_images).await,
        Commands::Ingest {
            source,
            extract_metadata,
            describe_images,
        } => handle_ingest_command(&config, &source, extract_metadata, describe_images).await,
        Commands::InitKb {
            knowledge_base_id,
            data_source_id,
        } => handle_init_kb_command(&config, knowledge_base_id, data_source_id).await,
        Commands::Serve { host, port, cors } => handle_serve_api(&config, host, port, cors).await,
        Commands::Config => handle_config_command(&config).await,
    };

    if let Err(e) = &outcome {
        print_error(&e.to_string());
    }
    outcome
}

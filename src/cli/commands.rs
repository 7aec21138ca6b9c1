//! CLI command definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(name = "docrag")]
#[command(about = "Answer questions over indexed documents, with ranked image results")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: info level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: config.toml, then config.example.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a question
    Query {
        /// The question text
        query: String,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Index a processed document JSON file
    Index {
        /// Path to the processed document
        file: PathBuf,
        /// Generate metadata with the text generator before indexing
        #[arg(long)]
        extract_metadata: bool,
        /// Describe extracted images (linking nearby Q&A pairs) before indexing
        #[arg(long)]
        describe_images: bool,
    },
    /// Extract, save and index an upload, then add it to the knowledge base
    Ingest {
        /// `s3://bucket/key` or a local file to upload first
        source: String,
        /// Generate metadata with the text generator
        #[arg(long)]
        extract_metadata: bool,
        /// Describe extracted images
        #[arg(long)]
        describe_images: bool,
    },
    /// Store the knowledge base identifiers used for sync and queries
    InitKb {
        /// Knowledge base id (default from config)
        #[arg(long)]
        knowledge_base_id: Option<String>,
        /// Data source id (default from config)
        #[arg(long)]
        data_source_id: Option<String>,
    },
    /// Start the HTTP API server
    Serve {
        /// Host to bind (default from config)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (default from config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Enable CORS
        #[arg(long)]
        cors: bool,
    },
    /// Show current configuration
    Config,
}

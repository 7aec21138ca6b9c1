//! Retrieval-augmented answering over indexed documents
//!
//! - [`IndexScanner`] collects image-bearing index records across kinds
//! - [`RelevanceScorer`] scores records against the query and merges duplicates
//! - [`ResultAssembler`] selects, ranks and formats the final image blocks
//! - [`AnswerService`] runs passage search and answer generation next to the
//!   image pipeline and interleaves everything into one response
//!
//! # Examples
//!
//! ```rust,no_run
//! use docrag::config::AppConfig;
//! use docrag::rag::AnswerService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let service = AnswerService::from_config(&config).await?;
//!
//!     let response = service.answer("What is the warranty period?").await?;
//!     println!("Answer: {}", response.answer);
//!     println!("Images: {}", response.images.len());
//!
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod context;
pub mod pipeline;
pub mod prompts;
pub mod scanner;
pub mod scorer;

pub use assembler::interleave;
pub use assembler::AssemblerOptions;
pub use assembler::ResultAssembler;
pub use context::ContextAssembler;
pub use pipeline::AnswerOptions;
pub use pipeline::AnswerService;
pub use scanner::IndexScanner;
pub use scanner::ScanReport;
pub use scorer::RecordScore;
pub use scorer::RelevanceScorer;
pub use scorer::ScoredCandidate;

//! docrag: document-ingestion glue and retrieval-augmented answering with
//! ranked image results.
//!
//! - [`rag`]: index scanning, relevance scoring, result assembly and the
//!   answer pipeline
//! - [`ingest`]: text extraction polling, metadata, image descriptions and
//!   search-index record building
//! - [`storage`]: index store, blob store and knowledge base seams
//! - [`api`] / [`cli`]: HTTP and command-line surfaces

pub mod api;
pub mod capabilities;
pub mod cli;
pub mod config;
pub mod errors;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod models;
pub mod payload;
pub mod poll;
pub mod rag;
pub mod storage;
pub mod text;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod errors_tests;

pub use config::AppConfig;
pub use errors::*;

//! CLI command handlers module
//!
//! - query: answer a question against the configured backends
//! - index: index a processed document (and persist it for the memory backend)
//! - ingest: run an upload through extraction to the index, and knowledge-base setup
//! - serve: API server
//! - info: configuration display

pub mod index;
pub mod info;
pub mod ingest;
pub mod query;
pub mod serve;

pub use index::*;
pub use info::*;
pub use ingest::*;
pub use query::*;
pub use serve::*;

//! API server module for question answering and document indexing over REST

pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use server::serve_api;

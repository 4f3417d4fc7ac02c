//! axum adapter: identity extraction, handlers and the server.

pub mod extractors;
mod handlers;
pub mod server;

pub use server::{HttpServer, HttpServerConfig};

//! market-hex: application services of the marketplace fulfillment core and
//! its adapters (axum HTTP inbound, notifier outbound).

pub mod config;
pub mod errors;

pub mod application;

pub use market_types::{api, domain, ports};

pub mod inbound; // HTTP adapter (server + handlers)
pub mod outbound;

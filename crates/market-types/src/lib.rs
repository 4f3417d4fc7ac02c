//! market-types: domain model and ports of the marketplace fulfillment core.
//!
//! Everything in here is free of I/O. Adapters live in `market-repo`, the
//! application services and HTTP surface in `market-hex`.

pub mod api;
pub mod domain;
pub mod ports;

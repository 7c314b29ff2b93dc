//! # unisync-client
//!
//! `reqwest`-backed [`ExternalApi`](unisync_core::ExternalApi) for a
//! REST service that wraps every response in a
//! `{success, errors, result}` envelope.

pub mod client;
pub mod config;

pub use client::HttpExternalApi;
pub use config::ClientConfig;

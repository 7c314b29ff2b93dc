pub mod config;
pub mod handlers;
pub mod metrics;
pub mod observability;
pub mod server;

pub use server::{AppState, ServerBuilder, UnisyncServer, build_app};

pub mod server;
pub mod sources;
pub mod states;

pub mod auth;
pub mod client;
pub mod session;
pub mod telemetry;
pub mod terminal;
pub mod transport;

//! HTTP control surface for the regwatch bulk inspection scan.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::Config;
pub use state::AppState;

//! Side-effecting helpers: configuration and case model files.

pub mod config;
pub mod model_store;

pub mod api;
pub mod classifier;
pub mod clients;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod rate_limiter;
pub mod renderer;
pub mod retry;
pub mod sweeper;
pub mod utils;
pub mod worker;

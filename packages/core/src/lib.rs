// Library root: exposes internal modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod db;
pub mod error;
pub mod metrics;
pub mod repository;
pub mod services;

// Startup-only modules, public so `main.rs` and tests share one copy.
pub mod cli;
pub mod config;
pub mod logging;

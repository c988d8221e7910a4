//! HTTP server for the blood test analyzer authentication core.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod sweeper;

//! Library root for pulsegrid: live multi-host metrics with HTTP backfill.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod history;
pub mod loader;
pub mod logging;
pub mod notify;
pub mod session;
pub mod store;
pub mod types;
pub mod ui;
pub mod ws;

pub use error::{Error, Result};

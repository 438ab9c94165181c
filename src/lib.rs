//! Live markdown previews in the browser.
//!
//! One coordinator process per port owns a [`session::Registry`] of previewed
//! files and serves the control API, the preview pages and their live-update
//! streams. Later invocations act as clients of it.

pub mod browser;
pub mod cli;
pub mod clients;
pub mod config;
pub mod coordinator;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod utils;
pub mod views;


use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::session::Registry;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub shutdown: CancellationToken,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            shutdown: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }
}

//! Shared application state for the web server.
//!
//! Collaborator clients are constructed per request so each build gets a
//! fresh embedding memo; the state only carries configuration.

use std::sync::Arc;

use crate::config::Config;

pub struct AppState {
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

pub type SharedState = Arc<AppState>;

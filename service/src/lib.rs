use sse::StreamRegistry;
use std::sync::Arc;

pub mod config;
pub mod logging;

pub use config::Config;

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub stream_registry: Arc<StreamRegistry>,
}

impl AppState {
    pub fn new(config: Config, stream_registry: Arc<StreamRegistry>) -> Self {
        Self {
            config,
            stream_registry,
        }
    }
}

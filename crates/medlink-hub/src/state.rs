//! Application state and shared resources.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::hub::Hub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// The coordination hub (registry + routing)
    pub hub: Arc<Hub>,

    /// Node identifier for logs and stats
    pub node_id: String,

    /// When this hub started serving
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let hub = Arc::new(Hub::new(config.transport.channel_capacity));
        let node_id = config.node_id.clone();

        Self {
            config: Arc::new(config),
            hub,
            node_id,
            started_at: Utc::now(),
        }
    }
}

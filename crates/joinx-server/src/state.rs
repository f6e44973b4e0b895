//! # Application State
//!
//! Created once at startup and shared with every handler through `Arc`. Join searches
//! themselves are per request: each one seeds its own relation store, so the state
//! only holds configuration and stateless collaborators.

use joinx_core::config::SearchConfig;
use joinx_core::partition::PartitionBoundMerger;
use joinx_paths::cost::JoinCostModel;
use joinx_paths::merge::ListBoundMerger;
use std::sync::Arc;

/// Server-level configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Search configuration for requests that do not override it.
    pub search: SearchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            search: SearchConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, with the bind address taken from `JOINX_BIND` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bind) = std::env::var("JOINX_BIND") {
            config.bind = bind;
        }
        config
    }
}

pub struct AppState {
    /// Cost model for requests that do not bring their own.
    pub cost_model: JoinCostModel,
    pub bound_merger: Arc<dyn PartitionBoundMerger>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            cost_model: JoinCostModel::default(),
            bound_merger: Arc::new(ListBoundMerger),
            config,
        }
    }
}

//! # Data Models
//!
//! SeaORM entities for workflow state and the reconciled show catalog, plus
//! small API-facing response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod episode;
pub mod genre;
pub mod history_event;
pub mod network;
pub mod season;
pub mod show;
pub mod show_genre;
pub mod web_channel;
pub mod workflow_run;

pub use episode::Entity as Episode;
pub use genre::Entity as Genre;
pub use history_event::Entity as HistoryEvent;
pub use network::Entity as Network;
pub use season::Entity as Season;
pub use show::Entity as Show;
pub use show_genre::Entity as ShowGenre;
pub use web_channel::Entity as WebChannel;
pub use workflow_run::Entity as WorkflowRun;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "showsync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    /// Always "ok" when returned with 200
    pub status: String,
    /// Database reachability
    pub database: String,
}

impl HealthStatus {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            database: "ok".to_string(),
        }
    }
}

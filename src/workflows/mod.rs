//! # Ingestion Workflows
//!
//! Workflow definitions driven by the engine in [`crate::workflow`].

use std::sync::Arc;

use crate::config::WorkflowConfig;
use crate::workflow::DefinitionRegistry;

pub mod delta_sync;
pub mod full_sync;

pub use delta_sync::{SHOW_UPDATE, ShowUpdate, ShowUpdateDefinition, ShowUpdateInput, ShowUpdateResult, ShowUpdateStatus};
pub use full_sync::{SHOW_INGEST, ShowIngest, ShowIngestDefinition, ShowIngestInput, ShowIngestResult};

/// Registry with both ingestion workflows.
pub fn definitions(config: &WorkflowConfig) -> DefinitionRegistry {
    let mut registry = DefinitionRegistry::new();
    registry.register(Arc::new(ShowIngestDefinition::new(config.clone())));
    registry.register(Arc::new(ShowUpdateDefinition));
    registry
}

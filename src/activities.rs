//! # Ingestion Activities
//!
//! Side-effecting steps used by the ingestion workflows. Each activity takes
//! and returns JSON so its input and result can be recorded in run history.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::IngestError;
use crate::reconcile::{ShowReconciler, validate_show};
use crate::upstream::{CatalogSource, ShowRecord, UpdatePeriod};
use crate::workflow::{Activity, ActivityRegistry};

pub const FETCH_SHOW_INDEX_PAGE: &str = "fetch_show_index_page";
pub const FETCH_SHOW_UPDATES: &str = "fetch_show_updates";
pub const FETCH_SHOW_DETAILS: &str = "fetch_show_details";
pub const PROCESS_SHOW_RECORD: &str = "process_show_record";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPageRequest {
    pub page: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexPage {
    pub page: u32,
    pub records: Vec<ShowRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatesRequest {
    #[serde(default)]
    pub period: UpdatePeriod,
}

/// Change map keyed by upstream show id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowUpdates {
    pub updates: BTreeMap<i64, i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowDetailsRequest {
    pub show_id: i64,
}

fn decode_input<T: DeserializeOwned>(input: Value) -> Result<T, IngestError> {
    Ok(serde_json::from_value(input)?)
}

fn encode_output<T: Serialize>(output: &T) -> Result<Value, IngestError> {
    serde_json::to_value(output)
        .map_err(|err| IngestError::Fatal(format!("failed to encode activity result: {}", err)))
}

/// `{page}` -> `{page, records}`
pub struct FetchShowIndexPage {
    source: Arc<dyn CatalogSource>,
}

impl FetchShowIndexPage {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Activity for FetchShowIndexPage {
    fn name(&self) -> &'static str {
        FETCH_SHOW_INDEX_PAGE
    }

    #[instrument(skip_all, name = "fetch_show_index_page")]
    async fn execute(&self, input: Value) -> Result<Value, IngestError> {
        let IndexPageRequest { page } = decode_input(input)?;
        let records = self.source.show_index_page(page).await?;
        debug!(page, count = records.len(), "Fetched index page");
        encode_output(&IndexPage { page, records })
    }
}

/// `{period}` -> `{updates}`
pub struct FetchShowUpdates {
    source: Arc<dyn CatalogSource>,
}

impl FetchShowUpdates {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Activity for FetchShowUpdates {
    fn name(&self) -> &'static str {
        FETCH_SHOW_UPDATES
    }

    #[instrument(skip_all, name = "fetch_show_updates")]
    async fn execute(&self, input: Value) -> Result<Value, IngestError> {
        let UpdatesRequest { period } = decode_input(input)?;
        let updates = self.source.updates(period).await?;
        debug!(%period, count = updates.len(), "Fetched change feed");
        encode_output(&ShowUpdates { updates })
    }
}

/// `{show_id}` -> show record
pub struct FetchShowDetails {
    source: Arc<dyn CatalogSource>,
}

impl FetchShowDetails {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Activity for FetchShowDetails {
    fn name(&self) -> &'static str {
        FETCH_SHOW_DETAILS
    }

    #[instrument(skip_all, name = "fetch_show_details")]
    async fn execute(&self, input: Value) -> Result<Value, IngestError> {
        let ShowDetailsRequest { show_id } = decode_input(input)?;
        let show = self.source.show(show_id).await?;
        encode_output(&show)
    }
}

/// Show record -> [`ShowIngestSummary`](crate::reconcile::ShowIngestSummary)
///
/// Fetches the show's seasons and episodes, then writes the whole graph in a
/// single transaction. Any error rolls the attempt back.
///
/// Attempts belong to the registry's retry policy: every retry re-enters
/// `execute` and opens a fresh transaction, so this activity does not wrap
/// itself in [`RetryPolicy::execute_in_transaction`](crate::workflow::RetryPolicy::execute_in_transaction).
pub struct ProcessShowRecord {
    source: Arc<dyn CatalogSource>,
    db: DatabaseConnection,
}

impl ProcessShowRecord {
    pub fn new(source: Arc<dyn CatalogSource>, db: DatabaseConnection) -> Self {
        Self { source, db }
    }
}

#[async_trait]
impl Activity for ProcessShowRecord {
    fn name(&self) -> &'static str {
        PROCESS_SHOW_RECORD
    }

    #[instrument(skip_all, name = "process_show_record")]
    async fn execute(&self, input: Value) -> Result<Value, IngestError> {
        let show: ShowRecord = decode_input(input)?;
        let (external_id, _) = validate_show(&show)?;

        let seasons = self.source.seasons(external_id).await?;
        let episodes = self.source.episodes(external_id).await?;

        let txn = self.db.begin().await?;
        let summary = ShowReconciler::new(&txn)
            .reconcile(&show, &seasons, &episodes)
            .await?;
        txn.commit().await?;

        encode_output(&summary)
    }
}

/// Registers every ingestion activity against `source` and `db`.
pub fn register_activities(
    registry: &mut ActivityRegistry,
    source: Arc<dyn CatalogSource>,
    db: DatabaseConnection,
) {
    registry.register(Arc::new(FetchShowIndexPage::new(Arc::clone(&source))));
    registry.register(Arc::new(FetchShowUpdates::new(Arc::clone(&source))));
    registry.register(Arc::new(FetchShowDetails::new(Arc::clone(&source))));
    registry.register(Arc::new(ProcessShowRecord::new(source, db)));
}

/// Registry with every ingestion activity.
pub fn activity_registry(source: Arc<dyn CatalogSource>, db: DatabaseConnection) -> ActivityRegistry {
    let mut registry = ActivityRegistry::new();
    register_activities(&mut registry, source, db);
    registry
}

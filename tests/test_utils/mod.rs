//! Test utilities shared by the integration tests.
//!
//! Provides an in-memory SQLite database with migrations applied, a scripted
//! [`CatalogSource`] and small record builders.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use showsync::config::WorkflowConfig;
use showsync::upstream::{
    CatalogSource, EpisodeRecord, OutletRecord, SeasonRecord, ShowRecord, UpdatePeriod,
    UpstreamError,
};
use showsync::workflow::WorkflowEngine;
use showsync::{activities, workflows};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;

    Migrator::up(&db, None).await?;

    // Children must reference rows written before them
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = ON".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Workflow settings with no batch delay and millisecond retry backoff.
pub fn fast_workflow_config() -> WorkflowConfig {
    WorkflowConfig {
        batch_delay_ms: 0,
        retry_base_delay_ms: 1,
        ..WorkflowConfig::default()
    }
}

/// Engine wired with both ingestion workflows and `source`.
pub fn test_engine(db: &DatabaseConnection, source: Arc<MockCatalog>) -> Arc<WorkflowEngine> {
    let config = fast_workflow_config();
    Arc::new(WorkflowEngine::new(
        db.clone(),
        workflows::definitions(&config),
        activities::activity_registry(source, db.clone()),
        &config,
    ))
}

/// Scripted catalog. Pages are served in order; missing shows answer 404.
#[derive(Default)]
pub struct MockCatalog {
    pages: Vec<Vec<ShowRecord>>,
    shows: HashMap<i64, ShowRecord>,
    seasons: HashMap<i64, Vec<SeasonRecord>>,
    episodes: HashMap<i64, Vec<EpisodeRecord>>,
    updates: BTreeMap<i64, i64>,
    failing_pages: HashSet<u32>,
    fail_updates: bool,
    flaky_episodes: AtomicU32,
    pub index_calls: AtomicU32,
    pub show_calls: AtomicU32,
    pub seasons_calls: AtomicU32,
    pub episodes_calls: AtomicU32,
    pub updates_calls: AtomicU32,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an index page.
    pub fn with_page(mut self, records: Vec<ShowRecord>) -> Self {
        self.pages.push(records);
        self
    }

    /// Registers a show for the details endpoint along with its children.
    pub fn with_show(
        mut self,
        show: ShowRecord,
        seasons: Vec<SeasonRecord>,
        episodes: Vec<EpisodeRecord>,
    ) -> Self {
        if let Some(id) = show.id {
            self.seasons.insert(id, seasons);
            self.episodes.insert(id, episodes);
            self.shows.insert(id, show);
        }
        self
    }

    pub fn with_updates(mut self, updates: BTreeMap<i64, i64>) -> Self {
        self.updates = updates;
        self
    }

    /// Every fetch of `page` fails with a permanent upstream error.
    pub fn failing_page(mut self, page: u32) -> Self {
        self.failing_pages.insert(page);
        self
    }

    /// The first `failures` episode fetches answer 503.
    pub fn flaky_episodes(self, failures: u32) -> Self {
        self.flaky_episodes.store(failures, Ordering::SeqCst);
        self
    }

    pub fn failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    pub fn calls(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for MockCatalog {
    async fn show_index_page(&self, page: u32) -> Result<Vec<ShowRecord>, UpstreamError> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_pages.contains(&page) {
            return Err(UpstreamError::Status {
                status: 400,
                message: format!("page {} rejected", page),
            });
        }
        Ok(self.pages.get(page as usize).cloned().unwrap_or_default())
    }

    async fn show(&self, show_id: i64) -> Result<ShowRecord, UpstreamError> {
        self.show_calls.fetch_add(1, Ordering::SeqCst);
        self.shows
            .get(&show_id)
            .cloned()
            .ok_or_else(|| UpstreamError::NotFound {
                resource: format!("show {}", show_id),
            })
    }

    async fn seasons(&self, show_id: i64) -> Result<Vec<SeasonRecord>, UpstreamError> {
        self.seasons_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.seasons.get(&show_id).cloned().unwrap_or_default())
    }

    async fn episodes(&self, show_id: i64) -> Result<Vec<EpisodeRecord>, UpstreamError> {
        self.episodes_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.flaky_episodes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.flaky_episodes.store(remaining - 1, Ordering::SeqCst);
            return Err(UpstreamError::Status {
                status: 503,
                message: "episodes unavailable".to_string(),
            });
        }
        Ok(self.episodes.get(&show_id).cloned().unwrap_or_default())
    }

    async fn updates(&self, _period: UpdatePeriod) -> Result<BTreeMap<i64, i64>, UpstreamError> {
        self.updates_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates {
            return Err(UpstreamError::Status {
                status: 400,
                message: "updates rejected".to_string(),
            });
        }
        Ok(self.updates.clone())
    }
}

pub fn show_record(id: i64, name: &str) -> ShowRecord {
    ShowRecord {
        id: Some(id),
        name: Some(name.to_string()),
        url: Some(format!("https://www.tvmaze.com/shows/{}", id)),
        language: Some("English".to_string()),
        status: Some("Running".to_string()),
        premiered: Some("2013-06-24".to_string()),
        genres: vec!["Drama".to_string()],
        ..ShowRecord::default()
    }
}

pub fn network_record(id: i64, name: &str) -> OutletRecord {
    OutletRecord {
        id: Some(id),
        name: Some(name.to_string()),
        ..OutletRecord::default()
    }
}

pub fn season_record(id: i64, number: i32) -> SeasonRecord {
    SeasonRecord {
        id: Some(id),
        number: Some(number),
        premiere_date: Some("2013-06-24".to_string()),
        ..SeasonRecord::default()
    }
}

pub fn episode_record(id: i64, season: i32, number: i32) -> EpisodeRecord {
    EpisodeRecord {
        id: Some(id),
        name: Some(format!("Episode {}", number)),
        season: Some(season),
        number: Some(number),
        airdate: Some("2013-06-24".to_string()),
        airtime: Some("22:00".to_string()),
        airstamp: Some("2013-06-25T02:00:00+00:00".to_string()),
        ..EpisodeRecord::default()
    }
}

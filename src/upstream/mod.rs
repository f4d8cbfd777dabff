//! # Upstream catalog source
//!
//! The [`CatalogSource`] trait is the seam between activities and the
//! third-party catalog API. [`TvMazeClient`] is the production implementation;
//! tests substitute scripted sources.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::error::IngestError;

pub mod records;
pub mod tvmaze;

pub use records::{EpisodeRecord, OutletRecord, SeasonRecord, ShowRecord};
pub use tvmaze::TvMazeClient;

/// Window of the upstream change feed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePeriod {
    #[default]
    Day,
    Week,
    Month,
}

impl UpdatePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdatePeriod::Day => "day",
            UpdatePeriod::Week => "week",
            UpdatePeriod::Month => "month",
        }
    }
}

impl fmt::Display for UpdatePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdatePeriod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(UpdatePeriod::Day),
            "week" => Ok(UpdatePeriod::Week),
            "month" => Ok(UpdatePeriod::Month),
            other => Err(format!("unknown update period '{}'", other)),
        }
    }
}

/// Errors returned by catalog sources.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{resource} not found upstream")]
    NotFound { resource: String },

    #[error("rate limited by upstream API (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("upstream request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed upstream payload for {resource}: {message}")]
    Malformed { resource: String, message: String },

    #[error("invalid upstream url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl UpstreamError {
    /// Timeouts, connection failures, 5xx and 429 are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::RateLimited { .. } => true,
            UpstreamError::Status { status, .. } => *status >= 500,
            UpstreamError::Network(err) => !err.is_builder() && !err.is_decode(),
            UpstreamError::NotFound { .. }
            | UpstreamError::Malformed { .. }
            | UpstreamError::InvalidUrl(_) => false,
        }
    }
}

impl From<UpstreamError> for IngestError {
    fn from(error: UpstreamError) -> Self {
        if error.is_transient() {
            IngestError::TransientUpstream(error.to_string())
        } else {
            IngestError::PermanentUpstream(error.to_string())
        }
    }
}

/// Read-only view of the upstream show catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// One page of the show index. Pages past the end are empty.
    async fn show_index_page(&self, page: u32) -> Result<Vec<ShowRecord>, UpstreamError>;

    /// Full details for a single show.
    async fn show(&self, show_id: i64) -> Result<ShowRecord, UpstreamError>;

    async fn seasons(&self, show_id: i64) -> Result<Vec<SeasonRecord>, UpstreamError>;

    async fn episodes(&self, show_id: i64) -> Result<Vec<EpisodeRecord>, UpstreamError>;

    /// Shows changed within `period`, as `{show_id -> changed_at}` (epoch seconds).
    async fn updates(&self, period: UpdatePeriod) -> Result<BTreeMap<i64, i64>, UpstreamError>;
}

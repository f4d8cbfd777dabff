//! `show_ingest`: full catalog sync.
//!
//! Walks the show index page by page. Each non-empty page fans out one
//! `process_show_record` per record with at most `concurrency_limit` in
//! flight, then pauses for `batch_delay_ms` before the next page. The first
//! empty page ends the run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::activities::{FETCH_SHOW_INDEX_PAGE, IndexPage, PROCESS_SHOW_RECORD};
use crate::config::WorkflowConfig;
use crate::error::FailureKind;
use crate::pagination::FullIndexCursor;
use crate::reconcile::ShowIngestSummary;
use crate::workflow::{
    ActivityCall, EngineError, Outcome, Resumed, Step, Workflow, WorkflowContext,
    WorkflowDefinition,
};

pub const SHOW_INGEST: &str = "show_ingest";

/// Run input; absent fields take the configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowIngestInput {
    pub concurrency_limit: Option<usize>,
    pub batch_delay_ms: Option<u64>,
}

/// Run result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowIngestResult {
    pub pages_fetched: u32,
    pub launched_count: u32,
    pub succeeded_count: u32,
    pub failed_count: u32,
    /// Validation-rejected shows plus seasons and episodes skipped inside
    /// successful shows
    pub skipped_count: u32,
    /// Set when a page fetch failed and ended the walk early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ShowIngestResult {
    fn tally(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success(value) => {
                self.succeeded_count += 1;
                if let Ok(summary) = serde_json::from_value::<ShowIngestSummary>(value) {
                    self.skipped_count += summary.skipped_items();
                }
            }
            Outcome::Failure(failure) if failure.kind == FailureKind::Validation => {
                self.skipped_count += 1;
            }
            Outcome::Failure(_) => self.failed_count += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    AwaitingPage,
    AwaitingBatch,
    AwaitingDelay,
}

impl State {
    fn label(self) -> &'static str {
        match self {
            State::Start => "start",
            State::AwaitingPage => "awaiting_page",
            State::AwaitingBatch => "awaiting_batch",
            State::AwaitingDelay => "awaiting_delay",
        }
    }
}

pub struct ShowIngest {
    concurrency_limit: usize,
    batch_delay: Duration,
    cursor: FullIndexCursor,
    state: State,
    result: ShowIngestResult,
}

impl ShowIngest {
    pub fn new(concurrency_limit: usize, batch_delay: Duration) -> Self {
        Self {
            concurrency_limit,
            batch_delay,
            cursor: FullIndexCursor::new(),
            state: State::Start,
            result: ShowIngestResult::default(),
        }
    }

    fn fetch_page(&mut self, ctx: &mut WorkflowContext) -> Step {
        let page = self.cursor.page();
        ctx.set_custom_status(format!("Fetching page {}", page));
        self.state = State::AwaitingPage;
        Step::Activity(ActivityCall::new(FETCH_SHOW_INDEX_PAGE, json!({ "page": page })))
    }

    fn complete(&mut self, ctx: &mut WorkflowContext) -> Result<Step, EngineError> {
        self.result.pages_fetched = self.cursor.pages_fetched();
        ctx.set_custom_status(format!(
            "Ingest complete: {} pages, {} launched, {} succeeded, {} failed, {} skipped",
            self.result.pages_fetched,
            self.result.launched_count,
            self.result.succeeded_count,
            self.result.failed_count,
            self.result.skipped_count
        ));
        if !ctx.is_replaying() {
            info!(result = ?self.result, "Full sync finished");
        }
        Ok(Step::Complete(serde_json::to_value(&self.result)?))
    }

    fn on_page(&mut self, ctx: &mut WorkflowContext, outcome: Outcome) -> Result<Step, EngineError> {
        let page = match outcome.decode::<IndexPage>() {
            Ok(page) => page,
            Err(failure) => {
                if !ctx.is_replaying() {
                    warn!(page = self.cursor.page(), error = %failure, "Index page fetch failed");
                }
                self.result.error = Some(format!(
                    "failed to fetch page {}: {}",
                    self.cursor.page(),
                    failure.cause
                ));
                return self.complete(ctx);
            }
        };

        if !self.cursor.advance(page.records.len()) {
            return self.complete(ctx);
        }

        ctx.set_custom_status(format!(
            "Processing page {} ({} shows)",
            page.page,
            page.records.len()
        ));
        let calls = page
            .records
            .into_iter()
            .map(|record| {
                serde_json::to_value(record).map(|input| ActivityCall::new(PROCESS_SHOW_RECORD, input))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.result.launched_count += calls.len() as u32;
        self.state = State::AwaitingBatch;
        Ok(Step::Batch {
            calls,
            limit: self.concurrency_limit,
        })
    }
}

impl Workflow for ShowIngest {
    fn next(&mut self, ctx: &mut WorkflowContext, resumed: Resumed) -> Result<Step, EngineError> {
        match (self.state, resumed) {
            (State::Start, Resumed::Start) => Ok(self.fetch_page(ctx)),
            (State::AwaitingPage, Resumed::Activity(outcome)) => self.on_page(ctx, outcome),
            (State::AwaitingBatch, Resumed::Batch(outcomes)) => {
                for outcome in outcomes {
                    self.result.tally(outcome);
                }
                if self.batch_delay.is_zero() {
                    return Ok(self.fetch_page(ctx));
                }
                self.state = State::AwaitingDelay;
                Ok(Step::Timer(self.batch_delay))
            }
            (State::AwaitingDelay, Resumed::TimerFired) => Ok(self.fetch_page(ctx)),
            (state, resumed) => Err(EngineError::unexpected(state.label(), &resumed)),
        }
    }
}

/// Builds [`ShowIngest`] instances, filling absent input from config.
pub struct ShowIngestDefinition {
    defaults: WorkflowConfig,
}

impl ShowIngestDefinition {
    pub fn new(defaults: WorkflowConfig) -> Self {
        Self { defaults }
    }
}

impl WorkflowDefinition for ShowIngestDefinition {
    fn name(&self) -> &'static str {
        SHOW_INGEST
    }

    fn create(&self, input: &Value) -> Result<Box<dyn Workflow>, EngineError> {
        let input: ShowIngestInput = if input.is_null() {
            ShowIngestInput::default()
        } else {
            serde_json::from_value(input.clone())
                .map_err(|err| EngineError::invalid_input(SHOW_INGEST, err))?
        };

        let concurrency_limit = input
            .concurrency_limit
            .unwrap_or(self.defaults.concurrency_limit);
        if !(1..=100).contains(&concurrency_limit) {
            return Err(EngineError::invalid_input(
                SHOW_INGEST,
                format!("concurrency_limit must be between 1 and 100, got {}", concurrency_limit),
            ));
        }
        let batch_delay_ms = input.batch_delay_ms.unwrap_or(self.defaults.batch_delay_ms);

        Ok(Box::new(ShowIngest::new(
            concurrency_limit,
            Duration::from_millis(batch_delay_ms),
        )))
    }
}

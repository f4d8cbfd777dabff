//! `show_update`: incremental sync from the upstream change feed.
//!
//! Fetches the shows changed within a period, then for each id in ascending
//! order fetches the show details and processes the record. Ids are handled
//! one at a time; a failure on one id is counted and the walk continues.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::activities::{FETCH_SHOW_DETAILS, FETCH_SHOW_UPDATES, PROCESS_SHOW_RECORD, ShowUpdates};
use crate::pagination::IncrementalCursor;
use crate::reconcile::ShowIngestSummary;
use crate::upstream::UpdatePeriod;
use crate::workflow::{
    ActivityCall, EngineError, Outcome, Resumed, Step, Workflow, WorkflowContext,
    WorkflowDefinition,
};

pub const SHOW_UPDATE: &str = "show_update";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowUpdateInput {
    pub period: UpdatePeriod,
}

/// Final disposition of a delta run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowUpdateStatus {
    #[default]
    Completed,
    NoUpdates,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowUpdateResult {
    pub status: ShowUpdateStatus,
    pub period: UpdatePeriod,
    pub updates_found: u32,
    pub processed_successfully: u32,
    pub failed_or_skipped: u32,
    /// Seasons and episodes skipped inside processed shows
    pub skipped_items: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    AwaitingUpdates,
    AwaitingDetails { show_id: i64 },
    AwaitingProcess { show_id: i64 },
}

impl State {
    fn label(self) -> &'static str {
        match self {
            State::Start => "start",
            State::AwaitingUpdates => "awaiting_updates",
            State::AwaitingDetails { .. } => "awaiting_details",
            State::AwaitingProcess { .. } => "awaiting_process",
        }
    }
}

pub struct ShowUpdate {
    period: UpdatePeriod,
    cursor: IncrementalCursor,
    state: State,
    result: ShowUpdateResult,
}

impl ShowUpdate {
    pub fn new(period: UpdatePeriod) -> Self {
        Self {
            period,
            cursor: IncrementalCursor::default(),
            state: State::Start,
            result: ShowUpdateResult {
                period,
                ..ShowUpdateResult::default()
            },
        }
    }

    fn complete(&mut self, ctx: &mut WorkflowContext) -> Result<Step, EngineError> {
        if !ctx.is_replaying() {
            info!(result = ?self.result, "Delta sync finished");
        }
        Ok(Step::Complete(serde_json::to_value(&self.result)?))
    }

    fn next_show(&mut self, ctx: &mut WorkflowContext) -> Result<Step, EngineError> {
        let Some(show_id) = self.cursor.next() else {
            ctx.set_custom_status(format!(
                "Update complete for period '{}'. Updates found: {}, processed: {}, failed/skipped: {}",
                self.period,
                self.result.updates_found,
                self.result.processed_successfully,
                self.result.failed_or_skipped
            ));
            return self.complete(ctx);
        };

        ctx.set_custom_status(format!(
            "Processing show {}/{} (ID: {})...",
            self.cursor.visited(),
            self.cursor.total(),
            show_id
        ));
        self.state = State::AwaitingDetails { show_id };
        Ok(Step::Activity(ActivityCall::new(
            FETCH_SHOW_DETAILS,
            json!({ "show_id": show_id }),
        )))
    }

    fn on_updates(&mut self, ctx: &mut WorkflowContext, outcome: Outcome) -> Result<Step, EngineError> {
        let updates = match outcome.decode::<ShowUpdates>() {
            Ok(ShowUpdates { updates }) => updates,
            Err(failure) => {
                if !ctx.is_replaying() {
                    warn!(period = %self.period, error = %failure, "Change feed fetch failed");
                }
                ctx.set_custom_status(format!(
                    "Failed to fetch show updates for period '{}'",
                    self.period
                ));
                self.result.status = ShowUpdateStatus::Failed;
                self.result.reason = Some(format!("could not fetch updates: {}", failure.cause));
                return self.complete(ctx);
            }
        };

        if updates.is_empty() {
            ctx.set_custom_status(format!("No show updates found for period '{}'", self.period));
            self.result.status = ShowUpdateStatus::NoUpdates;
            return self.complete(ctx);
        }

        self.cursor = IncrementalCursor::new(&updates);
        self.result.updates_found = self.cursor.total() as u32;
        self.next_show(ctx)
    }
}

impl Workflow for ShowUpdate {
    fn next(&mut self, ctx: &mut WorkflowContext, resumed: Resumed) -> Result<Step, EngineError> {
        match (self.state, resumed) {
            (State::Start, Resumed::Start) => {
                ctx.set_custom_status(format!("Fetching updates for the last '{}'...", self.period));
                self.state = State::AwaitingUpdates;
                Ok(Step::Activity(ActivityCall::new(
                    FETCH_SHOW_UPDATES,
                    json!({ "period": self.period }),
                )))
            }
            (State::AwaitingUpdates, Resumed::Activity(outcome)) => self.on_updates(ctx, outcome),
            (State::AwaitingDetails { show_id }, Resumed::Activity(outcome)) => match outcome {
                Outcome::Success(record) => {
                    self.state = State::AwaitingProcess { show_id };
                    Ok(Step::Activity(ActivityCall::new(PROCESS_SHOW_RECORD, record)))
                }
                Outcome::Failure(failure) => {
                    if !ctx.is_replaying() {
                        warn!(show_id, error = %failure, "Show details fetch failed");
                    }
                    self.result.failed_or_skipped += 1;
                    self.next_show(ctx)
                }
            },
            (State::AwaitingProcess { show_id }, Resumed::Activity(outcome)) => {
                match outcome.decode::<ShowIngestSummary>() {
                    Ok(summary) => {
                        self.result.processed_successfully += 1;
                        self.result.skipped_items += summary.skipped_items();
                    }
                    Err(failure) => {
                        if !ctx.is_replaying() {
                            warn!(show_id, error = %failure, "Show processing failed");
                        }
                        self.result.failed_or_skipped += 1;
                    }
                }
                self.next_show(ctx)
            }
            (state, resumed) => Err(EngineError::unexpected(state.label(), &resumed)),
        }
    }
}

pub struct ShowUpdateDefinition;

impl WorkflowDefinition for ShowUpdateDefinition {
    fn name(&self) -> &'static str {
        SHOW_UPDATE
    }

    fn create(&self, input: &Value) -> Result<Box<dyn Workflow>, EngineError> {
        let input: ShowUpdateInput = if input.is_null() {
            ShowUpdateInput::default()
        } else {
            serde_json::from_value(input.clone())
                .map_err(|err| EngineError::invalid_input(SHOW_UPDATE, err))?
        };
        Ok(Box::new(ShowUpdate::new(input.period)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn updates(ids: &[i64]) -> Outcome {
        let updates: BTreeMap<i64, i64> = ids.iter().map(|&id| (id, 1_700_000_000 + id)).collect();
        Outcome::Success(serde_json::to_value(ShowUpdates { updates }).unwrap())
    }

    fn show_id_of(step: &Step) -> i64 {
        match step {
            Step::Activity(call) if call.name == FETCH_SHOW_DETAILS => {
                call.input["show_id"].as_i64().unwrap()
            }
            other => panic!("expected details fetch, got {:?}", other),
        }
    }

    #[test]
    fn processes_changed_shows_in_ascending_order() {
        let mut ctx = WorkflowContext::new(Uuid::new_v4(), None);
        let mut workflow = ShowUpdate::new(UpdatePeriod::Week);

        let step = workflow.next(&mut ctx, Resumed::Start).unwrap();
        assert!(matches!(step, Step::Activity(ref call) if call.input == json!({"period": "week"})));

        let step = workflow.next(&mut ctx, Resumed::Activity(updates(&[30, 10]))).unwrap();
        assert_eq!(show_id_of(&step), 10);
        assert_eq!(ctx.custom_status(), Some("Processing show 1/2 (ID: 10)..."));

        let record = json!({"id": 10, "name": "Ten"});
        let step = workflow
            .next(&mut ctx, Resumed::Activity(Outcome::Success(record.clone())))
            .unwrap();
        assert_eq!(step, Step::Activity(ActivityCall::new(PROCESS_SHOW_RECORD, record)));

        let summary = ShowIngestSummary {
            episodes_skipped: 1,
            ..ShowIngestSummary::default()
        };
        let step = workflow
            .next(
                &mut ctx,
                Resumed::Activity(Outcome::Success(serde_json::to_value(summary).unwrap())),
            )
            .unwrap();
        assert_eq!(show_id_of(&step), 30);

        let not_found = Outcome::failure(FailureKind::PermanentUpstream, "show 30 not found", 1);
        let Step::Complete(value) = workflow.next(&mut ctx, Resumed::Activity(not_found)).unwrap() else {
            panic!("expected completion");
        };
        let result: ShowUpdateResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.status, ShowUpdateStatus::Completed);
        assert_eq!(result.updates_found, 2);
        assert_eq!(result.processed_successfully, 1);
        assert_eq!(result.failed_or_skipped, 1);
        assert_eq!(result.skipped_items, 1);
        assert_eq!(result.reason, None);
    }

    #[test]
    fn empty_feed_completes_with_no_updates() {
        let mut ctx = WorkflowContext::new(Uuid::new_v4(), None);
        let mut workflow = ShowUpdate::new(UpdatePeriod::Day);
        workflow.next(&mut ctx, Resumed::Start).unwrap();

        let Step::Complete(value) = workflow.next(&mut ctx, Resumed::Activity(updates(&[]))).unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(value["status"], "no_updates");
        assert_eq!(value["updates_found"], 0);
    }

    #[test]
    fn failed_feed_completes_with_reason() {
        let mut ctx = WorkflowContext::new(Uuid::new_v4(), None);
        let mut workflow = ShowUpdate::new(UpdatePeriod::Month);
        workflow.next(&mut ctx, Resumed::Start).unwrap();

        let failure = Outcome::failure(FailureKind::TransientUpstream, "timed out", 3);
        let Step::Complete(value) = workflow.next(&mut ctx, Resumed::Activity(failure)).unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(value["status"], "failed");
        assert_eq!(value["period"], "month");
        assert!(value["reason"].as_str().unwrap().contains("timed out"));
    }

    #[test]
    fn rejects_unknown_period() {
        let err = ShowUpdateDefinition
            .create(&json!({"period": "year"}))
            .err()
            .expect("invalid");
        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }
}

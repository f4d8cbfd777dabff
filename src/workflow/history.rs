//! Append-only per-run event log.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::activity::{ActivityFailure, Outcome};
use super::{EngineError, RetryPolicy};
use crate::error::{Classification, is_transient_store_error};
use crate::models::history_event;

/// Event payloads. The serde tag doubles as the `kind` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ActivityScheduled {
        name: String,
        input: Value,
    },
    ActivityCompleted {
        /// Sequence of the matching `ActivityScheduled`
        scheduled: i64,
        result: Value,
    },
    ActivityFailed {
        scheduled: i64,
        failure: ActivityFailure,
    },
    TimerFired {
        duration_ms: u64,
    },
    SubRunScheduled {
        child_run_id: Uuid,
        definition: String,
        input: Value,
    },
    SubRunCompleted {
        scheduled: i64,
        outcome: Outcome,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ActivityScheduled { .. } => "activity_scheduled",
            EventKind::ActivityCompleted { .. } => "activity_completed",
            EventKind::ActivityFailed { .. } => "activity_failed",
            EventKind::TimerFired { .. } => "timer_fired",
            EventKind::SubRunScheduled { .. } => "sub_run_scheduled",
            EventKind::SubRunCompleted { .. } => "sub_run_completed",
        }
    }

    /// Completion events for an activity scheduled at `scheduled`.
    pub fn activity_outcome(scheduled: i64, outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success(result) => EventKind::ActivityCompleted {
                scheduled,
                result: result.clone(),
            },
            Outcome::Failure(failure) => EventKind::ActivityFailed {
                scheduled,
                failure: failure.clone(),
            },
        }
    }

    /// Sequence of the scheduling event this event completes, if any.
    pub fn completes(&self) -> Option<i64> {
        match self {
            EventKind::ActivityCompleted { scheduled, .. }
            | EventKind::ActivityFailed { scheduled, .. }
            | EventKind::SubRunCompleted { scheduled, .. } => Some(*scheduled),
            _ => None,
        }
    }
}

/// A decoded history row.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub run_id: Uuid,
    pub sequence: i64,
    pub kind: EventKind,
    pub recorded_at: DateTime<FixedOffset>,
}

impl RecordedEvent {
    fn decode(row: history_event::Model) -> Result<Self, EngineError> {
        let kind: EventKind =
            serde_json::from_value(row.payload).map_err(|err| EngineError::CorruptHistory {
                run_id: row.run_id,
                sequence: row.sequence,
                message: err.to_string(),
            })?;
        if kind.name() != row.kind {
            return Err(EngineError::CorruptHistory {
                run_id: row.run_id,
                sequence: row.sequence,
                message: format!("kind column '{}' disagrees with payload '{}'", row.kind, kind.name()),
            });
        }
        Ok(Self {
            run_id: row.run_id,
            sequence: row.sequence,
            kind,
            recorded_at: row.recorded_at,
        })
    }
}

/// sea-orm backed history log.
///
/// Sequences are dense and zero-based per run. Appends are atomic: either
/// every event of a call is recorded or none is.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    db: DatabaseConnection,
    retry: RetryPolicy,
}

impl HistoryStore {
    pub fn new(db: DatabaseConnection, retry: RetryPolicy) -> Self {
        Self { db, retry }
    }

    /// Appends `events` in order and returns their sequence numbers.
    pub async fn append(&self, run_id: Uuid, events: Vec<EventKind>) -> Result<Vec<i64>, EngineError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let encoded = events
            .iter()
            .map(|event| serde_json::to_value(event).map(|payload| (event.name(), payload)))
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        self.retry
            .execute_in_transaction::<Vec<i64>, DbErr, _, _>(
                &self.db,
                move |txn| {
                    let encoded = encoded.clone();
                    Box::pin(async move {
                        let last = history_event::Entity::find()
                            .select_only()
                            .column(history_event::Column::Sequence)
                            .filter(history_event::Column::RunId.eq(run_id))
                            .order_by_desc(history_event::Column::Sequence)
                            .limit(1)
                            .into_tuple::<i64>()
                            .one(txn)
                            .await?;
                        let first = last.map_or(0, |seq| seq + 1);
                        let now = Utc::now().fixed_offset();

                        let count = encoded.len() as i64;
                        let rows = encoded.into_iter().enumerate().map(|(offset, (kind, payload))| {
                            history_event::ActiveModel {
                                run_id: Set(run_id),
                                sequence: Set(first + offset as i64),
                                kind: Set(kind.to_string()),
                                payload: Set(payload),
                                recorded_at: Set(now),
                            }
                        });
                        history_event::Entity::insert_many(rows)
                            .exec_without_returning(txn)
                            .await?;

                        Ok((first..first + count).collect())
                    })
                },
                |err| {
                    if is_transient_store_error(err) {
                        Classification::Transient
                    } else {
                        Classification::Permanent
                    }
                },
            )
            .await
            .map_err(|failure| EngineError::Store(failure.error))
    }

    /// Convenience for a single event.
    pub async fn append_one(&self, run_id: Uuid, event: EventKind) -> Result<i64, EngineError> {
        let sequences = self.append(run_id, vec![event]).await?;
        sequences
            .first()
            .copied()
            .ok_or_else(|| EngineError::Workflow("history append returned no sequence".to_string()))
    }

    /// Full log for `run_id` in sequence order.
    pub async fn load(&self, run_id: Uuid) -> Result<Vec<RecordedEvent>, EngineError> {
        let rows = history_event::Entity::find()
            .filter(history_event::Column::RunId.eq(run_id))
            .order_by_asc(history_event::Column::Sequence)
            .all(&self.db)
            .await?;

        rows.into_iter().map(RecordedEvent::decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use serde_json::json;

    #[test]
    fn payload_tag_matches_kind_name() {
        let events = [
            EventKind::ActivityScheduled {
                name: "fetch_show_index_page".into(),
                input: json!({"page": 0}),
            },
            EventKind::ActivityFailed {
                scheduled: 0,
                failure: ActivityFailure {
                    kind: FailureKind::PermanentUpstream,
                    cause: "not found".into(),
                    attempts: 1,
                },
            },
            EventKind::TimerFired { duration_ms: 1000 },
            EventKind::SubRunScheduled {
                child_run_id: Uuid::nil(),
                definition: "show_update".into(),
                input: json!({}),
            },
        ];

        for event in events {
            let payload = serde_json::to_value(&event).unwrap();
            assert_eq!(payload["type"], event.name());
        }
    }

    #[test]
    fn completion_events_point_at_their_schedule() {
        let event = EventKind::activity_outcome(4, &Outcome::Success(json!(1)));
        assert_eq!(event.completes(), Some(4));
        assert_eq!(EventKind::TimerFired { duration_ms: 0 }.completes(), None);
    }

    #[test]
    fn decode_rejects_garbage_payload() {
        let row = history_event::Model {
            run_id: Uuid::new_v4(),
            sequence: 2,
            kind: "timer_fired".into(),
            payload: json!({"type": "timer_fired", "duration_ms": "soon"}),
            recorded_at: Utc::now().fixed_offset(),
        };
        assert!(matches!(
            RecordedEvent::decode(row),
            Err(EngineError::CorruptHistory { sequence: 2, .. })
        ));
    }
}

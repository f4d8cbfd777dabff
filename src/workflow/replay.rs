//! Replay cursor over a run's recorded history.
//!
//! Scheduling events (`ActivityScheduled`, `TimerFired`, `SubRunScheduled`)
//! are consumed strictly in order, one per step the workflow produces.
//! Completion events are looked up by the sequence number of the event they
//! complete, so the order in which parallel activities finished is irrelevant.

use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use super::EngineError;
use super::activity::{ActivityCall, Outcome};
use super::history::{EventKind, RecordedEvent};

/// A scheduling decision found in history.
#[derive(Debug, Clone, PartialEq)]
pub struct Replayed {
    pub sequence: i64,
    /// `None` when the scheduled work never completed
    pub outcome: Option<Outcome>,
}

/// A sub-run scheduling decision found in history.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayedSubRun {
    pub sequence: i64,
    pub child_run_id: Uuid,
    pub outcome: Option<Outcome>,
}

#[derive(Debug)]
pub struct ReplayCursor {
    run_id: Uuid,
    commands: VecDeque<RecordedEvent>,
    completions: HashMap<i64, Outcome>,
}

impl ReplayCursor {
    pub fn new(run_id: Uuid, events: Vec<RecordedEvent>) -> Self {
        let mut commands = VecDeque::new();
        let mut completions = HashMap::new();

        for event in events {
            match &event.kind {
                EventKind::ActivityCompleted { scheduled, result } => {
                    completions.insert(*scheduled, Outcome::Success(result.clone()));
                }
                EventKind::ActivityFailed { scheduled, failure } => {
                    completions.insert(*scheduled, Outcome::Failure(failure.clone()));
                }
                EventKind::SubRunCompleted { scheduled, outcome } => {
                    completions.insert(*scheduled, outcome.clone());
                }
                _ => commands.push_back(event),
            }
        }

        Self {
            run_id,
            commands,
            completions,
        }
    }

    /// True while recorded scheduling decisions remain to be matched.
    pub fn is_replaying(&self) -> bool {
        !self.commands.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.commands.len()
    }

    /// Matches an activity step against the next recorded decision.
    pub fn next_activity(&mut self, call: &ActivityCall) -> Result<Option<Replayed>, EngineError> {
        let Some(event) = self.commands.pop_front() else {
            return Ok(None);
        };

        match &event.kind {
            EventKind::ActivityScheduled { name, .. } if *name == call.name => Ok(Some(Replayed {
                sequence: event.sequence,
                outcome: self.completions.remove(&event.sequence),
            })),
            other => Err(self.mismatch(&event, format!("activity '{}'", call.name), other)),
        }
    }

    /// Matches a timer step. `true` means the timer already fired.
    pub fn next_timer(&mut self) -> Result<bool, EngineError> {
        let Some(event) = self.commands.pop_front() else {
            return Ok(false);
        };

        match &event.kind {
            EventKind::TimerFired { .. } => Ok(true),
            other => Err(self.mismatch(&event, "timer".to_string(), other)),
        }
    }

    pub fn next_sub_run(&mut self, definition: &str) -> Result<Option<ReplayedSubRun>, EngineError> {
        let Some(event) = self.commands.pop_front() else {
            return Ok(None);
        };

        match &event.kind {
            EventKind::SubRunScheduled {
                child_run_id,
                definition: recorded,
                ..
            } if recorded == definition => Ok(Some(ReplayedSubRun {
                sequence: event.sequence,
                child_run_id: *child_run_id,
                outcome: self.completions.remove(&event.sequence),
            })),
            other => Err(self.mismatch(&event, format!("sub-run '{}'", definition), other)),
        }
    }

    /// Fails if recorded decisions are left over when the workflow completes.
    pub fn finish(&self) -> Result<(), EngineError> {
        match self.commands.front() {
            Some(event) => Err(self.mismatch(event, "completion".to_string(), &event.kind)),
            None => Ok(()),
        }
    }

    fn mismatch(&self, event: &RecordedEvent, expected: String, found: &EventKind) -> EngineError {
        let found = match found {
            EventKind::ActivityScheduled { name, .. } => format!("activity '{}'", name),
            EventKind::SubRunScheduled { definition, .. } => format!("sub-run '{}'", definition),
            other => other.name().to_string(),
        };
        EngineError::Nondeterminism {
            run_id: self.run_id,
            sequence: event.sequence,
            expected,
            found,
        }
    }
}

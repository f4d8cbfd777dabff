//! # Update Timer
//!
//! Background task that starts a `show_update` run once a day at the
//! configured UTC hour. Fire times are computed from the wall clock at startup
//! and after each fire; a fire missed while the process was down is skipped.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use metrics::counter;
use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::config::UpdateTimerConfig;
use crate::workflow::WorkflowEngine;
use crate::workflows::{SHOW_UPDATE, ShowUpdateInput};

/// Daily delta-sync trigger.
pub struct UpdateTimer {
    config: UpdateTimerConfig,
    engine: Arc<WorkflowEngine>,
}

impl UpdateTimer {
    pub fn new(config: UpdateTimerConfig, engine: Arc<WorkflowEngine>) -> Self {
        Self { config, engine }
    }

    /// Run the timer loop until the provided shutdown token fires.
    #[instrument(skip_all, fields(hour_utc = self.config.hour_utc))]
    pub async fn run(self, shutdown: CancellationToken) {
        if !self.config.enabled {
            info!("Update timer disabled");
            return;
        }
        info!(period = %self.config.period, "Starting update timer");

        loop {
            let now = Utc::now();
            let jitter = sample_jitter_seconds(self.config.jitter_max_seconds);
            let fire_at = next_fire_time(now, self.config.hour_utc) + Duration::seconds(jitter as i64);
            let wait = (fire_at - now).to_std().unwrap_or_default();
            info!(%fire_at, jitter_seconds = jitter, "Next delta sync scheduled");

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Update timer shutdown requested");
                    break;
                }
                _ = sleep(wait) => self.fire().await,
            }
        }

        info!("Update timer stopped");
    }

    async fn fire(&self) {
        let input = ShowUpdateInput {
            period: self.config.period,
        };
        let input = match serde_json::to_value(input) {
            Ok(input) => input,
            Err(err) => {
                error!(error = %err, "Failed to encode delta sync input");
                return;
            }
        };

        match self.engine.submit(SHOW_UPDATE, input).await {
            Ok(run_id) => {
                counter!("update_timer_fired_total").increment(1);
                info!(%run_id, "Timer started delta sync");
            }
            Err(err) => {
                counter!("update_timer_failures_total").increment(1);
                error!(error = %err, "Timer failed to start delta sync");
            }
        }
    }
}

/// First instant strictly after `now` at `hour_utc`:00:00 UTC.
pub fn next_fire_time(now: DateTime<Utc>, hour_utc: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour_utc.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(time).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

fn sample_jitter_seconds(max_seconds: u64) -> u64 {
    let mut rng = rand::thread_rng();
    compute_jitter_seconds(max_seconds, &mut rng)
}

fn compute_jitter_seconds<R: Rng + ?Sized>(max_seconds: u64, rng: &mut R) -> u64 {
    if max_seconds == 0 {
        return 0;
    }
    rng.gen_range(0..=max_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn fires_later_the_same_day_before_the_hour() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 4, 59, 59).unwrap();
        let next = next_fire_time(now, 5);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 10, 5, 0, 0).unwrap());
    }

    #[test]
    fn fires_tomorrow_at_or_after_the_hour() {
        let at_hour = Utc.with_ymd_and_hms(2024, 3, 10, 5, 0, 0).unwrap();
        assert_eq!(
            next_fire_time(at_hour, 5),
            Utc.with_ymd_and_hms(2024, 3, 11, 5, 0, 0).unwrap()
        );

        let evening = Utc.with_ymd_and_hms(2024, 12, 31, 22, 15, 0).unwrap();
        assert_eq!(
            next_fire_time(evening, 5),
            Utc.with_ymd_and_hms(2025, 1, 1, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn jitter_is_zero_when_disabled() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(compute_jitter_seconds(0, &mut rng), 0);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            assert!(compute_jitter_seconds(30, &mut rng) <= 30);
        }
    }

    #[tokio::test]
    async fn disabled_timer_returns_immediately() {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        let config = crate::config::AppConfig::default();
        let state = crate::server::AppState::new(
            config,
            db,
            Arc::new(crate::upstream::TvMazeClient::new(&Default::default()).unwrap()),
        );
        let timer = UpdateTimer::new(
            UpdateTimerConfig {
                enabled: false,
                ..Default::default()
            },
            Arc::clone(&state.engine),
        );

        tokio::time::timeout(std::time::Duration::from_secs(1), timer.run(CancellationToken::new()))
            .await
            .expect("disabled timer should not loop");
    }
}

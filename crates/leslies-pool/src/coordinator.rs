//! Periodic refresh loop standing in for the host platform.
//!
//! The coordinator owns the only [`LesliesPoolApi`] handle, so fetches are
//! serialized by construction. Each refresh publishes a fresh
//! [`CoordinatorState`] on a watch channel.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::LesliesPoolApi;
use crate::date::parse_test_date;
use crate::reading::FetchOutcome;

/// Poll interval used when none is configured.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(300);

/// One fetch result plus the values derived from it for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorData {
    pub outcome: FetchOutcome,
    /// Copy of the reading's test date.
    pub last_tested: Option<String>,
    /// Test date normalized to midday.
    pub test_timestamp: Option<NaiveDateTime>,
}

impl SensorData {
    pub fn from_outcome(outcome: FetchOutcome) -> Self {
        let last_tested = outcome.reading().and_then(|r| r.test_date.clone());
        let test_timestamp = parse_test_date(last_tested.as_deref());
        Self {
            outcome,
            last_tested,
            test_timestamp,
        }
    }

    /// Flat mapping of the reading plus `last_tested` and `test_timestamp`.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = self.outcome.to_fields();
        fields.insert(
            "last_tested".to_owned(),
            self.last_tested.clone().map_or(Value::Null, Value::String),
        );
        fields.insert(
            "test_timestamp".to_owned(),
            self.test_timestamp
                .map_or(Value::Null, |ts| Value::String(ts.to_string())),
        );
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinatorState {
    /// Last published data. Kept as is when a refresh fails.
    pub data: Option<SensorData>,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

pub struct Coordinator {
    api: LesliesPoolApi,
    interval: Duration,
    state_tx: watch::Sender<CoordinatorState>,
}

impl Coordinator {
    pub fn new(api: LesliesPoolApi, interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(CoordinatorState::default());
        Self {
            api,
            interval,
            state_tx,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn api(&self) -> &LesliesPoolApi {
        &self.api
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> CoordinatorState {
        self.state_tx.borrow().clone()
    }

    /// Run one fetch and publish the resulting state.
    pub async fn refresh(&mut self) -> CoordinatorState {
        let result = self.api.fetch_water_test_data().await;
        let now = Utc::now();

        self.state_tx.send_modify(|state| {
            state.last_updated = Some(now);
            match result {
                Ok(outcome) => {
                    debug!(
                        empty = outcome.is_empty(),
                        cached = outcome.is_cached(),
                        "Refresh finished"
                    );
                    state.data = Some(SensorData::from_outcome(outcome));
                    state.last_update_success = true;
                    state.last_error = None;
                }
                Err(e) => {
                    warn!(error = %e, "Error fetching data");
                    state.last_update_success = false;
                    state.last_error = Some(format!("Error fetching data: {e}"));
                }
            }
        });

        self.state()
    }

    /// Refresh immediately, then on every interval tick until cancelled.
    pub async fn run(mut self, cancellation_token: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Starting water test polling");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Water test polling shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancellation_token.cancelled() => {
                            info!("Water test polling shutting down");
                            break;
                        }
                        _ = self.refresh() => {}
                    }
                }
            }
        }
    }
}

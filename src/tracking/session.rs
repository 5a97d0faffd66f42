use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use super::alerts::AlertRule;
use super::observation_log::log_file_name;
use crate::search::{Filter, FilterError};

/// When a poll result becomes a CSV row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    /// Every successful poll writes a row.
    #[default]
    Always,
    /// Only write when listing, price or float differ from the previous row.
    OnChange,
}

/// Which listings of a poll are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationScope {
    #[default]
    Lowest,
    AllListings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Cancelled,
    AuthRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerState {
    Running,
    Stopped(StopReason),
}

impl TrackerState {
    pub fn is_running(&self) -> bool {
        matches!(self, TrackerState::Running)
    }
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerState::Running => f.write_str("running"),
            TrackerState::Stopped(StopReason::Cancelled) => f.write_str("stopped"),
            TrackerState::Stopped(StopReason::AuthRejected) => {
                f.write_str("stopped (API key rejected)")
            }
        }
    }
}

/// Everything one polling loop needs to know about its target.
#[derive(Debug, Clone)]
pub struct TrackingSession {
    pub id: Uuid,
    pub name: String,
    pub filter: Filter,
    pub interval: Duration,
    pub log_path: PathBuf,
    pub record_prices: bool,
    pub record_mode: RecordMode,
    pub scope: ObservationScope,
    pub alert: Option<AlertRule>,
}

impl TrackingSession {
    /// The filter is validated here so a bad range never reaches the poller.
    pub fn new(
        name: impl Into<String>,
        filter: Filter,
        interval: Duration,
        log_dir: &Path,
    ) -> Result<Self, FilterError> {
        filter.validate()?;
        let name = name.into();
        Ok(Self {
            id: Uuid::new_v4(),
            log_path: log_dir.join(log_file_name(&name)),
            name,
            filter,
            interval: interval.max(Duration::from_secs(1)),
            record_prices: true,
            record_mode: RecordMode::default(),
            scope: ObservationScope::default(),
            alert: None,
        })
    }

    pub fn with_record_mode(mut self, mode: RecordMode) -> Self {
        self.record_mode = mode;
        self
    }

    pub fn with_scope(mut self, scope: ObservationScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_alert(mut self, alert: AlertRule) -> Self {
        self.alert = Some(alert);
        self
    }

    /// Alert-only session: polls and checks the alert rule but writes no CSV.
    pub fn without_price_log(mut self) -> Self {
        self.record_prices = false;
        self
    }
}

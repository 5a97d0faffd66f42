use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::alerts::AlertRule;
use super::session::{ObservationScope, RecordMode, TrackingSession};
use crate::core::config::TrackingConfig;
use crate::core::storage;
use crate::search::{Filter, FilterError};

/// A saved search and what to do with it when tracking runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSearch {
    pub filter: Filter,
    #[serde(default)]
    pub track_prices: bool,
    #[serde(default)]
    pub track_alerts: bool,
    #[serde(default)]
    pub alert: Option<AlertRule>,
    #[serde(default)]
    pub record_mode: Option<RecordMode>,
    #[serde(default)]
    pub scope: ObservationScope,
}

impl TrackedSearch {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            track_prices: true,
            track_alerts: false,
            alert: None,
            record_mode: None,
            scope: ObservationScope::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.track_prices || (self.track_alerts && self.alert.is_some())
    }

    /// Build the polling session for this search. Price logging polls at the
    /// tracking interval; alert-only searches use the slower alert interval.
    pub fn to_session(&self, name: &str, config: &TrackingConfig) -> Result<TrackingSession, FilterError> {
        let interval = if self.track_prices {
            config.interval_secs
        } else {
            config.alert_interval_secs
        };
        let mut session = TrackingSession::new(
            name,
            self.filter.clone(),
            Duration::from_secs(interval),
            &config.log_dir,
        )?
        .with_record_mode(self.record_mode.unwrap_or(config.record_mode))
        .with_scope(self.scope);

        if !self.track_prices {
            session = session.without_price_log();
        }
        if self.track_alerts {
            if let Some(rule) = &self.alert {
                session = session.with_alert(rule.clone());
            }
        }
        Ok(session)
    }
}

/// `tracked_items.json`: saved searches keyed by display name.
pub struct TrackedStore {
    path: PathBuf,
    items: BTreeMap<String, TrackedSearch>,
}

impl TrackedStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let items = storage::load_json_or_default(&path)?;
        Ok(Self { path, items })
    }

    pub fn save(&self) -> Result<()> {
        storage::save_json(&self.path, &self.items)
    }

    pub fn get(&self, name: &str) -> Option<&TrackedSearch> {
        self.items.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TrackedSearch)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert or replace, keeping a previously announced alert price for the same rule.
    pub fn upsert(&mut self, name: impl Into<String>, mut search: TrackedSearch) -> Result<()> {
        let name = name.into();
        if let (Some(existing), Some(rule)) = (self.items.get(&name), search.alert.as_mut()) {
            if let Some(old) = &existing.alert {
                if old.threshold_cents == rule.threshold_cents && rule.last_notified_cents.is_none() {
                    rule.last_notified_cents = old.last_notified_cents;
                }
            }
        }
        self.items.insert(name, search);
        self.save()
    }

    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let removed = self.items.remove(name).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Toggle price logging. Returns false when no such search exists.
    pub fn set_track_prices(&mut self, name: &str, enabled: bool) -> Result<bool> {
        let Some(item) = self.items.get_mut(name) else {
            return Ok(false);
        };
        item.track_prices = enabled;
        self.save()?;
        Ok(true)
    }

    pub fn set_track_alerts(&mut self, name: &str, enabled: bool) -> Result<bool> {
        let Some(item) = self.items.get_mut(name) else {
            return Ok(false);
        };
        item.track_alerts = enabled;
        self.save()?;
        Ok(true)
    }

    /// Remember the last announced price so restarts don't repeat old alerts.
    pub fn record_notified(&mut self, name: &str, price_cents: u64) -> Result<()> {
        if let Some(rule) = self.items.get_mut(name).and_then(|i| i.alert.as_mut()) {
            rule.last_notified_cents = Some(price_cents);
            self.save()?;
        }
        Ok(())
    }
}

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::events::{EventBus, TrackingEvent};
use super::observation_log::{Observation, ObservationLog};
use super::session::{ObservationScope, RecordMode, StopReason, TrackerState, TrackingSession};
use crate::api::{Listing, ListingSource};
use crate::search::lowest_listing;

/// What one scheduled poll did.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Recorded { rows: usize },
    Unchanged,
    NoListings,
    /// Alert-only session: listings were checked, nothing written.
    Checked,
    RateLimited,
    Failed(String),
    AuthRejected,
}

/// Polling loop for a single tracking session.
pub struct Tracker {
    source: Arc<dyn ListingSource>,
    session: TrackingSession,
    log: Option<ObservationLog>,
    last_batch: Vec<Observation>,
    events: EventBus,
    state: Arc<RwLock<TrackerState>>,
}

impl Tracker {
    pub fn new(
        source: Arc<dyn ListingSource>,
        session: TrackingSession,
        events: EventBus,
    ) -> Result<Self> {
        let log = if session.record_prices {
            Some(ObservationLog::open(&session.log_path).with_context(|| {
                format!("Failed to prepare tracking log for {}", session.name)
            })?)
        } else {
            None
        };
        Ok(Self {
            source,
            session,
            log,
            last_batch: Vec::new(),
            events,
            state: Arc::new(RwLock::new(TrackerState::Stopped(StopReason::Cancelled))),
        })
    }

    /// Query once and record the result. Only I/O failures on the CSV are errors;
    /// API failures are folded into the outcome.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let name = self.session.name.clone();
        let listings = match self.source.search(&self.session.filter).await {
            Ok(listings) => listings,
            Err(e) if e.is_fatal() => {
                tracing::error!("Tracking '{}': {}; stopping", name, e);
                return Ok(PollOutcome::AuthRejected);
            }
            Err(e) => {
                tracing::warn!("Tracking '{}': {}; skipping this cycle", name, e);
                self.events.publish(TrackingEvent::Skipped {
                    name,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Ok(if e.is_rate_limit() {
                    PollOutcome::RateLimited
                } else {
                    PollOutcome::Failed(e.to_string())
                });
            }
        };

        let matching: Vec<Listing> = listings
            .into_iter()
            .filter(|l| self.session.filter.matches(l))
            .collect();

        if let Some(rule) = self.session.alert.as_mut() {
            if let Some(alert) = rule.evaluate(&name, &matching) {
                tracing::warn!("Alert: {}", alert.message());
                self.events.publish(TrackingEvent::AlertTriggered {
                    name: name.clone(),
                    alert,
                });
            }
        }

        let Some(log) = self.log.as_mut() else {
            return Ok(PollOutcome::Checked);
        };

        let now = Utc::now();
        let batch: Vec<Observation> = match self.session.scope {
            ObservationScope::Lowest => lowest_listing(&matching, &self.session.filter)
                .map(|l| Observation::from_listing(l, now))
                .into_iter()
                .collect(),
            ObservationScope::AllListings => matching
                .iter()
                .filter(|l| l.price_cents.is_some())
                .map(|l| Observation::from_listing(l, now))
                .collect(),
        };

        if batch.is_empty() {
            tracing::info!("Tracking '{}': no matching listings", name);
            return Ok(PollOutcome::NoListings);
        }

        if self.session.record_mode == RecordMode::OnChange && same_batch(&batch, &self.last_batch) {
            tracing::debug!("Tracking '{}': unchanged", name);
            self.events.publish(TrackingEvent::Unchanged {
                name,
                timestamp: now,
            });
            return Ok(PollOutcome::Unchanged);
        }

        for observation in &batch {
            log.append(observation)?;
        }
        let lowest_cents = batch.iter().filter_map(|o| o.price_cents).min();
        tracing::info!("Tracked {} listings for '{}' at {}", batch.len(), name, now);
        self.events.publish(TrackingEvent::Recorded {
            name,
            rows: batch.len(),
            lowest_cents,
            timestamp: now,
        });

        let rows = batch.len();
        self.last_batch = batch;
        Ok(PollOutcome::Recorded { rows })
    }

    /// Poll every interval until cancelled or the API key is rejected.
    ///
    /// The stop flag is checked before every scheduled poll; a change on the
    /// watch channel also wakes the loop while it waits.
    pub async fn run(mut self, mut stop_rx: watch::Receiver<bool>) -> TrackerState {
        *self.state.write().await = TrackerState::Running;
        tracing::info!(
            "Starting tracking for '{}' every {:?}; output={}",
            self.session.name,
            self.session.interval,
            self.session.log_path.display()
        );
        self.events.publish(TrackingEvent::Started {
            name: self.session.name.clone(),
            timestamp: Utc::now(),
        });

        let mut interval = tokio::time::interval(self.session.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break StopReason::Cancelled;
                    }
                    continue;
                }
            }
            if *stop_rx.borrow() {
                break StopReason::Cancelled;
            }

            match self.poll_once().await {
                Ok(PollOutcome::AuthRejected) => break StopReason::AuthRejected,
                Ok(_) => {}
                Err(e) => tracing::error!("Tracking '{}' failed to record: {:#}", self.session.name, e),
            }
        };

        let final_state = TrackerState::Stopped(reason);
        *self.state.write().await = final_state;
        tracing::info!("Tracking for '{}' {}", self.session.name, final_state);
        self.events.publish(TrackingEvent::Stopped {
            name: self.session.name.clone(),
            reason,
            timestamp: Utc::now(),
        });
        final_state
    }

    /// Run on its own task and hand back a handle to observe or stop it.
    pub fn spawn(self) -> TrackingHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = self.state.clone();
        let id = self.session.id;
        let name = self.session.name.clone();
        // Running from the moment the handle exists, so callers never see a
        // stale Stopped before the task is first polled.
        if let Ok(mut guard) = state.try_write() {
            *guard = TrackerState::Running;
        }
        let task = tokio::spawn(self.run(stop_rx));
        TrackingHandle {
            id,
            name,
            stop_tx,
            state,
            task,
        }
    }
}

fn same_batch(a: &[Observation], b: &[Observation]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_values(y))
}

pub struct TrackingHandle {
    pub id: Uuid,
    pub name: String,
    stop_tx: watch::Sender<bool>,
    state: Arc<RwLock<TrackerState>>,
    task: JoinHandle<TrackerState>,
}

impl TrackingHandle {
    /// Cooperative cancellation: takes effect before the next scheduled poll.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub async fn state(&self) -> TrackerState {
        *self.state.read().await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<TrackerState> {
        self.task.await.context("Tracking task panicked")
    }
}

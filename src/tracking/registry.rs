use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::events::EventBus;
use super::session::{TrackerState, TrackingSession};
use super::tracker::{Tracker, TrackingHandle};
use crate::api::ListingSource;

/// Running tracking sessions, at most one per name.
pub struct TrackerRegistry {
    source: Arc<dyn ListingSource>,
    events: EventBus,
    sessions: Arc<RwLock<HashMap<String, TrackingHandle>>>,
}

impl TrackerRegistry {
    pub fn new(source: Arc<dyn ListingSource>, events: EventBus) -> Self {
        Self {
            source,
            events,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start polling for a session. A name that is still running is rejected;
    /// a finished one is replaced.
    pub async fn start(&self, session: TrackingSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&session.name) {
            if !existing.is_finished() {
                anyhow::bail!("Already tracking '{}'", session.name);
            }
        }

        let name = session.name.clone();
        let tracker = Tracker::new(self.source.clone(), session, self.events.clone())?;
        sessions.insert(name, tracker.spawn());
        Ok(())
    }

    /// Request a stop and wait for the session to wind down.
    pub async fn stop(&self, name: &str) -> Option<TrackerState> {
        let handle = self.sessions.write().await.remove(name)?;
        handle.stop();
        match handle.join().await {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::error!("Tracking '{}' ended abnormally: {:#}", name, e);
                None
            }
        }
    }

    pub async fn stop_all(&self) -> Vec<(String, Option<TrackerState>)> {
        let handles: Vec<(String, TrackingHandle)> = self.sessions.write().await.drain().collect();
        for (_, handle) in &handles {
            handle.stop();
        }

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let state = handle.join().await.ok();
            results.push((name, state));
        }
        results
    }

    pub async fn state(&self, name: &str) -> Option<TrackerState> {
        let sessions = self.sessions.read().await;
        match sessions.get(name) {
            Some(handle) => Some(handle.state().await),
            None => None,
        }
    }

    pub async fn running(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut names = Vec::new();
        for (name, handle) in sessions.iter() {
            if handle.state().await.is_running() {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }

    pub async fn running_count(&self) -> usize {
        self.running().await.len()
    }
}

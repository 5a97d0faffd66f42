use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::alerts::Alert;
use super::session::StopReason;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrackingEvent {
    Started {
        name: String,
        timestamp: DateTime<Utc>,
    },
    Recorded {
        name: String,
        rows: usize,
        lowest_cents: Option<u64>,
        timestamp: DateTime<Utc>,
    },
    Unchanged {
        name: String,
        timestamp: DateTime<Utc>,
    },
    Skipped {
        name: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    AlertTriggered {
        name: String,
        alert: Alert,
    },
    Stopped {
        name: String,
        reason: StopReason,
        timestamp: DateTime<Utc>,
    },
}

/// Fan-out of tracker progress to whoever displays or persists it.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TrackingEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: TrackingEvent) {
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!("Event published to {} receivers", receivers);
            }
            Err(e) => {
                // No subscribers is normal for headless sessions.
                tracing::trace!("Event dropped: {:?}", e.0);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

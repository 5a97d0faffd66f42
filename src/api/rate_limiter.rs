// Tracks request pacing against the marketplace's per-minute quota.
//
// CSFloat advertises its quota through `X-RateLimit-Limit`. We never block a
// request here; the limiter only records what was sent and tells callers that
// issue back-to-back requests (bulk lookups) how far apart to space them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Requests per minute assumed until the API tells us otherwise.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RateLimitTracker {
    limit_per_minute: Arc<RwLock<u32>>,
    request_history: Arc<RwLock<VecDeque<Instant>>>,
    rate_limit_hits: Arc<RwLock<u64>>,
    last_hit: Arc<RwLock<bool>>,
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_MINUTE)
    }
}

impl RateLimitTracker {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit_per_minute: Arc::new(RwLock::new(limit_per_minute)),
            request_history: Arc::new(RwLock::new(VecDeque::new())),
            rate_limit_hits: Arc::new(RwLock::new(0)),
            last_hit: Arc::new(RwLock::new(false)),
        }
    }

    /// Record a sent request and prune entries older than the window.
    pub async fn record_request(&self) {
        let now = Instant::now();
        let mut history = self.request_history.write().await;
        history.push_back(now);
        while let Some(front) = history.front() {
            if now.duration_since(*front) > WINDOW {
                history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Apply the advertised limit from response headers. Zero or garbage is ignored.
    pub async fn update_from_header(&self, value: Option<&str>) {
        let Some(limit) = value.and_then(|v| v.trim().parse::<u32>().ok()) else {
            return;
        };
        if limit == 0 {
            return;
        }
        let mut current = self.limit_per_minute.write().await;
        if *current != limit {
            tracing::debug!("Rate limit updated: {} -> {} req/min", *current, limit);
            *current = limit;
        }
    }

    pub async fn record_outcome(&self, rate_limited: bool) {
        *self.last_hit.write().await = rate_limited;
        if rate_limited {
            *self.rate_limit_hits.write().await += 1;
        }
    }

    /// Recommended delay between consecutive requests.
    pub async fn recommended_interval(&self) -> Duration {
        let limit = *self.limit_per_minute.read().await;
        if limit == 0 {
            return Duration::from_secs(6);
        }
        Duration::from_secs_f64(60.0 / limit as f64)
    }

    pub async fn get_stats(&self) -> RateLimitStats {
        let now = Instant::now();
        let history = self.request_history.read().await;
        RateLimitStats {
            limit_per_minute: *self.limit_per_minute.read().await,
            requests_last_minute: history
                .iter()
                .filter(|t| now.duration_since(**t) <= WINDOW)
                .count(),
            rate_limit_hits: *self.rate_limit_hits.read().await,
            last_request_limited: *self.last_hit.read().await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitStats {
    pub limit_per_minute: u32,
    pub requests_last_minute: usize,
    pub rate_limit_hits: u64,
    pub last_request_limited: bool,
}

impl RateLimitStats {
    pub fn format_status(&self) -> String {
        let status = if self.last_request_limited {
            "RATE LIMITED"
        } else {
            "ok"
        };
        format!(
            "Requests: {}/{} per min | 429s: {} | {}",
            self.requests_last_minute, self.limit_per_minute, self.rate_limit_hits, status
        )
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::{Duration, Instant};

use super::error::ApiError;
use super::rate_limiter::RateLimitTracker;
use super::types::{Listing, ListingsResponse};
use crate::core::Config;
use crate::search::{lowest_listing, Filter, SortBy};

const LISTINGS_ENDPOINT: &str = "/api/v1/listings";
const LOGGED_BODY_CHARS: usize = 200;

/// Anything that can answer a listings search. The tracker only needs this.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn search(&self, filter: &Filter) -> Result<Vec<Listing>, ApiError>;
}

pub struct CsFloatClient {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limits: RateLimitTracker,
}

/// Outcome of one item in a bulk lookup.
#[derive(Debug)]
pub struct BulkEntry {
    pub filter: Filter,
    pub result: Result<Option<Listing>, ApiError>,
}

impl CsFloatClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            rate_limits: RateLimitTracker::default(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let key = config
            .api_key()
            .context("No API key configured; run `csfloat key set <KEY>`")?;
        Self::new(key, config.base_url.clone(), config.request_timeout())
    }

    pub fn rate_limits(&self) -> &RateLimitTracker {
        &self.rate_limits
    }

    /// One listings request. No retries: the caller decides whether to poll again.
    pub async fn search(&self, filter: &Filter) -> Result<Vec<Listing>, ApiError> {
        filter.validate()?;

        let url = format!("{}{}", self.base_url, LISTINGS_ENDPOINT);
        let params = filter.query_params();
        tracing::info!("Request params: {:?}", params);

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, &self.api_key)
            .query(&params)
            .send()
            .await;
        self.rate_limits.record_request().await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("Failed to query API: {}", e);
                return Err(ApiError::Network(e));
            }
        };

        let status = response.status();
        self.rate_limits
            .update_from_header(
                response
                    .headers()
                    .get("X-RateLimit-Limit")
                    .and_then(|v| v.to_str().ok()),
            )
            .await;
        self.rate_limits
            .record_outcome(status == StatusCode::TOO_MANY_REQUESTS)
            .await;
        tracing::info!("Response status: {}", status);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::error!("API key rejected ({})", status);
                return Err(ApiError::Auth {
                    status: status.as_u16(),
                });
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                tracing::warn!("Rate limit hit (retry after: {:?})", retry_after);
                return Err(ApiError::RateLimit { retry_after });
            }
            _ => {}
        }

        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!("CSFloat API error: {} - {}", status, truncate(&body));
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: truncate(&body).to_string(),
            });
        }
        tracing::debug!("Response body: {}", truncate(&body));

        let parsed: ListingsResponse = serde_json::from_str(&body)?;
        let listings: Vec<Listing> = parsed.into_listings().into_iter().map(Listing::from).collect();
        tracing::info!("Received {} listings", listings.len());
        Ok(listings)
    }

    /// Cheapest listing matching the filter after client-side auction and float checks.
    pub async fn fetch_lowest(&self, filter: &Filter) -> Result<Option<Listing>, ApiError> {
        let listings = self.search(filter).await?;
        Ok(lowest_listing(&listings, filter).cloned())
    }

    /// Lowest price for each filter, spaced out to respect the advertised rate limit.
    /// A rejected API key aborts the remaining lookups.
    pub async fn bulk_lowest(&self, filters: &[Filter]) -> Vec<BulkEntry> {
        let mut results = Vec::with_capacity(filters.len());

        for (idx, base) in filters.iter().enumerate() {
            let filter = Filter {
                limit: 1,
                sort_by: Some(SortBy::LowestPrice),
                ..base.clone()
            };
            let start = Instant::now();
            let result = self.fetch_lowest(&filter).await;
            let fatal = matches!(&result, Err(e) if e.is_fatal());
            results.push(BulkEntry { filter, result });
            if fatal {
                tracing::error!("Bulk lookup aborted after {} of {} items", idx + 1, filters.len());
                break;
            }

            if idx + 1 < filters.len() {
                let interval = self.rate_limits.recommended_interval().await;
                let elapsed = start.elapsed();
                if interval > elapsed {
                    tokio::time::sleep(interval - elapsed).await;
                }
            }
        }

        results
    }
}

#[async_trait]
impl ListingSource for CsFloatClient {
    async fn search(&self, filter: &Filter) -> Result<Vec<Listing>, ApiError> {
        CsFloatClient::search(self, filter).await
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(LOGGED_BODY_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(url: String) -> CsFloatClient {
        CsFloatClient::new("test-key", url, Duration::from_secs(5)).unwrap()
    }

    const BODY: &str = r#"{"data": [
        {"id": "1", "price": 2500, "type": "auction", "item": {"market_hash_name": "AK-47 | Redline (Field-Tested)", "float_value": 0.20}},
        {"id": "2", "price": 3100, "type": "buy_now", "item": {"market_hash_name": "AK-47 | Redline (Field-Tested)", "float_value": 0.18}},
        {"id": "3", "price": 2900, "type": "buy_now", "item": {"market_hash_name": "AK-47 | Redline (Field-Tested)", "float_value": 0.35}}
    ]}"#;

    #[tokio::test]
    async fn test_search_sends_key_and_params() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/listings")
            .match_header("authorization", "test-key")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("market_hash_name".into(), "AK-47 | Redline (Field-Tested)".into()),
                Matcher::UrlEncoded("type".into(), "buy_now".into()),
                Matcher::UrlEncoded("limit".into(), "50".into()),
            ]))
            .with_status(200)
            .with_header("X-RateLimit-Limit", "120")
            .with_body(BODY)
            .create_async()
            .await;

        let client = client(server.url());
        let filter = Filter {
            include_auctions: false,
            ..Filter::for_item("AK-47 | Redline (Field-Tested)")
        };
        let listings = client.search(&filter).await.unwrap();

        mock.assert_async().await;
        assert_eq!(listings.len(), 3);
        assert_eq!(
            client.rate_limits().recommended_interval().await,
            Duration::from_millis(500)
        );
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut server = mockito::Server::new_async().await;
        let _unauth = server
            .mock("GET", "/api/v1/listings")
            .match_query(Matcher::UrlEncoded("market_hash_name".into(), "a".into()))
            .with_status(401)
            .create_async()
            .await;
        let _limited = server
            .mock("GET", "/api/v1/listings")
            .match_query(Matcher::UrlEncoded("market_hash_name".into(), "b".into()))
            .with_status(429)
            .with_header("Retry-After", "15")
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/api/v1/listings")
            .match_query(Matcher::UrlEncoded("market_hash_name".into(), "c".into()))
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;

        let client = client(server.url());
        let auth = client.search(&Filter::for_item("a")).await.unwrap_err();
        assert!(matches!(auth, ApiError::Auth { status: 401 }));

        let limited = client.search(&Filter::for_item("b")).await.unwrap_err();
        assert!(matches!(
            limited,
            ApiError::RateLimit { retry_after: Some(d) } if d == Duration::from_secs(15)
        ));
        assert_eq!(client.rate_limits().get_stats().await.rate_limit_hits, 1);

        let broken = client.search(&Filter::for_item("c")).await.unwrap_err();
        assert!(matches!(broken, ApiError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_invalid_filter_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let filter = Filter {
            min_float: Some(0.9),
            max_float: Some(0.1),
            ..Filter::for_item("AWP | Asiimov (Field-Tested)")
        };
        let err = client(server.url()).search(&filter).await.unwrap_err();

        assert!(matches!(err, ApiError::InvalidFilter(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_lowest_filters_locally() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/listings")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let client = client(server.url());
        let filter = Filter {
            include_auctions: false,
            max_float: Some(0.3),
            ..Filter::for_item("AK-47 | Redline (Field-Tested)")
        };
        let lowest = client.fetch_lowest(&filter).await.unwrap().unwrap();
        assert_eq!(lowest.id, "2");
        assert_eq!(lowest.price_display(), "$31.00");
    }

    #[tokio::test]
    async fn test_garbage_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v1/listings")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = client(server.url())
            .search(&Filter::for_item("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_bulk_stops_on_rejected_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/listings")
            .match_query(Matcher::Any)
            .with_status(403)
            .expect(1)
            .create_async()
            .await;

        let filters = vec![Filter::for_item("a"), Filter::for_item("b")];
        let results = client(server.url()).bulk_lowest(&filters).await;

        mock.assert_async().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].filter.limit, 1);
        assert!(matches!(results[0].result, Err(ApiError::Auth { status: 403 })));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(300);
        assert_eq!(truncate(&long).chars().count(), LOGGED_BODY_CHARS);
        assert_eq!(truncate("short"), "short");
    }
}

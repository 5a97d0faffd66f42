pub mod client;
pub mod error;
pub mod rate_limiter;
pub mod types;

pub use client::{BulkEntry, CsFloatClient, ListingSource};
pub use error::ApiError;
pub use rate_limiter::RateLimitTracker;
pub use types::*;

#[cfg(test)]
pub use client::MockListingSource;

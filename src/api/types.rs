use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LISTING_URL_BASE: &str = "https://csfloat.com/item";

/// The listings endpoint answers either with a bare array or wrapped in `data`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListingsResponse {
    Wrapped { data: Vec<RawListing> },
    Bare(Vec<RawListing>),
}

impl ListingsResponse {
    pub fn into_listings(self) -> Vec<RawListing> {
        match self {
            ListingsResponse::Wrapped { data } => data,
            ListingsResponse::Bare(data) => data,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawListing {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub item: Option<RawItem>,
    #[serde(default)]
    pub float: Option<RawFloat>,
    #[serde(default)]
    pub is_auction: Option<bool>,
    #[serde(default)]
    pub auction: Option<Value>,
    #[serde(default)]
    pub listing_type: Option<String>,
    #[serde(default)]
    pub sale_type: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub time_remaining: Option<Value>,
    #[serde(default)]
    pub auction_ends_in: Option<Value>,
    #[serde(default)]
    pub auction_ends_at: Option<Value>,
    #[serde(default)]
    pub expires_at: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawItem {
    #[serde(default)]
    pub market_hash_name: Option<String>,
    #[serde(default)]
    pub wear_name: Option<String>,
    #[serde(default)]
    pub float_value: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFloat {
    #[serde(default)]
    pub float_value: Option<f64>,
}

/// Immutable snapshot of one listing returned by the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub name: String,
    pub price_cents: Option<u64>,
    pub float_value: Option<f64>,
    pub wear: Option<String>,
    pub is_auction: bool,
    pub time_left: Option<String>,
    pub url: String,
}

impl Listing {
    pub fn price_display(&self) -> String {
        match self.price_cents {
            Some(cents) => format_price(cents),
            None => "N/A".to_string(),
        }
    }
}

impl From<RawListing> for Listing {
    fn from(raw: RawListing) -> Self {
        let id = raw.id.as_ref().map(value_text).unwrap_or_default();
        let is_auction = raw.is_auction.unwrap_or(false)
            || matches!(raw.auction, Some(Value::Bool(true)))
            || [&raw.listing_type, &raw.sale_type, &raw.kind]
                .iter()
                .any(|t| t.as_deref() == Some("auction"));
        let time_left = [
            &raw.time_remaining,
            &raw.auction_ends_in,
            &raw.auction_ends_at,
            &raw.expires_at,
        ]
        .into_iter()
        .flatten()
        .filter(|v| !v.is_null())
        .map(value_text)
        .find(|s| !s.is_empty());

        let float_value = raw
            .float
            .as_ref()
            .and_then(|f| f.float_value)
            .or_else(|| raw.item.as_ref().and_then(|i| i.float_value));

        let item = raw.item.unwrap_or_default();
        let url = if id.is_empty() {
            String::new()
        } else {
            format!("{}/{}", LISTING_URL_BASE, id)
        };

        Self {
            price_cents: raw.price.as_ref().and_then(price_cents),
            name: item.market_hash_name.unwrap_or_default(),
            wear: item.wear_name,
            float_value,
            is_auction,
            time_left,
            url,
            id,
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn price_cents(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        _ => None,
    }
}

/// Integer cents rendered as dollars with exactly two decimals.
pub fn format_price(cents: u64) -> String {
    format!("${}", format_dollars(cents))
}

/// Same as [`format_price`] without the currency sign, as written to CSV.
pub fn format_dollars(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

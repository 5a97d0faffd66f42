use serde::{Deserialize, Serialize};

use crate::api::{format_price, Listing};
use crate::search::FilterError;

/// Price/float condition that raises an alert for a tracked search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub threshold_cents: u64,
    #[serde(default)]
    pub float_min: f64,
    #[serde(default = "default_float_max")]
    pub float_max: f64,
    /// Cheapest price already announced; only strictly cheaper matches alert again.
    #[serde(default)]
    pub last_notified_cents: Option<u64>,
}

fn default_float_max() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub search: String,
    pub listing: Listing,
    pub price_cents: u64,
    pub float_value: f64,
}

impl Alert {
    pub fn message(&self) -> String {
        format!(
            "{} found for {} with float {:.4}",
            self.search,
            format_price(self.price_cents),
            self.float_value
        )
    }
}

impl AlertRule {
    pub fn new(threshold_cents: u64) -> Self {
        Self {
            threshold_cents,
            float_min: 0.0,
            float_max: default_float_max(),
            last_notified_cents: None,
        }
    }

    pub fn with_float_band(mut self, min: f64, max: f64) -> Self {
        self.float_min = min;
        self.float_max = max;
        self
    }

    /// Same bounds as a search filter's float range.
    pub fn validate(&self) -> Result<(), FilterError> {
        for bound in [self.float_min, self.float_max] {
            if !(0.0..=1.0).contains(&bound) {
                return Err(FilterError::FloatOutOfBounds(bound));
            }
        }
        if self.float_min > self.float_max {
            return Err(FilterError::InvertedFloatRange {
                min: self.float_min,
                max: self.float_max,
            });
        }
        Ok(())
    }

    /// Listing qualifies when priced at or under the threshold with a float in band.
    /// Listings missing either value never qualify.
    pub fn matches(&self, listing: &Listing) -> bool {
        match (listing.price_cents, listing.float_value) {
            (Some(price), Some(float)) => {
                price <= self.threshold_cents && (self.float_min..=self.float_max).contains(&float)
            }
            _ => false,
        }
    }

    /// Check a poll's listings. Returns an alert for the cheapest qualifying listing
    /// when it beats the last announced price, and remembers that price.
    pub fn evaluate(&mut self, search: &str, listings: &[Listing]) -> Option<Alert> {
        let best = listings
            .iter()
            .filter(|l| self.matches(l))
            .min_by_key(|l| l.price_cents)?;
        let price = best.price_cents?;
        let float = best.float_value?;

        if self.last_notified_cents.is_some_and(|last| price >= last) {
            return None;
        }
        self.last_notified_cents = Some(price);
        Some(Alert {
            search: search.to_string(),
            listing: best.clone(),
            price_cents: price,
            float_value: float,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, price: u64, float: f64) -> Listing {
        Listing {
            id: id.into(),
            name: "Butterfly Knife | Fade (Factory New)".into(),
            price_cents: Some(price),
            float_value: Some(float),
            wear: None,
            is_auction: false,
            time_left: None,
            url: String::new(),
        }
    }

    #[test]
    fn test_first_match_alerts_then_only_cheaper() {
        let mut rule = AlertRule::new(50_000).with_float_band(0.0, 0.02);

        let first = rule
            .evaluate("Fade", &[listing("a", 48_000, 0.01), listing("b", 45_000, 0.05)])
            .unwrap();
        assert_eq!(first.listing.id, "a");
        assert_eq!(rule.last_notified_cents, Some(48_000));

        assert!(rule.evaluate("Fade", &[listing("a", 48_000, 0.01)]).is_none());
        assert!(rule.evaluate("Fade", &[listing("c", 49_000, 0.01)]).is_none());

        let cheaper = rule.evaluate("Fade", &[listing("d", 47_500, 0.015)]).unwrap();
        assert_eq!(cheaper.price_cents, 47_500);
    }

    #[test]
    fn test_float_band_validation() {
        assert!(AlertRule::new(1_000).validate().is_ok());
        assert!(AlertRule::new(1_000).with_float_band(0.0, 0.07).validate().is_ok());
        assert_eq!(
            AlertRule::new(1_000).with_float_band(0.3, 0.1).validate(),
            Err(FilterError::InvertedFloatRange { min: 0.3, max: 0.1 })
        );
        assert_eq!(
            AlertRule::new(1_000).with_float_band(0.0, 1.5).validate(),
            Err(FilterError::FloatOutOfBounds(1.5))
        );
        assert_eq!(
            AlertRule::new(1_000).with_float_band(-0.1, 0.5).validate(),
            Err(FilterError::FloatOutOfBounds(-0.1))
        );
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut rule = AlertRule::new(1_000);
        assert!(rule.evaluate("x", &[listing("a", 1_001, 0.5)]).is_none());
        assert!(rule.evaluate("x", &[listing("b", 1_000, 0.5)]).is_some());
    }

    #[test]
    fn test_unknown_float_never_matches() {
        let rule = AlertRule::new(10_000);
        let mut l = listing("a", 100, 0.1);
        l.float_value = None;
        assert!(!rule.matches(&l));
    }

    #[test]
    fn test_message() {
        let mut rule = AlertRule::new(10_000);
        let alert = rule.evaluate("AK-47 | Redline (FT)", &[listing("a", 1234, 0.25)]).unwrap();
        assert_eq!(alert.message(), "AK-47 | Redline (FT) found for $12.34 with float 0.2500");
    }
}

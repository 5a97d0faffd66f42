use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::api::Listing;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("min float {min} is greater than max float {max}")]
    InvertedFloatRange { min: f64, max: f64 },
    #[error("float {0} is outside 0.0..=1.0")]
    FloatOutOfBounds(f64),
    #[error("{0} items have no wear")]
    WearNotApplicable(ItemType),
    #[error("float range {min:.2}-{max:.2} does not overlap {wear} ({band_min:.2}-{band_max:.2})")]
    RangeOutsideWear {
        wear: Wear,
        min: f64,
        max: f64,
        band_min: f64,
        band_max: f64,
    },
    #[error("limit must be between 1 and 50, got {0}")]
    InvalidLimit(u32),
    #[error("unknown {kind}: {value}")]
    Unknown { kind: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ItemType {
    #[default]
    Skin,
    Glove,
    Case,
    Sticker,
    Key,
    Other,
}

impl ItemType {
    pub fn has_wear(self) -> bool {
        matches!(self, ItemType::Skin | ItemType::Glove)
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemType::Skin => "Skin",
            ItemType::Glove => "Glove",
            ItemType::Case => "Case",
            ItemType::Sticker => "Sticker",
            ItemType::Key => "Key",
            ItemType::Other => "Other",
        };
        f.write_str(s)
    }
}

impl FromStr for ItemType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skin" => Ok(ItemType::Skin),
            "glove" | "gloves" => Ok(ItemType::Glove),
            "case" => Ok(ItemType::Case),
            "sticker" => Ok(ItemType::Sticker),
            "key" => Ok(ItemType::Key),
            "other" => Ok(ItemType::Other),
            _ => Err(FilterError::Unknown {
                kind: "item type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Wear {
    FN,
    MW,
    FT,
    WW,
    BS,
}

impl Wear {
    /// Float band covered by this wear tier.
    pub fn float_range(self) -> (f64, f64) {
        match self {
            Wear::FN => (0.0, 0.07),
            Wear::MW => (0.07, 0.15),
            Wear::FT => (0.15, 0.38),
            Wear::WW => (0.38, 0.45),
            Wear::BS => (0.45, 1.0),
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Wear::FN => "FN",
            Wear::MW => "MW",
            Wear::FT => "FT",
            Wear::WW => "WW",
            Wear::BS => "BS",
        }
    }
}

impl fmt::Display for Wear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Wear {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace(['-', ' '], "").as_str() {
            "FN" | "FACTORYNEW" => Ok(Wear::FN),
            "MW" | "MINIMALWEAR" => Ok(Wear::MW),
            "FT" | "FIELDTESTED" => Ok(Wear::FT),
            "WW" | "WELLWORN" => Ok(Wear::WW),
            "BS" | "BATTLESCARRED" => Ok(Wear::BS),
            _ => Err(FilterError::Unknown {
                kind: "wear",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Normal,
    StatTrak,
    Souvenir,
}

impl Category {
    /// Numeric code the listings endpoint expects.
    pub fn code(self) -> u8 {
        match self {
            Category::Normal => 1,
            Category::StatTrak => 2,
            Category::Souvenir => 3,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Normal => "Normal",
            Category::StatTrak => "StatTrak",
            Category::Souvenir => "Souvenir",
        };
        f.write_str(s)
    }
}

impl FromStr for Category {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "normal" => Ok(Category::Normal),
            "2" | "stattrak" => Ok(Category::StatTrak),
            "3" | "souvenir" => Ok(Category::Souvenir),
            _ => Err(FilterError::Unknown {
                kind: "category",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    MostRecent,
    LowestPrice,
    LowestFloat,
}

impl SortBy {
    pub fn as_param(self) -> &'static str {
        match self {
            SortBy::MostRecent => "most_recent",
            SortBy::LowestPrice => "lowest_price",
            SortBy::LowestFloat => "lowest_float",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

impl FromStr for SortBy {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "most_recent" => Ok(SortBy::MostRecent),
            "lowest_price" => Ok(SortBy::LowestPrice),
            "lowest_float" => Ok(SortBy::LowestFloat),
            _ => Err(FilterError::Unknown {
                kind: "sort order",
                value: s.to_string(),
            }),
        }
    }
}

/// User-supplied search constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub market_hash_name: Option<String>,
    #[serde(default)]
    pub item_type: ItemType,
    #[serde(default)]
    pub wear: Option<Wear>,
    #[serde(default)]
    pub min_float: Option<f64>,
    #[serde(default)]
    pub max_float: Option<f64>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub sort_by: Option<SortBy>,
    #[serde(default = "default_include_auctions")]
    pub include_auctions: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_include_auctions() -> bool {
    true
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            market_hash_name: None,
            item_type: ItemType::default(),
            wear: None,
            min_float: None,
            max_float: None,
            category: None,
            sort_by: None,
            include_auctions: true,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Filter {
    pub fn for_item(name: impl Into<String>) -> Self {
        Self {
            market_hash_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        for bound in [self.min_float, self.max_float].into_iter().flatten() {
            if !(0.0..=1.0).contains(&bound) {
                return Err(FilterError::FloatOutOfBounds(bound));
            }
        }
        if let (Some(min), Some(max)) = (self.min_float, self.max_float) {
            if min > max {
                return Err(FilterError::InvertedFloatRange { min, max });
            }
        }
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(FilterError::InvalidLimit(self.limit));
        }
        if let Some(wear) = self.wear {
            if !self.item_type.has_wear() {
                return Err(FilterError::WearNotApplicable(self.item_type));
            }
            let (band_min, band_max) = wear.float_range();
            let min = self.min_float.unwrap_or(0.0);
            let max = self.max_float.unwrap_or(1.0);
            if min > band_max || max < band_min {
                return Err(FilterError::RangeOutsideWear {
                    wear,
                    min,
                    max,
                    band_min,
                    band_max,
                });
            }
        }
        Ok(())
    }

    /// Query string pairs for the listings endpoint.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(name) = &self.market_hash_name {
            params.push(("market_hash_name", name.clone()));
        }
        if let Some(wear) = self.wear {
            params.push(("wear", wear.code().to_string()));
        }
        if let Some(min) = self.min_float {
            params.push(("min_float", min.to_string()));
        }
        if let Some(max) = self.max_float {
            params.push(("max_float", max.to_string()));
        }
        if let Some(category) = self.category {
            params.push(("category", category.code().to_string()));
        }
        if let Some(sort) = self.sort_by {
            params.push(("sort_by", sort.as_param().to_string()));
        }
        if !self.include_auctions {
            params.push(("type", "buy_now".to_string()));
        }
        params.push(("limit", self.limit.to_string()));
        params
    }

    /// Client-side check applied on top of what the endpoint returned.
    pub fn matches(&self, listing: &Listing) -> bool {
        if !self.include_auctions && listing.is_auction {
            return false;
        }
        if let Some(min) = self.min_float {
            match listing.float_value {
                Some(f) if f >= min => {}
                _ => return false,
            }
        }
        if let Some(max) = self.max_float {
            match listing.float_value {
                Some(f) if f <= max => {}
                _ => return false,
            }
        }
        true
    }

    /// Short human label, e.g. `AK-47 | Redline (FT)`.
    pub fn display_key(&self) -> String {
        let name = self.market_hash_name.as_deref().unwrap_or("Unknown");
        match self.wear {
            Some(wear) => format!("{} ({})", name, wear),
            None => name.to_string(),
        }
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(wear) = self.wear {
            parts.push(format!("Wear {}", wear));
        }
        if self.min_float.is_some() || self.max_float.is_some() {
            let fmt_bound = |b: Option<f64>| b.map(|v| v.to_string()).unwrap_or_default();
            parts.push(format!("{}-{}", fmt_bound(self.min_float), fmt_bound(self.max_float)));
        }
        if let Some(category) = self.category {
            parts.push(format!("Category {}", category));
        }
        if let Some(sort) = self.sort_by {
            parts.push(format!("Sort {}", sort));
        }
        parts.push(if self.include_auctions { "Auctions" } else { "No Auction" }.to_string());
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(price: u64, float: Option<f64>, auction: bool) -> Listing {
        Listing {
            id: "1".into(),
            name: "Test".into(),
            price_cents: Some(price),
            float_value: float,
            wear: None,
            is_auction: auction,
            time_left: None,
            url: String::new(),
        }
    }

    #[test]
    fn test_inverted_float_range_rejected() {
        let filter = Filter {
            min_float: Some(0.5),
            max_float: Some(0.1),
            ..Filter::for_item("AWP | Asiimov (Field-Tested)")
        };
        assert_eq!(
            filter.validate(),
            Err(FilterError::InvertedFloatRange { min: 0.5, max: 0.1 })
        );
    }

    #[test]
    fn test_equal_bounds_allowed() {
        let filter = Filter {
            min_float: Some(0.2),
            max_float: Some(0.2),
            ..Default::default()
        };
        assert!(filter.validate().is_ok());
    }

    #[test]
    fn test_out_of_bounds_and_limit() {
        let filter = Filter {
            max_float: Some(1.5),
            ..Default::default()
        };
        assert_eq!(filter.validate(), Err(FilterError::FloatOutOfBounds(1.5)));

        let filter = Filter {
            limit: 0,
            ..Default::default()
        };
        assert_eq!(filter.validate(), Err(FilterError::InvalidLimit(0)));
    }

    #[test]
    fn test_wear_rules() {
        let sticker = Filter {
            item_type: ItemType::Sticker,
            wear: Some(Wear::FN),
            ..Default::default()
        };
        assert_eq!(
            sticker.validate(),
            Err(FilterError::WearNotApplicable(ItemType::Sticker))
        );

        let disjoint = Filter {
            wear: Some(Wear::FN),
            min_float: Some(0.3),
            ..Default::default()
        };
        assert!(matches!(
            disjoint.validate(),
            Err(FilterError::RangeOutsideWear { wear: Wear::FN, .. })
        ));
    }

    #[test]
    fn test_query_params_exclude_auctions() {
        let filter = Filter {
            wear: Some(Wear::MW),
            category: Some(Category::StatTrak),
            sort_by: Some(SortBy::LowestPrice),
            include_auctions: false,
            ..Filter::for_item("M4A4 | Howl (Minimal Wear)")
        };
        let params = filter.query_params();
        assert!(params.contains(&("type", "buy_now".to_string())));
        assert!(params.contains(&("category", "2".to_string())));
        assert!(params.contains(&("sort_by", "lowest_price".to_string())));
        assert!(params.contains(&("wear", "MW".to_string())));
        assert!(params.contains(&("limit", "50".to_string())));
    }

    #[test]
    fn test_matches_applies_auction_and_float() {
        let filter = Filter {
            include_auctions: false,
            min_float: Some(0.1),
            max_float: Some(0.2),
            ..Default::default()
        };
        assert!(filter.matches(&listing(100, Some(0.15), false)));
        assert!(!filter.matches(&listing(100, Some(0.15), true)));
        assert!(!filter.matches(&listing(100, Some(0.25), false)));
        assert!(!filter.matches(&listing(100, None, false)));
    }

    #[test]
    fn test_parse_wear_names() {
        assert_eq!("Field-Tested".parse::<Wear>().unwrap(), Wear::FT);
        assert_eq!("bs".parse::<Wear>().unwrap(), Wear::BS);
        assert!("XX".parse::<Wear>().is_err());
    }

    #[test]
    fn test_describe() {
        let filter = Filter {
            wear: Some(Wear::FT),
            min_float: Some(0.15),
            include_auctions: false,
            ..Filter::for_item("AK-47 | Redline (Field-Tested)")
        };
        assert_eq!(filter.describe(), "Wear FT | 0.15- | No Auction");
        assert_eq!(filter.display_key(), "AK-47 | Redline (Field-Tested) (FT)");
    }
}

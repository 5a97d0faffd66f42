use crate::api::{format_price, BulkEntry, Listing};
use crate::search::selection::{page, page_count};
use crate::tracking::{StopReason, TrackedSearch, TrackingEvent};

pub const PAGE_SIZE: usize = 10;

pub fn listing_line(listing: &Listing) -> String {
    let float = listing
        .float_value
        .map(|f| f.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let mut sale = if listing.is_auction {
        "Auction".to_string()
    } else {
        "Buy now".to_string()
    };
    if let Some(left) = &listing.time_left {
        sale.push_str(&format!(" (time left: {})", left));
    }
    let url = if listing.url.is_empty() {
        "N/A"
    } else {
        listing.url.as_str()
    };
    format!(
        "{} | {} | float={} | price={} | {} | {}",
        listing.name,
        listing.wear.as_deref().unwrap_or("-"),
        float,
        listing.price_display(),
        sale,
        url
    )
}

/// Rendered page of results, zero-based `page_index`.
pub fn results_page(listings: &[Listing], page_index: usize) -> String {
    if listings.is_empty() {
        return "No listings found".to_string();
    }
    let total = listings.len();
    let pages = page_count(total, PAGE_SIZE);
    let page_index = page_index.min(pages - 1);
    let start = page_index * PAGE_SIZE;
    let shown = page(listings, page_index, PAGE_SIZE);

    let mut out = format!(
        "Showing results {}-{} of {}:\n",
        start + 1,
        start + shown.len(),
        total
    );
    for listing in shown {
        out.push_str(&listing_line(listing));
        out.push('\n');
    }
    out.push_str(&format!("Page {}/{}", page_index + 1, pages));
    out
}

pub fn bulk_line(entry: &BulkEntry) -> String {
    let name = entry.filter.display_key();
    match &entry.result {
        Ok(Some(listing)) => format!(
            "{} | {} | float={} | {}",
            name,
            listing.price_display(),
            listing
                .float_value
                .map(|f| f.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            listing.url
        ),
        Ok(None) => format!("{} | no listings", name),
        Err(e) => format!("{} | error: {}", name, e),
    }
}

pub fn tracked_line(name: &str, search: &TrackedSearch) -> String {
    let mut flags = vec![
        if search.track_prices { "prices on" } else { "prices off" },
        if search.track_alerts { "alerts on" } else { "alerts off" },
    ];
    if !search.is_active() {
        flags.push("inactive");
    }
    let alert = match &search.alert {
        Some(rule) => format!(
            " | alert <= {} float {}-{}{}",
            format_price(rule.threshold_cents),
            rule.float_min,
            rule.float_max,
            rule.last_notified_cents
                .map(|c| format!(" (last {})", format_price(c)))
                .unwrap_or_default()
        ),
        None => String::new(),
    };
    format!("{} ({}) [{}]{}", name, search.filter.describe(), flags.join(", "), alert)
}

pub fn event_line(event: &TrackingEvent) -> String {
    match event {
        TrackingEvent::Started { name, timestamp } => {
            format!("{} started tracking {}", timestamp.format("%H:%M:%S"), name)
        }
        TrackingEvent::Recorded {
            name,
            rows,
            lowest_cents,
            timestamp,
        } => format!(
            "{} {}: recorded {} row(s), lowest {}",
            timestamp.format("%H:%M:%S"),
            name,
            rows,
            lowest_cents.map(format_price).unwrap_or_else(|| "N/A".to_string())
        ),
        TrackingEvent::Unchanged { name, timestamp } => {
            format!("{} {}: unchanged", timestamp.format("%H:%M:%S"), name)
        }
        TrackingEvent::Skipped {
            name,
            reason,
            timestamp,
        } => format!("{} {}: skipped ({})", timestamp.format("%H:%M:%S"), name, reason),
        TrackingEvent::AlertTriggered { alert, .. } => {
            format!("Skin Alert! {} {}", alert.message(), alert.listing.url)
        }
        TrackingEvent::Stopped {
            name,
            reason,
            timestamp,
        } => {
            let why = match reason {
                StopReason::Cancelled => "stopped",
                StopReason::AuthRejected => "stopped: API key rejected, set a new one with `csfloat key set`",
            };
            format!("{} {}: {}", timestamp.format("%H:%M:%S"), name, why)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(i: usize) -> Listing {
        Listing {
            id: i.to_string(),
            name: "USP-S | Kill Confirmed (Minimal Wear)".into(),
            price_cents: Some(4_205),
            float_value: Some(0.1),
            wear: Some("Minimal Wear".into()),
            is_auction: i % 2 == 1,
            time_left: (i % 2 == 1).then(|| "2h".to_string()),
            url: format!("https://csfloat.com/item/{}", i),
        }
    }

    #[test]
    fn test_listing_line() {
        assert_eq!(
            listing_line(&listing(0)),
            "USP-S | Kill Confirmed (Minimal Wear) | Minimal Wear | float=0.1 | price=$42.05 | Buy now | https://csfloat.com/item/0"
        );
        assert!(listing_line(&listing(1)).contains("Auction (time left: 2h)"));
    }

    #[test]
    fn test_results_page_bounds() {
        let listings: Vec<Listing> = (0..12).map(listing).collect();
        let first = results_page(&listings, 0);
        assert!(first.starts_with("Showing results 1-10 of 12:"));
        assert!(first.ends_with("Page 1/2"));

        let clamped = results_page(&listings, 9);
        assert!(clamped.starts_with("Showing results 11-12 of 12:"));
        assert_eq!(results_page(&[], 0), "No listings found");
    }

    #[test]
    fn test_tracked_line_marks_inactive() {
        let search = TrackedSearch {
            track_prices: false,
            ..TrackedSearch::new(crate::search::Filter::for_item("Fade"))
        };
        let line = tracked_line("Fade", &search);
        assert!(line.contains("prices off, alerts off, inactive"));
    }
}

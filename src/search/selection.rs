use crate::api::Listing;

use super::Filter;

/// Cheapest listing that passes the filter's client-side checks.
///
/// Listings without a price are never candidates. Ties keep the first listing
/// in response order.
pub fn lowest_listing<'a>(listings: &'a [Listing], filter: &Filter) -> Option<&'a Listing> {
    listings
        .iter()
        .filter(|l| l.price_cents.is_some() && filter.matches(l))
        .fold(None, |best: Option<&Listing>, l| match best {
            Some(b) if b.price_cents <= l.price_cents => Some(b),
            _ => Some(l),
        })
}

/// One page of results. Pages are zero-based; out-of-range pages are empty.
pub fn page<T>(items: &[T], page: usize, page_size: usize) -> &[T] {
    if page_size == 0 {
        return &[];
    }
    let start = page.saturating_mul(page_size);
    if start >= items.len() {
        return &[];
    }
    let end = (start + page_size).min(items.len());
    &items[start..end]
}

pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

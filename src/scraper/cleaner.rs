use crate::errors::CrawlError;
use crate::models::{listing_identity, ListingRecord, RawOffer};
use std::collections::HashSet;
use tracing::trace;
use url::Url;

pub const PLACEHOLDER_TITLE: &str = "Nekretnina";
pub const PRICE_BY_AGREEMENT: &str = "Po dogovoru";
const CURRENCY_SUFFIX: &str = "€";

// ── Field cleaners ────────────────────────────────────────────────────────────

/// Resolve a link against the site origin. Only http(s) results count.
/// "/me/oglas/7" → "https://estitor.com/me/oglas/7"
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

/// "125000" → "125000 €" | "89000.00" → "89000 €" | "89000,50" → "89000,50 €"
pub fn format_price(raw: &str) -> String {
    let raw = raw.trim();
    let whole = raw
        .strip_suffix(".00")
        .or_else(|| raw.strip_suffix(",00"))
        .unwrap_or(raw);
    format!("{} {}", whole, CURRENCY_SUFFIX)
}

// ── RawOffer → ListingRecord ──────────────────────────────────────────────────

/// Apply per-field defaults. Only a missing or unresolvable listing link
/// rejects the block, since identity derives from it.
pub fn offer_to_record(
    index: usize,
    raw: RawOffer,
    base: &Url,
    default_location: &str,
) -> Result<ListingRecord, CrawlError> {
    let href = raw.url.as_deref().ok_or_else(|| CrawlError::BlockParse {
        index,
        reason: "no listing url".to_string(),
    })?;
    let url = resolve_url(base, href).ok_or_else(|| CrawlError::BlockParse {
        index,
        reason: format!("unresolvable listing url {:?}", href),
    })?;

    for (field, missing) in [
        ("title", raw.title.is_none()),
        ("price", raw.price.is_none()),
        ("location", raw.location.is_none()),
        ("seller", raw.seller.is_none()),
    ] {
        if missing {
            trace!("offer {}: no {}, using default", index, field);
        }
    }

    Ok(ListingRecord {
        identity: listing_identity(&url),
        title: raw.title.unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
        price: raw
            .price
            .as_deref()
            .map(format_price)
            .unwrap_or_else(|| PRICE_BY_AGREEMENT.to_string()),
        location: raw.location.unwrap_or_else(|| default_location.to_string()),
        image_url: raw.image_url.as_deref().and_then(|i| resolve_url(base, i)),
        seller_name: raw.seller.unwrap_or_default(),
        published_at: raw.published_at,
        url,
    })
}

/// Keep the first record per URL, preserving order. Lazy.
pub fn unique_by_url<I>(records: I) -> impl Iterator<Item = ListingRecord>
where
    I: Iterator<Item = ListingRecord>,
{
    let mut seen = HashSet::new();
    records.filter(move |r| seen.insert(r.url.clone()))
}

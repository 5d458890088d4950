use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

// ── Listing ───────────────────────────────────────────────────────────────────

/// One offer harvested from a results page, ready for classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub identity: String,
    pub title: String,
    pub price: String,          // "120000 €" or "Po dogovoru"
    pub location: String,
    pub url: String,            // absolute
    pub image_url: Option<String>,
    pub seller_name: String,    // raw, shown in notifications
    pub published_at: Option<String>,
}

/// Stable dedup key for a listing: hex SHA-256 of its canonical URL.
///
/// Parsing through `url` canonicalises scheme/host case and default ports,
/// so two spellings of the same absolute URL share one identity.
pub fn listing_identity(url: &str) -> String {
    let trimmed = url.trim();
    let canonical = match url::Url::parse(trimmed) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => trimmed.to_string(),
    };
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

// ── Raw offer block ───────────────────────────────────────────────────────────

/// Fields as found in one embedded offer block, before defaults apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOffer {
    pub title: Option<String>,
    pub price: Option<String>,
    pub url: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub seller: Option<String>,
    pub published_at: Option<String>,
}

// ── Classification ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellerVerdict {
    Accept,
    RejectBlacklisted,
    RejectAgency,
}

impl SellerVerdict {
    pub fn is_accept(self) -> bool {
        self == SellerVerdict::Accept
    }
}

// ── Counters ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipReason {
    Blacklisted,
    Agency,
    AlreadySeen,
    DeliveryFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Blacklisted => "blacklisted",
            SkipReason::Agency => "agency",
            SkipReason::AlreadySeen => "already seen",
            SkipReason::DeliveryFailed => "delivery failed",
        };
        f.write_str(s)
    }
}

impl From<SellerVerdict> for Option<SkipReason> {
    fn from(v: SellerVerdict) -> Self {
        match v {
            SellerVerdict::Accept => None,
            SellerVerdict::RejectBlacklisted => Some(SkipReason::Blacklisted),
            SellerVerdict::RejectAgency => Some(SkipReason::Agency),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageStats {
    pub page: u32,
    pub url: String,
    pub found: usize,
    pub sent: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub fetch_failed: bool,
}

impl PageStats {
    pub fn new(page: u32, url: impl Into<String>) -> Self {
        Self { page, url: url.into(), ..Default::default() }
    }

    pub fn skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_insert(0) += 1;
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn skipped_summary(&self) -> String {
        if self.skipped.is_empty() {
            return "none".to_string();
        }
        self.skipped
            .iter()
            .map(|(reason, n)| format!("{} {}", n, reason))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleStats {
    pub pages: Vec<PageStats>,
}

impl CycleStats {
    pub fn total_new(&self) -> usize {
        self.pages.iter().map(|p| p.sent).sum()
    }

    pub fn total_found(&self) -> usize {
        self.pages.iter().map(|p| p.found).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.pages.iter().map(|p| p.skipped_total()).sum()
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.fetch_failed).count()
    }
}

// ── Stored rows ───────────────────────────────────────────────────────────────

/// A row of the `listings` table, as read back for stats and export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredListing {
    pub id: String,
    pub title: String,
    pub price: String,
    pub location: String,
    pub url: String,
    pub image_url: Option<String>,
    pub seller: String,
    pub published_at: Option<String>,
    pub first_seen: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRun {
    pub id: i64,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub status: String,
    pub pages: i64,
    pub found: i64,
    pub sent: i64,
    pub skipped: i64,
    pub error_msg: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_hex_sha256() {
        let a = listing_identity("https://estitor.com/me/oglas/stan-123");
        let b = listing_identity("https://estitor.com/me/oglas/stan-123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn identity_canonicalises_host_case() {
        assert_eq!(
            listing_identity("https://ESTITOR.com/me/oglas/1"),
            listing_identity("https://estitor.com/me/oglas/1 "),
        );
    }

    #[test]
    fn distinct_urls_distinct_identities() {
        assert_ne!(
            listing_identity("https://estitor.com/me/oglas/1"),
            listing_identity("https://estitor.com/me/oglas/2"),
        );
    }

    #[test]
    fn page_stats_summary() {
        let mut p = PageStats::new(2, "u");
        assert_eq!(p.skipped_summary(), "none");
        p.skip(SkipReason::Agency);
        p.skip(SkipReason::Agency);
        p.skip(SkipReason::AlreadySeen);
        assert_eq!(p.skipped_total(), 3);
        assert_eq!(p.skipped_summary(), "2 agency, 1 already seen");
    }
}

//! Seller classification: operator blacklist first, then the agency
//! keyword heuristic.

pub mod normalizer;

use crate::models::SellerVerdict;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use self::normalizer::normalize;

// ── Blacklist ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlacklistMode {
    /// Normalized name must equal an entry.
    Exact,
    /// Normalized name equals or contains an entry.
    #[default]
    Substring,
}

/// Normalized operator blacklist. Built once at startup, never mutated.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    entries: BTreeSet<String>,
    mode: BlacklistMode,
}

impl Blacklist {
    pub fn new<I, S>(raw_entries: I, mode: BlacklistMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = raw_entries
            .into_iter()
            .map(|e| normalize(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        Self { entries, mode }
    }

    /// The entry that blocks `normalized_name`, if any.
    pub fn matching_entry(&self, normalized_name: &str) -> Option<&str> {
        if normalized_name.is_empty() {
            return None;
        }
        if let Some(hit) = self.entries.get(normalized_name) {
            return Some(hit.as_str());
        }
        match self.mode {
            BlacklistMode::Exact => None,
            BlacklistMode::Substring => self
                .entries
                .iter()
                .find(|entry| normalized_name.contains(entry.as_str()))
                .map(String::as_str),
        }
    }

    pub fn mode(&self) -> BlacklistMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

// ── Classifier ────────────────────────────────────────────────────────────────

pub const DEFAULT_AGENCY_KEYWORDS: &[&str] = &[
    "nekretnine",
    "real estate",
    "properties",
    "consulting",
    "invest",
    "home",
    "group",
    "estate",
    "realty",
    "luxury",
    "trust",
    "agencija",
    "agency",
];

#[derive(Debug, Clone)]
pub struct Classifier {
    blacklist: Blacklist,
    // (lower-cased, normalized) pairs
    agency_keywords: Vec<(String, String)>,
}

impl Classifier {
    pub fn new<I, S>(blacklist: Blacklist, agency_keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let agency_keywords = agency_keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .map(|k| {
                let n = normalize(&k);
                (k, n)
            })
            .collect();
        Self { blacklist, agency_keywords }
    }

    pub fn with_default_keywords(blacklist: Blacklist) -> Self {
        Self::new(blacklist, DEFAULT_AGENCY_KEYWORDS)
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// First matching rule wins: blacklist, then agency heuristic.
    pub fn classify(&self, raw_seller_name: &str) -> SellerVerdict {
        let normalized = normalize(raw_seller_name);

        if self.blacklist.matching_entry(&normalized).is_some() {
            return SellerVerdict::RejectBlacklisted;
        }

        if self.looks_like_agency(raw_seller_name, &normalized) {
            return SellerVerdict::RejectAgency;
        }

        SellerVerdict::Accept
    }

    // A nameless poster is treated as an agency.
    fn looks_like_agency(&self, raw: &str, normalized: &str) -> bool {
        let lowered = raw.trim().to_lowercase();
        if lowered.is_empty() {
            return true;
        }
        self.agency_keywords.iter().any(|(kw, kw_norm)| {
            lowered.contains(kw.as_str()) || (!kw_norm.is_empty() && normalized.contains(kw_norm.as_str()))
        })
    }
}

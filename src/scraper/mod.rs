pub mod browser;
pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::models::ListingRecord;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use self::browser::BrowserRenderer;
use self::http_client::HttpRenderer;

use self::cleaner::{offer_to_record, unique_by_url};
use self::parsers::{offer_blocks, parse_offer_block};

// ── Renderer trait ────────────────────────────────────────────────────────────

/// A results page after the renderer has finished loading it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub url: String,
    content: String,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self { url: url.into(), content: content.into() }
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// How a page is loaded before its document is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Navigation budget.
    pub timeout: Duration,
    /// Longest wait for the document to stop changing (networkidle).
    pub settle: Duration,
    /// Scroll steps that trigger lazily loaded offers.
    pub scroll_passes: u32,
    pub scroll_step_px: u32,
    pub scroll_pause: Duration,
}

/// Swappable page loader. Implementations must return the fully
/// materialized document: client-side rendering settled and the scroll
/// passes in `options` applied before the content is read.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn open(&self, url: &str, options: &RenderOptions) -> Result<RenderedPage>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Headless Chrome with settle wait and scrolling.
    #[default]
    Browser,
    /// Plain HTTP fetch; sees only server-rendered offers.
    Http,
}

pub fn build_renderer(config: &ScraperConfig) -> Result<Arc<dyn PageRenderer>> {
    info!("Renderer: {:?}", config.renderer);
    Ok(match config.renderer {
        RendererKind::Browser => Arc::new(BrowserRenderer::new(config)),
        RendererKind::Http => Arc::new(HttpRenderer::new(config)?),
    })
}

// ── Pagination ────────────────────────────────────────────────────────────────

const PAGE_MARKER: &str = "/strana-";

/// Page URLs: page 1 is the target verbatim, page N rewrites the first
/// `segment` into `segment/strana-N`.
#[derive(Debug, Clone)]
pub struct Paginator {
    target_url: String,
    segment: String,
}

impl Paginator {
    pub fn new(target_url: impl Into<String>, segment: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            segment: segment.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(&config.target_url, &config.page_segment)
    }

    pub fn page_url(&self, page: u32) -> String {
        if page <= 1 || self.segment.is_empty() {
            return self.target_url.clone();
        }
        self.target_url.replacen(
            &self.segment,
            &format!("{}{}{}", self.segment, PAGE_MARKER, page),
            1,
        )
    }

    /// Inverse of `page_url`.
    pub fn page_number(&self, url: &str) -> Option<u32> {
        if url == self.target_url {
            return Some(1);
        }
        let needle = format!("{}{}", self.segment, PAGE_MARKER);
        let at = url.find(&needle)? + needle.len();
        let digits: String = url[at..].chars().take_while(|c| c.is_ascii_digit()).collect();
        let page: u32 = digits.parse().ok()?;
        (page >= 2 && self.page_url(page) == url).then_some(page)
    }
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Page document → listing records. Pure; no classification or storage.
#[derive(Debug, Clone)]
pub struct OfferExtractor {
    base: Url,
    default_location: String,
}

impl OfferExtractor {
    pub fn new(base: Url, default_location: impl Into<String>) -> Self {
        Self { base, default_location: default_location.into() }
    }

    pub fn from_config(config: &ScraperConfig) -> Result<Self> {
        let base = Url::parse(&config.target_url)?;
        Ok(Self::new(base, &config.default_location))
    }

    /// Lazily yields one record per usable offer block, first occurrence
    /// per URL. Bad blocks are logged and skipped.
    pub fn extract<'a>(&'a self, page: &'a RenderedPage) -> impl Iterator<Item = ListingRecord> + 'a {
        let records = offer_blocks(page.content())
            .enumerate()
            .filter_map(move |(index, block)| {
                match offer_to_record(index, parse_offer_block(block), &self.base, &self.default_location) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("{}: {}", page.url, e);
                        None
                    }
                }
            });
        unique_by_url(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: &str = "https://estitor.com/me/prodaja/stanovi/grad-podgorica";

    fn paginator() -> Paginator {
        Paginator::new(TARGET, "/grad-podgorica")
    }

    #[test]
    fn test_page_one_unchanged() {
        assert_eq!(paginator().page_url(1), TARGET);
    }

    #[test]
    fn test_page_two_rewrites_segment() {
        assert_eq!(
            paginator().page_url(2),
            "https://estitor.com/me/prodaja/stanovi/grad-podgorica/strana-2"
        );
    }

    #[test]
    fn test_segment_rewrite_keeps_query() {
        let p = Paginator::new(format!("{TARGET}?sort=newest"), "/grad-podgorica");
        assert_eq!(
            p.page_url(3),
            "https://estitor.com/me/prodaja/stanovi/grad-podgorica/strana-3?sort=newest"
        );
    }

    #[test]
    fn test_page_number_round_trips() {
        let p = paginator();
        for n in 1..=12 {
            assert_eq!(p.page_number(&p.page_url(n)), Some(n));
        }
        assert_eq!(p.page_number("https://estitor.com/elsewhere"), None);
    }

    fn extractor() -> OfferExtractor {
        OfferExtractor::new(Url::parse(TARGET).unwrap(), "Podgorica")
    }

    fn block(url: &str, seller: &str) -> String {
        format!(r#"{{"@type":"Offer","name":"Stan","price":"90000","url":"{url}","seller":{{"@type":"Person","name":"{seller}"}}}}"#)
    }

    #[test]
    fn test_malformed_block_isolated() {
        let html = format!(
            r#"<script type="application/ld+json">[{},{{"@type":"Offer","name":"no link","seller":{{"name":"X"}}}}]</script>"#,
            block("/me/oglas/1", "Ana")
        );
        let page = RenderedPage::new(TARGET, html);
        let records: Vec<_> = extractor().extract(&page).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://estitor.com/me/oglas/1");
        assert_eq!(records[0].seller_name, "Ana");
        assert_eq!(records[0].price, "90000 €");
    }

    #[test]
    fn test_in_page_duplicates_dropped() {
        let html = format!(
            "{} {} {}",
            block("/me/oglas/1", "Sponsored"),
            block("/me/oglas/2", "Ana"),
            block("https://estitor.com/me/oglas/1", "Organic"),
        );
        let page = RenderedPage::new(TARGET, html);
        let records: Vec<_> = extractor().extract(&page).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seller_name, "Sponsored");
        assert_eq!(records[1].seller_name, "Ana");
    }

    #[test]
    fn test_reextraction_is_identical() {
        let page = RenderedPage::new(TARGET, format!("{} {}", block("/a", "A"), block("/b", "B")));
        let ex = extractor();
        let first: Vec<_> = ex.extract(&page).collect();
        let second: Vec<_> = ex.extract(&page).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_shared_seller_profile_keeps_listings_apart() {
        let offer = |n: u32| {
            format!(
                r#"{{"@type":"Offer","name":"Stan {n}","price":"1.250.000","seller":{{"@type":"Organization","name":"Ana","url":"https://estitor.com/me/profil/5"}},"url":"https://estitor.com/me/oglas/{n}"}}"#
            )
        };
        let page = RenderedPage::new(TARGET, format!("[{},{}]", offer(1), offer(2)));
        let records: Vec<_> = extractor().extract(&page).collect();
        let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://estitor.com/me/oglas/1", "https://estitor.com/me/oglas/2"]);
        assert_ne!(records[0].identity, records[1].identity);
        assert_eq!(records[0].price, "1.250.000 €");
    }

    #[test]
    fn test_offer_without_name_gets_placeholder_title() {
        let html = r#"{"@type":"Offer","url":"/me/oglas/3","seller":{"name":"Ana Markovic"}}"#;
        let page = RenderedPage::new(TARGET, html);
        let records: Vec<_> = extractor().extract(&page).collect();
        assert_eq!(records[0].title, "Nekretnina");
        assert_eq!(records[0].seller_name, "Ana Markovic");
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        let page = RenderedPage::new(TARGET, "<html><body>Nema oglasa</body></html>");
        assert_eq!(extractor().extract(&page).count(), 0);
    }
}

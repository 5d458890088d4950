use thiserror::Error;

/// Failures the crawl cycle distinguishes. All but `Store` are absorbed
/// into a skip counter and a log line.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("fetch failed for {url}: {cause:#}")]
    Fetch { url: String, cause: anyhow::Error },

    #[error("offer block {index} unusable: {reason}")]
    BlockParse { index: usize, reason: String },

    #[error("delivery failed for {url}: {cause:#}")]
    Delivery { url: String, cause: anyhow::Error },

    #[error("listing store unavailable: {0:#}")]
    Store(anyhow::Error),
}

impl CrawlError {
    /// Whether the current cycle has to stop.
    pub fn is_fatal_for_cycle(&self) -> bool {
        matches!(self, CrawlError::Store(_))
    }
}

/// Configuration problems are fatal to the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid target URL {url:?}: {reason}")]
    TargetUrl { url: String, reason: String },

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error("missing {0} (required for delivery)")]
    MissingCredential(&'static str),

    #[error("blacklist file {path:?}: {cause:#}")]
    BlacklistFile { path: std::path::PathBuf, cause: anyhow::Error },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_failures_abort_the_cycle() {
        let fetch = CrawlError::Fetch { url: "u".into(), cause: anyhow::anyhow!("timeout") };
        let block = CrawlError::BlockParse { index: 1, reason: "no url".into() };
        let store = CrawlError::Store(anyhow::anyhow!("disk full"));
        assert!(!fetch.is_fatal_for_cycle());
        assert!(!block.is_fatal_for_cycle());
        assert!(store.is_fatal_for_cycle());
        assert_eq!(fetch.to_string(), "fetch failed for u: timeout");
    }
}

//! File IO around the core: blacklist import and listing export.

use crate::config::FilterConfig;
use crate::errors::ConfigError;
use crate::filter::Blacklist;
use crate::models::StoredListing;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};

/// Read blacklist entries separated by commas and/or newlines. Quoted
/// fields may contain commas: `"Kuća, Stan d.o.o."`.
pub fn load_blacklist_file(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .with_context(|| format!("Cannot open {:?}", path))?;

    let mut entries = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Line {} in {:?}: {}", i + 1, path, e);
                continue;
            }
        };
        entries.extend(record.iter().filter(|f| !f.is_empty()).map(String::from));
    }

    debug!("{:?}: {} blacklist entries", path, entries.len());
    Ok(entries)
}

/// Union of configured entries and the optional file, normalized.
pub fn build_blacklist(config: &FilterConfig) -> Result<Blacklist, ConfigError> {
    let mut raw = config.blacklist.clone();

    if let Some(path) = &config.blacklist_file {
        let from_file = load_blacklist_file(path).map_err(|cause| ConfigError::BlacklistFile {
            path: path.clone(),
            cause,
        })?;
        raw.extend(from_file);
    }

    let blacklist = Blacklist::new(&raw, config.blacklist_mode);
    if blacklist.is_empty() {
        info!("Blacklist empty, only the agency heuristic applies");
    } else {
        info!(
            "Blacklist: {} entries ({:?} match)",
            blacklist.len(),
            blacklist.mode()
        );
        debug!("Blacklist entries: {:?}", blacklist.iter().collect::<Vec<_>>());
    }
    Ok(blacklist)
}

/// Write stored listings as CSV with a header row.
pub fn write_listings_csv(path: &Path, listings: &[StoredListing]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot create {:?}", path))?;
    for listing in listings {
        writer.serialize(listing)?;
    }
    writer.flush()?;
    Ok(listings.len())
}

//! Source collection loading.
//!
//! Ingestion collaborators drop one JSON array per source per day under
//! `<data_dir>/<source>/<date>.json`. This module discovers those drops,
//! tolerates the field variations the collectors produce, and returns
//! clean [`Entry`] collections. A missing or unreadable drop means that
//! source contributes zero entries; it never fails the run.

use crate::models::Entry;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One source's entries for the run date.
#[derive(Debug, Clone)]
pub struct SourceCollection {
    pub source_id: String,
    pub entries: Vec<Entry>,
}

/// An entry as collectors actually write it. Collectors disagree on
/// field names; the loose shape is normalized into [`Entry`] here.
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "arxiv_id")]
    upstream_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "abstract")]
    summary: Option<String>,
    #[serde(default, alias = "date")]
    timestamp: Option<String>,
    #[serde(default, alias = "research_score", alias = "raw_score")]
    score: Option<f64>,
    #[serde(default)]
    tags: Vec<String>,
}

impl RawEntry {
    /// The stable unique key: canonical URL, then upstream identifier.
    fn key(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| self.id.clone())
            .or_else(|| self.upstream_id.clone())
    }

    fn into_entry(self, source_id: &str, fallback_date: NaiveDate) -> Option<Entry> {
        let key = self.key()?;
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(|| midnight_utc(fallback_date));

        Some(Entry {
            source_id: source_id.to_string(),
            key,
            title: self.title.unwrap_or_default(),
            summary: self.summary.unwrap_or_default(),
            timestamp,
            raw_score: self.score.unwrap_or(0.0).clamp(0.0, 1.0),
            tags: self
                .tags
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect::<BTreeSet<String>>(),
        })
    }
}

/// Parse a collector timestamp: RFC 3339, or a bare date at UTC midnight.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(midnight_utc)
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0).expect("valid time"), Utc)
}

/// Load every source's collection for the given date.
///
/// Sources are subdirectories of `data_dir`, discovered in sorted order
/// for deterministic downstream processing.
pub fn load_collections(data_dir: &Path, date: NaiveDate) -> Result<Vec<SourceCollection>> {
    let mut source_dirs: Vec<PathBuf> = Vec::new();

    match fs::read_dir(data_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    source_dirs.push(path);
                }
            }
        }
        Err(e) => {
            warn!(
                "Cannot read data directory {}: {} - no sources available",
                data_dir.display(),
                e
            );
            return Ok(Vec::new());
        }
    }

    source_dirs.sort();

    let mut collections = Vec::new();
    for dir in source_dirs {
        let source_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if source_id.is_empty() || source_id.starts_with('.') {
            continue;
        }

        let entries = load_source(&dir, &source_id, date);
        collections.push(SourceCollection { source_id, entries });
    }

    Ok(collections)
}

/// Load one source's drop for the date. Any failure yields zero entries.
fn load_source(dir: &Path, source_id: &str, date: NaiveDate) -> Vec<Entry> {
    let path = dir.join(format!("{}.json", date));

    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(_) => {
            debug!("No collection for source '{}' at {}", source_id, path.display());
            return Vec::new();
        }
    };

    let raw: Vec<RawEntry> = match serde_json::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            warn!(
                "Skipping source '{}': failed to parse {}: {}",
                source_id,
                path.display(),
                e
            );
            return Vec::new();
        }
    };

    let total = raw.len();
    let entries: Vec<Entry> = raw
        .into_iter()
        .filter_map(|r| {
            let converted = r.into_entry(source_id, date);
            if converted.is_none() {
                warn!("Skipping keyless record from source '{}'", source_id);
            }
            converted
        })
        .collect();

    debug!(
        "Source '{}': {} of {} records usable",
        source_id,
        entries.len(),
        total
    );

    entries
}

//! Data models for the research pipeline.
//!
//! This module contains all the core data structures used throughout
//! the application for representing entries, insights, and reports.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// One piece of content contributed by a source.
///
/// Entries are immutable once ingested; the aggregator copies them into
/// scored form rather than mutating them in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Identifier of the source that contributed this entry.
    pub source_id: String,
    /// Stable unique key: the canonical URL or an upstream identifier.
    pub key: String,
    /// Entry title.
    pub title: String,
    /// Short summary or abstract.
    pub summary: String,
    /// Publication/ingestion timestamp.
    pub timestamp: DateTime<Utc>,
    /// Relevance score assigned at ingestion, in [0, 1].
    pub raw_score: f64,
    /// Topic tags (normalized lowercase).
    pub tags: BTreeSet<String>,
}

/// An entry together with its composite relevance score.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: Entry,
    /// Blended relevance score in [0, 1], used for ranking and filtering.
    pub score: f64,
}

/// Fatal aggregation failure: nothing survived filtering.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no entries survived relevance filtering (threshold {threshold})")]
    EmptyDataset { threshold: f64 },
}

/// The merged, deduplicated, ordered dataset produced by the aggregator.
///
/// Invariants: unique by entry key, every score in [0, 1], never empty,
/// ordered by (score desc, timestamp desc, key asc).
#[derive(Debug, Clone)]
pub struct AggregatedDataset {
    entries: Vec<ScoredEntry>,
}

impl AggregatedDataset {
    /// Build a dataset from already scored, deduplicated, sorted entries.
    ///
    /// Only the aggregator constructs datasets; the invariants above are
    /// established there.
    pub(crate) fn from_scored(entries: Vec<ScoredEntry>) -> Self {
        debug_assert!(!entries.is_empty());
        Self { entries }
    }

    /// All entries in ranked order.
    pub fn entries(&self) -> &[ScoredEntry] {
        &self.entries
    }

    /// Number of entries in the dataset (always at least 1).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The top `n` entries by rank.
    pub fn top(&self, n: usize) -> &[ScoredEntry] {
        &self.entries[..self.entries.len().min(n)]
    }
}

/// A recurring pattern detected across the aggregated dataset.
///
/// Insights reference entries by key; they never own entry data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    /// Human-readable pattern label (e.g. a shared tag or dominant term).
    pub label: String,
    /// Keys of the entries supporting this pattern. Never empty.
    pub supporting_keys: BTreeSet<String>,
    /// Group size relative to the dataset, capped at 1.0.
    pub confidence: f64,
}

impl Insight {
    /// Number of entries supporting this insight.
    pub fn support(&self) -> usize {
        self.supporting_keys.len()
    }
}

/// Why an enhancement fell back to the base analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// Enhancement disabled or no backend configured.
    Disabled,
    /// Every configured backend failed or returned an invalid response.
    AllBackendsFailed,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Disabled => write!(f, "disabled"),
            FallbackReason::AllBackendsFailed => write!(f, "all_backends_failed"),
        }
    }
}

/// Outcome of the persona enhancement stage.
///
/// Fallback is a valid, successful outcome at the pipeline level: the
/// report is built from the unmodified base analysis.
#[derive(Debug, Clone)]
pub enum EnhancementResult {
    /// The base analysis was rewritten by an LLM backend.
    Enhanced {
        text: String,
        persona: String,
        backend: String,
    },
    /// The base analysis is used as-is.
    Fallback { reason: FallbackReason },
}

impl EnhancementResult {
    /// Returns the enhanced text, if any.
    #[allow(dead_code)] // Utility accessor (callers mostly match directly)
    pub fn text(&self) -> Option<&str> {
        match self {
            EnhancementResult::Enhanced { text, .. } => Some(text),
            EnhancementResult::Fallback { .. } => None,
        }
    }

    #[allow(dead_code)] // Utility predicate
    pub fn is_enhanced(&self) -> bool {
        matches!(self, EnhancementResult::Enhanced { .. })
    }
}

/// The complete daily report. Built once; rendered twice.
///
/// Both renderings are pure functions of this struct, so regenerating
/// from an identical report yields byte-identical files.
#[derive(Debug, Clone)]
pub struct Report {
    /// Report title.
    pub title: String,
    /// The day the report covers.
    pub date: NaiveDate,
    /// Generation timestamp, fixed at build time.
    pub generated_at: DateTime<Utc>,
    /// Deterministic markdown body composed from the dataset and insights.
    pub base_analysis: String,
    /// Optional LLM enhancement of the base analysis.
    pub enhancement: EnhancementResult,
    /// Patterns detected by the insight miner.
    pub insights: Vec<Insight>,
    /// The ranked entries highlighted in the report.
    pub highlights: Vec<ScoredEntry>,
    /// Derived keywords used for tagging and publication hashtags.
    pub keywords: Vec<String>,
}

/// Per-relay delivery outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayOutcome {
    /// Relay acknowledged the event.
    Ok,
    /// Attempt exceeded its timeout or the global publishing budget.
    Timeout,
    /// Connect failure, protocol error, or explicit rejection.
    Error,
}

impl fmt::Display for RelayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayOutcome::Ok => write!(f, "ok"),
            RelayOutcome::Timeout => write!(f, "timeout"),
            RelayOutcome::Error => write!(f, "error"),
        }
    }
}

/// Durable record of one publication attempt across all relays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationRecord {
    /// Hex id of the signed event.
    pub event_id: String,
    /// Hex public key derived from the signing key.
    pub public_key: String,
    /// Outcome per relay endpoint. One entry per attempted relay.
    pub relay_results: BTreeMap<String, RelayOutcome>,
    /// Whether enough relays acknowledged to meet the configured quorum.
    pub quorum_met: bool,
    /// Unix timestamp carried by the published event.
    pub published_at: i64,
}

impl PublicationRecord {
    /// Number of relays that acknowledged the event.
    pub fn ack_count(&self) -> usize {
        self.relay_results
            .values()
            .filter(|o| **o == RelayOutcome::Ok)
            .count()
    }
}

/// Aggregation yield metrics for monitoring curation quality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldMetrics {
    /// Run date (ISO).
    pub date: String,
    /// Entries seen across all sources before filtering.
    pub total_items: usize,
    /// Entries that survived deduplication and relevance filtering.
    pub high_relevance_items: usize,
    /// Relevance threshold applied.
    pub filter_threshold: f64,
    /// Survivors / total, rounded to two decimals.
    pub quality_ratio: f64,
}

impl YieldMetrics {
    pub fn new(date: NaiveDate, total: usize, survivors: usize, threshold: f64) -> Self {
        let ratio = survivors as f64 / total.max(1) as f64;
        Self {
            date: date.to_string(),
            total_items: total,
            high_relevance_items: survivors,
            filter_threshold: threshold,
            quality_ratio: (ratio * 100.0).round() / 100.0,
        }
    }
}

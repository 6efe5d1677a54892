//! Entry aggregation: merge, deduplicate, score, filter, rank.
//!
//! This is the one stage whose failure aborts the run: everything
//! downstream assumes a non-empty ranked dataset.

use crate::config::AggregateConfig;
use crate::models::{AggregateError, AggregatedDataset, Entry, ScoredEntry, YieldMetrics};
use crate::sources::SourceCollection;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of a successful aggregation run.
#[derive(Debug)]
pub struct AggregationOutcome {
    /// The ranked dataset.
    pub dataset: AggregatedDataset,
    /// Entries seen across all sources before dedup and filtering.
    pub total_seen: usize,
}

/// Merge all source collections into one deduplicated, scored, ordered
/// dataset.
///
/// `as_of` anchors the recency factor; passing the run's reference time
/// keeps results reproducible for a given input set.
pub fn aggregate(
    collections: &[SourceCollection],
    config: &AggregateConfig,
    as_of: DateTime<Utc>,
) -> Result<AggregationOutcome, AggregateError> {
    let all: Vec<&Entry> = collections.iter().flat_map(|c| c.entries.iter()).collect();
    let total_seen = all.len();

    // Score first, then deduplicate on the composite: duplicates of one
    // key may come from sources with different trust.
    let mut by_key: BTreeMap<String, ScoredEntry> = BTreeMap::new();
    for entry in all {
        let scored = ScoredEntry {
            entry: entry.clone(),
            score: composite_score(entry, config, as_of),
        };

        match by_key.get(&entry.key) {
            Some(existing) if !replaces(&scored, existing) => {}
            _ => {
                by_key.insert(entry.key.clone(), scored);
            }
        }
    }

    let deduped = by_key.len();

    let mut survivors: Vec<ScoredEntry> = by_key
        .into_values()
        .filter(|s| s.score >= config.relevance_threshold)
        .collect();

    // Full determinism: score desc, timestamp desc, key asc. Input order
    // can never change the output sequence.
    survivors.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.entry.timestamp.cmp(&a.entry.timestamp))
            .then_with(|| a.entry.key.cmp(&b.entry.key))
    });

    debug!(
        "Aggregated {} entries: {} unique, {} above threshold {}",
        total_seen,
        deduped,
        survivors.len(),
        config.relevance_threshold
    );

    if survivors.is_empty() {
        return Err(AggregateError::EmptyDataset {
            threshold: config.relevance_threshold,
        });
    }

    info!(
        "Dataset ready: {} entries (from {} raw)",
        survivors.len(),
        total_seen
    );

    Ok(AggregationOutcome {
        dataset: AggregatedDataset::from_scored(survivors),
        total_seen,
    })
}

/// Whether `candidate` wins the dedup slot over `existing`: higher
/// composite score, or equal score with an earlier timestamp.
fn replaces(candidate: &ScoredEntry, existing: &ScoredEntry) -> bool {
    if candidate.score != existing.score {
        return candidate.score > existing.score;
    }
    candidate.entry.timestamp < existing.entry.timestamp
}

/// Blend raw score, source trust, and recency into one [0, 1] score.
///
/// The blend is normalized by the weight sum, so any positive weight
/// combination stays in the unit interval.
pub fn composite_score(entry: &Entry, config: &AggregateConfig, as_of: DateTime<Utc>) -> f64 {
    let trust = config
        .source_trust
        .get(&entry.source_id)
        .copied()
        .unwrap_or(config.default_trust);

    let recency = recency_factor(entry.timestamp, config.recency_horizon_days, as_of);

    let weight_sum = config.raw_weight + config.trust_weight + config.recency_weight;
    if weight_sum <= 0.0 {
        return entry.raw_score.clamp(0.0, 1.0);
    }

    let blended = (config.raw_weight * entry.raw_score
        + config.trust_weight * trust
        + config.recency_weight * recency)
        / weight_sum;

    blended.clamp(0.0, 1.0)
}

/// Linear decay from 1.0 at `as_of` to 0.0 at the horizon.
fn recency_factor(timestamp: DateTime<Utc>, horizon_days: i64, as_of: DateTime<Utc>) -> f64 {
    let horizon_secs = horizon_days.max(1) as f64 * 86_400.0;
    let age_secs = as_of.signed_duration_since(timestamp).num_seconds() as f64;

    (1.0 - age_secs / horizon_secs).clamp(0.0, 1.0)
}

/// Persist the run's yield metrics under a dated filename.
pub fn write_yield_metrics(metrics: &YieldMetrics, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join(format!("{}_yield.json", metrics.date));
    let json = serde_json::to_string_pretty(metrics).context("Failed to serialize metrics")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    debug!("Yield metrics saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn make_entry(source: &str, key: &str, score: f64, days_old: i64) -> Entry {
        Entry {
            source_id: source.to_string(),
            key: key.to_string(),
            title: format!("Entry {}", key),
            summary: String::new(),
            timestamp: as_of() - chrono::Duration::days(days_old),
            raw_score: score,
            tags: BTreeSet::new(),
        }
    }

    fn collections(entries: Vec<Entry>) -> Vec<SourceCollection> {
        vec![SourceCollection {
            source_id: "test".to_string(),
            entries,
        }]
    }

    /// A config where the composite equals the raw score, so tests can
    /// reason about exact thresholds.
    fn raw_only_config() -> AggregateConfig {
        AggregateConfig {
            raw_weight: 1.0,
            trust_weight: 0.0,
            recency_weight: 0.0,
            relevance_threshold: 0.5,
            ..AggregateConfig::default()
        }
    }

    #[test]
    fn test_dedup_keeps_highest_scored() {
        let entries = vec![
            make_entry("test", "k1", 0.9, 0),
            make_entry("test", "k1", 0.95, 0),
            make_entry("test", "k2", 0.8, 0),
        ];

        let outcome = aggregate(&collections(entries), &raw_only_config(), as_of()).unwrap();

        assert_eq!(outcome.dataset.len(), 2);
        let k1 = outcome
            .dataset
            .entries()
            .iter()
            .find(|s| s.entry.key == "k1")
            .unwrap();
        assert!((k1.score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_dedup_tie_keeps_earliest() {
        let entries = vec![
            make_entry("test", "k1", 0.9, 0),
            make_entry("test", "k1", 0.9, 3),
        ];

        let outcome = aggregate(&collections(entries), &raw_only_config(), as_of()).unwrap();

        assert_eq!(outcome.dataset.len(), 1);
        // The older (earlier-timestamped) duplicate wins the tie.
        assert_eq!(
            outcome.dataset.entries()[0].entry.timestamp,
            as_of() - chrono::Duration::days(3)
        );
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let config = raw_only_config();
        let a = make_entry("test", "a", 0.9, 1);
        let b = make_entry("test", "b", 0.9, 1);
        let c = make_entry("test", "c", 0.7, 0);

        let forward = aggregate(
            &collections(vec![a.clone(), b.clone(), c.clone()]),
            &config,
            as_of(),
        )
        .unwrap();
        let reversed = aggregate(&collections(vec![c, b, a]), &config, as_of()).unwrap();

        let keys =
            |d: &AggregatedDataset| d.entries().iter().map(|s| s.entry.key.clone()).collect::<Vec<_>>();

        // Same score and timestamp: key ascending breaks the tie.
        assert_eq!(keys(&forward.dataset), vec!["a", "b", "c"]);
        assert_eq!(keys(&forward.dataset), keys(&reversed.dataset));
    }

    #[test]
    fn test_empty_inputs_are_fatal() {
        let result = aggregate(&collections(vec![]), &raw_only_config(), as_of());
        assert!(matches!(
            result,
            Err(AggregateError::EmptyDataset { .. })
        ));
    }

    #[test]
    fn test_threshold_filters_everything() {
        let entries = vec![make_entry("test", "k1", 0.1, 0)];
        let result = aggregate(&collections(entries), &raw_only_config(), as_of());
        assert!(result.is_err());
    }

    #[test]
    fn test_source_trust_affects_ranking() {
        let mut config = AggregateConfig {
            raw_weight: 0.5,
            trust_weight: 0.5,
            recency_weight: 0.0,
            relevance_threshold: 0.0,
            ..AggregateConfig::default()
        };
        config.source_trust.insert("trusted".to_string(), 1.0);
        config.source_trust.insert("sketchy".to_string(), 0.0);

        let entries = vec![
            make_entry("sketchy", "k1", 0.8, 0),
            make_entry("trusted", "k2", 0.8, 0),
        ];

        let outcome = aggregate(&collections(entries), &config, as_of()).unwrap();
        assert_eq!(outcome.dataset.entries()[0].entry.key, "k2");
    }

    #[test]
    fn test_recency_decay() {
        let config = AggregateConfig::default();
        let fresh = make_entry("test", "fresh", 0.8, 0);
        let stale = make_entry("test", "stale", 0.8, 10);

        let fresh_score = composite_score(&fresh, &config, as_of());
        let stale_score = composite_score(&stale, &config, as_of());

        assert!(fresh_score > stale_score);
        // Past the 7-day horizon the recency factor bottoms out at zero.
        assert!((recency_factor(stale.timestamp, 7, as_of()) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_future_timestamps_do_not_overflow_unit_interval() {
        let config = AggregateConfig::default();
        let future = make_entry("test", "k1", 1.0, -3);

        let score = composite_score(&future, &config, as_of());
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_end_to_end_dedup_and_threshold() {
        // Three sources: A scores 0.9, B scores 0.4 (below threshold),
        // C duplicates A's key at 0.95. Only C survives with A's key.
        let config = raw_only_config();
        let sources = vec![
            SourceCollection {
                source_id: "s1".to_string(),
                entries: vec![make_entry("s1", "shared", 0.9, 0)],
            },
            SourceCollection {
                source_id: "s2".to_string(),
                entries: vec![make_entry("s2", "other", 0.4, 0)],
            },
            SourceCollection {
                source_id: "s3".to_string(),
                entries: vec![make_entry("s3", "shared", 0.95, 0)],
            },
        ];

        let outcome = aggregate(&sources, &config, as_of()).unwrap();

        assert_eq!(outcome.dataset.len(), 1);
        assert_eq!(outcome.total_seen, 3);
        let winner = &outcome.dataset.entries()[0];
        assert_eq!(winner.entry.key, "shared");
        assert_eq!(winner.entry.source_id, "s3");
        assert!((winner.score - 0.95).abs() < 1e-9);
    }
}

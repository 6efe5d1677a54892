//! Pattern detection over the aggregated dataset.
//!
//! Groups entries by shared tags, then by title similarity, and promotes
//! sufficiently supported groups to insights. Purely a read over the
//! dataset; insights are optional enrichment and may be empty.

use crate::config::InsightConfig;
use crate::models::{AggregatedDataset, Insight};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Tokens too generic to label a pattern or serve as a keyword.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "over", "under", "via", "using", "toward",
    "towards", "through", "based", "new", "novel", "improved", "improving", "learning", "model",
    "models", "approach", "method", "methods", "analysis", "study", "paper", "can", "are", "our",
    "that", "this", "all", "how", "what", "when", "more", "than",
];

/// Detect recurring patterns across the dataset.
///
/// Primary grouping is by shared tag; entries not covered by a
/// qualifying tag group are greedily clustered by title-token Jaccard
/// similarity. A group becomes an [`Insight`] only with at least
/// `min_support` entries. Confidence is group size over dataset size,
/// capped at 1.0.
pub fn mine(dataset: &AggregatedDataset, config: &InsightConfig) -> Vec<Insight> {
    let dataset_size = dataset.len();
    let mut insights: Vec<Insight> = Vec::new();
    let mut covered: BTreeSet<String> = BTreeSet::new();

    // Tag groups. A tag shared by enough entries is a pattern in itself.
    let mut by_tag: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for scored in dataset.entries() {
        for tag in &scored.entry.tags {
            by_tag
                .entry(tag.clone())
                .or_default()
                .insert(scored.entry.key.clone());
        }
    }

    for (tag, keys) in by_tag {
        if keys.len() >= config.min_support {
            covered.extend(keys.iter().cloned());
            insights.push(Insight {
                confidence: confidence(keys.len(), dataset_size),
                label: tag,
                supporting_keys: keys,
            });
        }
    }

    // Title clusters for whatever the tag groups did not cover.
    let uncovered: Vec<(&str, BTreeSet<String>)> = dataset
        .entries()
        .iter()
        .filter(|s| !covered.contains(&s.entry.key))
        .map(|s| (s.entry.key.as_str(), tokenize(&s.entry.title)))
        .collect();

    let mut clustered: BTreeSet<&str> = BTreeSet::new();
    for (i, (seed_key, seed_tokens)) in uncovered.iter().enumerate() {
        if clustered.contains(seed_key) || seed_tokens.is_empty() {
            continue;
        }

        let mut members: Vec<&str> = vec![*seed_key];
        let mut member_tokens: Vec<&BTreeSet<String>> = vec![seed_tokens];

        for (other_key, other_tokens) in uncovered.iter().skip(i + 1) {
            if clustered.contains(other_key) {
                continue;
            }
            if jaccard(seed_tokens, other_tokens) >= config.title_similarity {
                members.push(*other_key);
                member_tokens.push(other_tokens);
            }
        }

        if members.len() >= config.min_support {
            clustered.extend(members.iter().copied());
            insights.push(Insight {
                confidence: confidence(members.len(), dataset_size),
                label: cluster_label(&member_tokens),
                supporting_keys: members.iter().map(|k| k.to_string()).collect(),
            });
        }
    }

    insights.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.label.cmp(&b.label))
    });

    debug!("Mined {} insights from {} entries", insights.len(), dataset_size);
    insights
}

/// Derive the most frequent informative terms across titles and tags.
///
/// Deterministic: ordered by (frequency desc, term asc). Terms must
/// appear at least twice to qualify.
pub fn derive_keywords(dataset: &AggregatedDataset, max: usize) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for scored in dataset.entries() {
        for token in tokenize(&scored.entry.title) {
            *counts.entry(token).or_default() += 1;
        }
        for tag in &scored.entry.tags {
            *counts.entry(tag.clone()).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> =
        counts.into_iter().filter(|(_, n)| *n >= 2).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ranked.into_iter().take(max).map(|(t, _)| t).collect()
}

fn confidence(group_size: usize, dataset_size: usize) -> f64 {
    (group_size as f64 / dataset_size.max(1) as f64).min(1.0)
}

/// Lowercased informative title tokens.
fn tokenize(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .map(String::from)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Label a title cluster by its most shared token (ties break
/// lexicographically).
fn cluster_label(member_tokens: &[&BTreeSet<String>]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for tokens in member_tokens {
        for token in tokens.iter() {
            *counts.entry(token.as_str()).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(token, _)| token.to_string())
        .unwrap_or_else(|| "untitled".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregatedDataset, Entry, ScoredEntry};
    use chrono::{TimeZone, Utc};

    fn make_scored(key: &str, title: &str, tags: &[&str]) -> ScoredEntry {
        ScoredEntry {
            entry: Entry {
                source_id: "test".to_string(),
                key: key.to_string(),
                title: title.to_string(),
                summary: String::new(),
                timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
                raw_score: 0.8,
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
            score: 0.8,
        }
    }

    fn dataset(entries: Vec<ScoredEntry>) -> AggregatedDataset {
        AggregatedDataset::from_scored(entries)
    }

    #[test]
    fn test_tag_group_becomes_insight() {
        let data = dataset(vec![
            make_scored("a", "Alpha", &["reasoning"]),
            make_scored("b", "Beta", &["reasoning"]),
            make_scored("c", "Gamma", &["reasoning"]),
            make_scored("d", "Delta", &["vision"]),
        ]);

        let insights = mine(&data, &InsightConfig::default());

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].label, "reasoning");
        assert_eq!(insights[0].support(), 3);
        assert!((insights[0].confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_below_min_support_is_no_insight() {
        let data = dataset(vec![
            make_scored("a", "Alpha", &["vision"]),
            make_scored("b", "Beta", &["vision"]),
        ]);

        let insights = mine(&data, &InsightConfig::default());
        assert!(insights.is_empty());
    }

    #[test]
    fn test_title_similarity_clustering() {
        let config = InsightConfig {
            min_support: 3,
            title_similarity: 0.5,
            max_keywords: 8,
        };
        let data = dataset(vec![
            make_scored("a", "Sparse attention transformers", &[]),
            make_scored("b", "Sparse attention transformers revisited", &[]),
            make_scored("c", "Sparse attention transformers benchmark", &[]),
            make_scored("d", "Protein folding dynamics", &[]),
        ]);

        let insights = mine(&data, &config);

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].support(), 3);
        assert!(["attention", "sparse", "transformers"].contains(&insights[0].label.as_str()));
    }

    #[test]
    fn test_confidence_capped_and_ordering() {
        let data = dataset(vec![
            make_scored("a", "Alpha", &["vision", "reasoning"]),
            make_scored("b", "Beta", &["vision", "reasoning"]),
            make_scored("c", "Gamma", &["vision", "reasoning"]),
        ]);

        let insights = mine(&data, &InsightConfig::default());

        // Two tag groups, same confidence 1.0: ordered by label.
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0].label, "reasoning");
        assert_eq!(insights[1].label, "vision");
        assert!(insights.iter().all(|i| i.confidence <= 1.0));
    }

    #[test]
    fn test_mining_is_side_effect_free() {
        let data = dataset(vec![
            make_scored("a", "Alpha", &["vision"]),
            make_scored("b", "Beta", &["vision"]),
            make_scored("c", "Gamma", &["vision"]),
        ]);

        let first = mine(&data, &InsightConfig::default());
        let second = mine(&data, &InsightConfig::default());

        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].label, second[0].label);
        assert_eq!(data.len(), 3);
    }

    #[test]
    fn test_derive_keywords() {
        let data = dataset(vec![
            make_scored("a", "Sparse attention for vision", &["efficiency"]),
            make_scored("b", "Attention benchmarks", &["efficiency"]),
            make_scored("c", "Vision systems survey", &[]),
        ]);

        let keywords = derive_keywords(&data, 8);

        // attention x2, efficiency x2, vision x2; singletons dropped.
        assert_eq!(keywords, vec!["attention", "efficiency", "vision"]);
    }

    #[test]
    fn test_derive_keywords_respects_limit() {
        let data = dataset(vec![
            make_scored("a", "alpha beta gamma", &[]),
            make_scored("b", "alpha beta gamma", &[]),
        ]);

        let keywords = derive_keywords(&data, 2);
        assert_eq!(keywords.len(), 2);
    }

    #[test]
    fn test_tokenize_filters_noise() {
        let tokens = tokenize("The new state-of-the-art model for reasoning!");
        assert!(tokens.contains("state"));
        assert!(tokens.contains("reasoning"));
        assert!(!tokens.contains("the"));
        assert!(!tokens.contains("new"));
        assert!(!tokens.contains("for"));
    }

    #[test]
    fn test_jaccard() {
        let a: BTreeSet<String> = ["x", "y"].iter().map(|s| s.to_string()).collect();
        let b: BTreeSet<String> = ["y", "z"].iter().map(|s| s.to_string()).collect();
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }
}

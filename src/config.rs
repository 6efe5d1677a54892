//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `labdaily.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default relay set. Publication is best-effort fan-out, so the list is
/// intentionally broad; unreachable relays only cost their own timeout.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://relay.nostr.band",
    "wss://nostr.wine",
    "wss://relay.snort.social",
    "wss://nos.lol",
    "wss://relay.current.fyi",
    "wss://nostr.mom",
    "wss://relay.nostr.bg",
    "wss://nostr-pub.wellorder.net",
    "wss://relay.orangepill.dev",
    "wss://nostr.zebedee.cloud",
    "wss://relay.nostrich.de",
    "wss://nostr.rocks",
    "wss://relay.nostrati.com",
    "wss://relay.minds.com/nostr/v1/ws",
    "wss://nostr21.com",
    "wss://nostr.oxtr.dev",
    "wss://relay.mostr.pub",
    "wss://nostr.fmt.wiz.biz",
    "wss://relay.nostr.com.au",
    "wss://nostr.slothy.win",
    "wss://relay.minds.io",
    "wss://nostr.roundrockbitcoiners.com",
    "wss://nostr.developer.li",
    "wss://relay.nostr.info",
    "wss://nostr-relay.nokotaro.com",
    "wss://relay.nostrgraph.net",
    "wss://nostr.onsats.org",
    "wss://nostr.vulpem.com",
    "wss://relay.nostr.net",
    "wss://relay.nostr.vision",
    "wss://nostr.cheeserobot.org",
    "wss://relay.nostriches.org",
    "wss://nostr.fractalized.net",
    "wss://nostr.semisol.dev",
    "wss://relay.nostr.scot",
    "wss://relay.nostr.ch",
    "wss://relay.nostr.ro",
    "wss://nostr.koning-degraaf.nl",
    "wss://nostr.thesamecat.io",
    "wss://relay.nostrplebs.com",
    "wss://relay.nostr.wf",
    "wss://nostr-relay.alekberg.net",
    "wss://nostr.0x7e.xyz",
    "wss://relay.nostrified.org",
    "wss://relay.n057r.club",
    "wss://relay.nostr.nu",
    "wss://relay.nostrview.com",
];

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source collection settings.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Aggregation settings.
    #[serde(default)]
    pub aggregate: AggregateConfig,

    /// Insight mining settings.
    #[serde(default)]
    pub insights: InsightConfig,

    /// LLM enhancement settings.
    #[serde(default)]
    pub enhance: EnhanceConfig,

    /// Report output settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Relay publishing settings.
    #[serde(default)]
    pub publish: PublishConfig,
}

/// Where source collections are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Directory holding one subdirectory per source, each with
    /// `<date>.json` collection files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "data/sources".to_string()
}

/// Composite scoring and filtering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    /// Weight of the ingestion-time raw score in the composite blend.
    #[serde(default = "default_raw_weight")]
    pub raw_weight: f64,

    /// Weight of the per-source trust factor.
    #[serde(default = "default_trust_weight")]
    pub trust_weight: f64,

    /// Weight of the recency factor.
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,

    /// Days over which recency decays linearly to zero.
    #[serde(default = "default_recency_horizon")]
    pub recency_horizon_days: i64,

    /// Entries whose composite score falls below this are dropped.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,

    /// Trust factor per source id, in [0, 1].
    #[serde(default = "default_source_trust")]
    pub source_trust: BTreeMap<String, f64>,

    /// Trust factor for sources not listed in `source_trust`.
    #[serde(default = "default_trust")]
    pub default_trust: f64,

    /// Directory receiving per-run yield metrics JSON.
    #[serde(default = "default_metrics_dir")]
    pub metrics_dir: String,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            raw_weight: default_raw_weight(),
            trust_weight: default_trust_weight(),
            recency_weight: default_recency_weight(),
            recency_horizon_days: default_recency_horizon(),
            relevance_threshold: default_relevance_threshold(),
            source_trust: default_source_trust(),
            default_trust: default_trust(),
            metrics_dir: default_metrics_dir(),
        }
    }
}

fn default_raw_weight() -> f64 {
    0.6
}

fn default_trust_weight() -> f64 {
    0.25
}

fn default_recency_weight() -> f64 {
    0.15
}

fn default_recency_horizon() -> i64 {
    7
}

fn default_relevance_threshold() -> f64 {
    0.4
}

fn default_source_trust() -> BTreeMap<String, f64> {
    [
        ("arxiv", 0.9),
        ("paperswithcode", 0.85),
        ("huggingface", 0.7),
        ("official", 0.8),
        ("community", 0.5),
        ("tools", 0.55),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_trust() -> f64 {
    0.5
}

fn default_metrics_dir() -> String {
    "data/insights".to_string()
}

/// Pattern detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    /// Minimum supporting entries for a group to become an insight.
    #[serde(default = "default_min_support")]
    pub min_support: usize,

    /// Title-token Jaccard similarity at or above which two entries are
    /// considered part of the same pattern.
    #[serde(default = "default_title_similarity")]
    pub title_similarity: f64,

    /// Maximum derived keywords exposed to tagging and publication.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            min_support: default_min_support(),
            title_similarity: default_title_similarity(),
            max_keywords: default_max_keywords(),
        }
    }
}

fn default_min_support() -> usize {
    3
}

fn default_title_similarity() -> f64 {
    0.5
}

fn default_max_keywords() -> usize {
    8
}

/// LLM enhancement settings.
///
/// The retry budget bounds enhancement wall-clock: each backend spends at
/// most `max_attempts * timeout_seconds` plus the backoff sum (delay
/// doubles per attempt). With the defaults and two configured backends
/// that is roughly three minutes worst case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhanceConfig {
    /// Master toggle. When off, enhancement falls back without network.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path to the persona profiles JSON file.
    #[serde(default = "default_personas_file")]
    pub personas_file: String,

    /// Hard per-call timeout in seconds.
    #[serde(default = "default_enhance_timeout")]
    pub timeout_seconds: u64,

    /// Attempts per backend before advancing to the next one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            personas_file: default_personas_file(),
            timeout_seconds: default_enhance_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_personas_file() -> String {
    "config/personas.json".to_string()
}

fn default_enhance_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

/// Report composition and output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Site/report title prefix.
    #[serde(default = "default_site_title")]
    pub site_title: String,

    /// How many ranked entries the report highlights.
    #[serde(default = "default_top_entries")]
    pub top_entries: usize,

    /// Directory for the minimal (date-stamped) rendering.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,

    /// Directory for the rich collection rendering.
    #[serde(default = "default_collection_dir")]
    pub collection_dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            site_title: default_site_title(),
            top_entries: default_top_entries(),
            reports_dir: default_reports_dir(),
            collection_dir: default_collection_dir(),
        }
    }
}

fn default_site_title() -> String {
    "The Lab".to_string()
}

fn default_top_entries() -> usize {
    10
}

fn default_reports_dir() -> String {
    "docs/reports".to_string()
}

fn default_collection_dir() -> String {
    "docs/_daily".to_string()
}

/// Relay publishing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Master toggle for the publishing stage.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Relay endpoints (WebSocket URIs).
    #[serde(default = "default_relay_list")]
    pub relays: Vec<String>,

    /// Per-relay attempt timeout in seconds.
    #[serde(default = "default_relay_timeout")]
    pub relay_timeout_seconds: u64,

    /// Global budget for the whole publishing phase, in seconds. On
    /// expiry, in-flight attempts are abandoned and recorded as timeout.
    #[serde(default = "default_publish_budget")]
    pub publish_budget_seconds: u64,

    /// Minimum relay acknowledgments for publication to count as
    /// successful.
    #[serde(default = "default_min_acks")]
    pub min_acks: usize,

    /// Directory receiving one publication record JSON per run.
    #[serde(default = "default_records_dir")]
    pub records_dir: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            relays: default_relay_list(),
            relay_timeout_seconds: default_relay_timeout(),
            publish_budget_seconds: default_publish_budget(),
            min_acks: default_min_acks(),
            records_dir: default_records_dir(),
        }
    }
}

fn default_relay_list() -> Vec<String> {
    DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect()
}

fn default_relay_timeout() -> u64 {
    10
}

fn default_publish_budget() -> u64 {
    60
}

fn default_min_acks() -> usize {
    1
}

fn default_records_dir() -> String {
    "data/publications".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new("labdaily.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data_dir) = args.data_dir {
            self.sources.data_dir = data_dir.display().to_string();
        }

        if let Some(threshold) = args.threshold {
            self.aggregate.relevance_threshold = threshold;
        }

        if let Some(timeout) = args.timeout {
            self.enhance.timeout_seconds = timeout;
        }

        // Flags always win over the file.
        if args.no_enhance {
            self.enhance.enabled = false;
        }
        if args.no_publish {
            self.publish.enabled = false;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.aggregate.relevance_threshold, 0.4);
        assert_eq!(config.aggregate.recency_horizon_days, 7);
        assert_eq!(config.insights.min_support, 3);
        assert_eq!(config.publish.min_acks, 1);
        assert!(config.publish.relays.len() >= 48);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[sources]
data_dir = "custom/data"

[aggregate]
relevance_threshold = 0.6
raw_weight = 0.5

[aggregate.source_trust]
arxiv = 1.0

[publish]
min_acks = 3
relays = ["wss://relay.example"]
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.sources.data_dir, "custom/data");
        assert_eq!(config.aggregate.relevance_threshold, 0.6);
        assert_eq!(config.aggregate.raw_weight, 0.5);
        assert_eq!(config.aggregate.source_trust.get("arxiv"), Some(&1.0));
        assert_eq!(config.publish.min_acks, 3);
        assert_eq!(config.publish.relays, vec!["wss://relay.example"]);
        // Untouched sections keep their defaults.
        assert_eq!(config.enhance.timeout_seconds, 30);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[sources]"));
        assert!(toml_str.contains("[aggregate]"));
        assert!(toml_str.contains("[enhance]"));
        assert!(toml_str.contains("[publish]"));
    }

    #[test]
    fn test_default_toml_round_trips() {
        let toml_str = Config::default_toml();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            parsed.aggregate.relevance_threshold,
            Config::default().aggregate.relevance_threshold
        );
        assert_eq!(parsed.publish.relays.len(), Config::default().publish.relays.len());
    }
}

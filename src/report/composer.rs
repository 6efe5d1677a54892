//! Report composition and deterministic rendering.
//!
//! The report is built exactly once per run. Both renderings are pure
//! functions of the [`Report`] value: same report, same bytes. The rich
//! rendering carries full collection metadata; the minimal rendering
//! carries only identifying metadata. They share one body generator, so
//! they can never diverge in factual content.

use crate::config::ReportConfig;
use crate::models::{
    AggregatedDataset, EnhancementResult, Insight, Report, ScoredEntry, YieldMetrics,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::path::PathBuf;
use tracing::info;

/// The day's editorial focus, derived from what aggregation surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    /// Several top-scored entries appeared at once.
    Breakthrough,
    /// Multiple independent patterns converged.
    Convergence,
    /// A thin day.
    Quiet,
    Standard,
}

fn determine_focus(dataset: &AggregatedDataset, insights: &[Insight]) -> Focus {
    let top_scored = dataset.entries().iter().filter(|s| s.score >= 0.8).count();

    if top_scored >= 3 {
        Focus::Breakthrough
    } else if insights.len() >= 3 {
        Focus::Convergence
    } else if dataset.len() < 5 {
        Focus::Quiet
    } else {
        Focus::Standard
    }
}

/// Compose the deterministic markdown base analysis.
///
/// Pure function of its inputs; the enhancer receives this text and the
/// composed report embeds it verbatim.
pub fn compose_base_analysis(
    dataset: &AggregatedDataset,
    insights: &[Insight],
    metrics: &YieldMetrics,
    config: &ReportConfig,
    date: NaiveDate,
) -> String {
    let mut output = String::new();

    output.push_str(&generate_opening(dataset, insights, config, date));
    output.push_str(&generate_overview_section(dataset, insights, date));
    output.push_str(&generate_highlights_section(dataset, config));
    output.push_str(&generate_pattern_section(dataset, insights));
    output.push_str(&generate_watchlist_section(dataset));
    output.push_str(&generate_about_section(metrics, config));

    output
}

fn generate_opening(
    dataset: &AggregatedDataset,
    insights: &[Insight],
    config: &ReportConfig,
    date: NaiveDate,
) -> String {
    let focus = determine_focus(dataset, insights);

    let lede = match focus {
        Focus::Breakthrough => {
            "Multiple significant advances appeared today. Let's unpack what makes \
             them noteworthy and why they matter for the field's trajectory."
        }
        Focus::Convergence => {
            "Several research directions show convergence today, and that pattern \
             tells us something about where the field is headed."
        }
        Focus::Quiet => {
            "Not every day brings paradigm shifts. Today exemplifies steady, \
             incremental progress on established foundations."
        }
        Focus::Standard => {
            "Notable developments across multiple domains, each contributing to \
             our understanding in distinct ways."
        }
    };

    format!(
        "# {} - {}\n\n*Translating today's research into actionable intelligence.*\n\n{}\n",
        config.site_title, date, lede
    )
}

fn generate_overview_section(
    dataset: &AggregatedDataset,
    insights: &[Insight],
    date: NaiveDate,
) -> String {
    let top = dataset.entries().iter().filter(|s| s.score >= 0.8).count();
    let notable = dataset
        .entries()
        .iter()
        .filter(|s| s.score >= 0.6 && s.score < 0.8)
        .count();

    let mut section = String::new();
    section.push_str("\n---\n\n## Research Overview\n\n");
    section.push_str(&format!("- **Entries Analyzed**: {}\n", dataset.len()));
    section.push_str(&format!(
        "- **Highly Significant**: {} entries scored at or above 0.8\n",
        top
    ));
    section.push_str(&format!(
        "- **Notable Contributions**: {} entries scored 0.6 to 0.8\n",
        notable
    ));
    section.push_str(&format!(
        "- **Patterns Detected**: {} emerging directions\n",
        insights.len()
    ));
    section.push_str(&format!("- **Analysis Date**: {}\n\n", date));

    section
}

fn generate_highlights_section(dataset: &AggregatedDataset, config: &ReportConfig) -> String {
    let mut section = String::new();
    section.push_str("## Top Entries\n\n");

    for (i, scored) in dataset.top(config.top_entries).iter().enumerate() {
        section.push_str(&generate_highlight_block(i + 1, scored));
    }

    section
}

fn generate_highlight_block(rank: usize, scored: &ScoredEntry) -> String {
    let entry = &scored.entry;
    let mut block = String::new();

    block.push_str(&format!("### {}. {}\n\n", rank, entry.title));
    block.push_str(&format!(
        "**Score**: {:.2} | **Source**: {}\n\n",
        scored.score, entry.source_id
    ));

    if !entry.summary.is_empty() {
        block.push_str(&format!("{}\n\n", truncate(&entry.summary, 300)));
    }

    block.push_str(&format!("[Read more]({})\n\n---\n\n", entry.key));

    block
}

fn generate_pattern_section(dataset: &AggregatedDataset, insights: &[Insight]) -> String {
    if insights.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Pattern Analysis\n\n");
    section.push_str("*What today's entries tell us about field-wide trends:*\n\n");

    for insight in insights {
        section.push_str(&format!("### {}\n\n", title_case(&insight.label)));
        section.push_str(&format!(
            "**Signal Strength**: {} entries | **Confidence**: {:.0}%\n\n",
            insight.support(),
            insight.confidence * 100.0
        ));

        for key in &insight.supporting_keys {
            if let Some(scored) = dataset.entries().iter().find(|s| &s.entry.key == key) {
                section.push_str(&format!("- [{}]({})\n", scored.entry.title, key));
            }
        }

        section.push_str(&format!(
            "\nWhen {} independent groups converge on similar problems, it signals \
             an important direction.\n\n",
            insight.support()
        ));
    }

    section.push_str("---\n\n");
    section
}

fn generate_watchlist_section(dataset: &AggregatedDataset) -> String {
    let mut section = String::new();
    section.push_str("## What to Watch\n\n**Entries to track for impact**:\n");

    for scored in dataset.top(3) {
        section.push_str(&format!(
            "- {} (watch for citations and implementations)\n",
            truncate(&scored.entry.title, 60)
        ));
    }

    section.push('\n');
    section
}

fn generate_about_section(metrics: &YieldMetrics, config: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str(&format!("## About {}\n\n", config.site_title));
    section.push_str(
        "Daily research intelligence: the firehose filtered to the entries that \
         matter, with pattern detection across sources.\n\n",
    );
    section.push_str("### Today's Yield\n\n");
    section.push_str(&format!("- **Total Scanned**: {}\n", metrics.total_items));
    section.push_str(&format!(
        "- **High-Relevance**: {}\n",
        metrics.high_relevance_items
    ));
    section.push_str(&format!(
        "- **Curation Quality**: {:.2}\n",
        metrics.quality_ratio
    ));

    section
}

/// Assemble the final report value. Rendering happens separately and
/// repeatedly; this happens once.
#[allow(clippy::too_many_arguments)]
pub fn build_report(
    dataset: &AggregatedDataset,
    insights: Vec<Insight>,
    keywords: Vec<String>,
    base_analysis: String,
    enhancement: EnhancementResult,
    config: &ReportConfig,
    date: NaiveDate,
    generated_at: DateTime<Utc>,
) -> Report {
    Report {
        title: format!("{} - {}", config.site_title, date),
        date,
        generated_at,
        base_analysis,
        enhancement,
        insights,
        highlights: dataset.top(config.top_entries).to_vec(),
        keywords,
    }
}

/// The canonical report body shared by both renderings and the
/// publisher.
pub fn canonical_text(report: &Report) -> String {
    let mut body = report.base_analysis.clone();

    if let EnhancementResult::Enhanced {
        text,
        persona,
        backend,
    } = &report.enhancement
    {
        body.push_str(&format!(
            "\n\n## Enhanced Analysis\n\n*Persona: {} via {}*\n\n{}\n",
            persona, backend, text
        ));
    }

    body
}

/// Render the rich collection post: full descriptive front matter plus
/// the canonical body.
pub fn render_collection(report: &Report) -> String {
    let slug = collection_slug(report);
    let mut tags: Vec<String> = vec!["ai".to_string(), "research".to_string()];
    tags.extend(report.keywords.iter().cloned());

    let excerpt = format!(
        "Daily research intelligence for {}: {} highlighted entries, {} patterns",
        report.date,
        report.highlights.len(),
        report.insights.len()
    );

    let front_matter = format!(
        "---\nlayout: default\ntitle: \"{}\"\ndate: {}\ncategories: [research, daily]\ntags: [{}]\npermalink: /daily/{:04}/{:02}/{:02}/{}/\nexcerpt: \"{}\"\n---\n\n",
        report.title,
        report.generated_at.format("%Y-%m-%d %H:%M:%S %z"),
        tags.join(", "),
        report.date.year(),
        report.date.month(),
        report.date.day(),
        slug,
        excerpt,
    );

    format!("{}{}", front_matter, canonical_text(report))
}

/// Render the minimal rendering: identifying front matter only, same
/// body.
pub fn render_minimal(report: &Report) -> String {
    format!(
        "---\nlayout: default\ntitle: \"{}\"\ndate: {}\n---\n\n{}",
        report.title,
        report.date,
        canonical_text(report)
    )
}

/// Collection filename: date-plus-time stamp and slug.
pub fn collection_filename(report: &Report) -> String {
    format!(
        "{}-{}.md",
        report.generated_at.format("%Y-%m-%d-%H%M"),
        collection_slug(report)
    )
}

/// Minimal filename: date-only stamp.
pub fn minimal_filename(report: &Report) -> String {
    format!("lab-{}.md", report.date)
}

fn collection_slug(report: &Report) -> String {
    slugify(&format!("research-intelligence-{}", report.date))
}

/// Convert text to a URL-safe slug.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;

    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    slug.trim_end_matches('-').to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

fn title_case(label: &str) -> String {
    label
        .split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Write both renderings to their configured directories.
pub fn write_outputs(report: &Report, config: &ReportConfig) -> Result<(PathBuf, PathBuf)> {
    let collection_dir = PathBuf::from(&config.collection_dir);
    let reports_dir = PathBuf::from(&config.reports_dir);

    std::fs::create_dir_all(&collection_dir).with_context(|| {
        format!("Failed to create collection dir {}", collection_dir.display())
    })?;
    std::fs::create_dir_all(&reports_dir)
        .with_context(|| format!("Failed to create reports dir {}", reports_dir.display()))?;

    let collection_path = collection_dir.join(collection_filename(report));
    std::fs::write(&collection_path, render_collection(report))
        .with_context(|| format!("Failed to write {}", collection_path.display()))?;

    let minimal_path = reports_dir.join(minimal_filename(report));
    std::fs::write(&minimal_path, render_minimal(report))
        .with_context(|| format!("Failed to write {}", minimal_path.display()))?;

    info!(
        "Report written to {} and {}",
        collection_path.display(),
        minimal_path.display()
    );

    Ok((collection_path, minimal_path))
}

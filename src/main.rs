//! labdaily - Daily Research Intelligence Pipeline
//!
//! Aggregates per-source entry collections, mines cross-entry patterns,
//! optionally enhances the analysis through an LLM persona, writes two
//! report renderings, and fans the result out to Nostr relays.
//!
//! Exit codes:
//!   0 - Success (enhancement and publishing fallbacks included)
//!   1 - Runtime error (config, empty dataset, IO)

mod analysis;
mod cli;
mod config;
mod enhance;
mod models;
mod persona;
mod publish;
mod report;
mod sources;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use cli::Args;
use config::Config;
use models::{EnhancementResult, FallbackReason, Report, YieldMetrics};
use persona::{PersonaConfig, PersonaSelection};
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("labdaily v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_pipeline(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Run failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default labdaily.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new("labdaily.toml");

    if path.exists() {
        eprintln!("⚠️  labdaily.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write labdaily.toml")?;

    println!("✅ Created labdaily.toml with default settings.");
    println!("   Edit it to customize scoring weights, relays, personas, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete pipeline for one day.
async fn run_pipeline(args: Args) -> Result<()> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let date = args.run_date();
    let as_of = Utc::now();

    // Step 1: Load source collections
    println!("🔄 Loading source collections for {}...", date);
    let collections = sources::load_collections(Path::new(&config.sources.data_dir), date)?;

    for collection in &collections {
        println!(
            "  📚 {}: {} entries",
            collection.source_id,
            collection.entries.len()
        );
    }

    // Step 2: Aggregate into one ranked dataset. The one fatal stage:
    // an empty dataset aborts the run before any output is written.
    println!("🎯 Aggregating and filtering...");
    let outcome = analysis::aggregate(&collections, &config.aggregate, as_of)?;
    let dataset = outcome.dataset;

    println!(
        "✅ {} high-relevance entries (from {} total)",
        dataset.len(),
        outcome.total_seen
    );

    let metrics = YieldMetrics::new(
        date,
        outcome.total_seen,
        dataset.len(),
        config.aggregate.relevance_threshold,
    );

    // Step 3: Mine insights (optional enrichment, may be empty)
    let insights = analysis::mine(&dataset, &config.insights);
    let keywords = analysis::derive_keywords(&dataset, config.insights.max_keywords);
    println!("📈 {} patterns detected", insights.len());

    if args.dry_run {
        return handle_dry_run(&dataset, &insights);
    }

    if let Err(e) = analysis::write_yield_metrics(&metrics, Path::new(&config.aggregate.metrics_dir))
    {
        warn!("Failed to write yield metrics: {:#}", e);
    }

    // Step 4: Compose the base analysis and optionally enhance it
    let base_analysis =
        report::compose_base_analysis(&dataset, &insights, &metrics, &config.report, date);

    let enhancement = enhance_analysis(&args, &config, &base_analysis).await?;
    match &enhancement {
        EnhancementResult::Enhanced { persona, backend, .. } => {
            println!("🤖 Enhancement applied: persona '{}' via {}", persona, backend);
        }
        EnhancementResult::Fallback { reason } => {
            println!("🤖 Using base analysis (fallback: {})", reason);
        }
    }

    // Step 5: Build the report once, render and write it twice
    println!("📝 Generating report...");
    let report = report::build_report(
        &dataset,
        insights,
        keywords,
        base_analysis,
        enhancement,
        &config.report,
        date,
        Utc::now(),
    );

    let (collection_path, minimal_path) = report::write_outputs(&report, &config.report)?;
    println!("💾 Saved {}", collection_path.display());
    println!("💾 Saved {}", minimal_path.display());

    // Step 6: Best-effort relay publishing. The report is already
    // durable on disk; nothing here can fail the run.
    if config.publish.enabled {
        publish_report(&report, &config, &args, date).await;
    } else {
        println!("📡 Publishing disabled; skipping relay fan-out");
    }

    println!("\n✅ Run complete!");
    Ok(())
}

/// Handle --dry-run: show what would be reported, write nothing.
fn handle_dry_run(
    dataset: &models::AggregatedDataset,
    insights: &[models::Insight],
) -> Result<()> {
    println!("\n🔍 Dry run: no files written, no LLM calls, no publishing.\n");

    println!("   Top entries:");
    for scored in dataset.top(10) {
        println!("     📄 {:.2}  {}", scored.score, scored.entry.title);
    }

    if !insights.is_empty() {
        println!("\n   Patterns:");
        for insight in insights {
            println!(
                "     📈 {} ({} entries, confidence {:.2})",
                insight.label,
                insight.support(),
                insight.confidence
            );
        }
    }

    println!("\n✅ Dry run complete.");
    Ok(())
}

/// Resolve persona and backends, then run the enhancement chain.
///
/// A malformed persona file is a configuration error and fails the run;
/// a missing one just disables enhancement.
async fn enhance_analysis(
    args: &Args,
    config: &Config,
    base_analysis: &str,
) -> Result<EnhancementResult> {
    if !config.enhance.enabled {
        return Ok(EnhancementResult::Fallback {
            reason: FallbackReason::Disabled,
        });
    }

    let personas_path = Path::new(&config.enhance.personas_file);
    if !personas_path.exists() {
        warn!(
            "Persona file {} not found; skipping enhancement",
            personas_path.display()
        );
        return Ok(EnhancementResult::Fallback {
            reason: FallbackReason::Disabled,
        });
    }

    let personas = PersonaConfig::load(personas_path)?;

    let selection = args
        .persona
        .as_deref()
        .map(str::parse::<PersonaSelection>)
        .transpose()?;
    let (persona_name, profile) = personas.resolve(selection.as_ref())?;

    let backends = enhance::resolve_backends(config.enhance.timeout_seconds);
    if backends.is_empty() {
        info!("No backend credentials configured; enhancement will fall back");
    } else {
        println!(
            "🤖 Enhancing with persona '{}' ({} backend{} available)...",
            persona_name,
            backends.len(),
            if backends.len() == 1 { "" } else { "s" }
        );
    }

    let enhancer = enhance::PersonaEnhancer::new(backends, config.enhance.clone());
    Ok(enhancer.enhance(base_analysis, &persona_name, profile).await)
}

/// Sign and fan the report out to the configured relays. Every failure
/// path logs and returns; publishing is never fatal.
async fn publish_report(report: &Report, config: &Config, args: &Args, date: NaiveDate) {
    let private_key = match std::env::var("NOSTR_PRIVATE_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            warn!("NOSTR_PRIVATE_KEY not set; skipping relay publishing");
            println!("📡 No signing key configured; skipping relay fan-out");
            return;
        }
    };

    let keys = match publish::parse_keys(private_key.trim()) {
        Ok(keys) => keys,
        Err(e) => {
            warn!("Invalid signing key: {:#}", e);
            println!("📡 Invalid signing key; skipping relay fan-out");
            return;
        }
    };

    let canonical = report::canonical_text(report);
    let summary = format!("Daily research intelligence - {}", date);
    let published_at = Utc::now().timestamp().max(0) as u64;

    let event = match publish::build_event(
        &keys,
        &report.title,
        &canonical,
        &summary,
        &report.keywords,
        date,
        published_at,
    ) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to build publication event: {:#}", e);
            return;
        }
    };

    println!(
        "📡 Publishing to {} relays (quorum: {} ack{})...",
        config.publish.relays.len(),
        config.publish.min_acks,
        if config.publish.min_acks == 1 { "" } else { "s" }
    );

    let record = publish::publish(&event, &config.publish, !args.quiet).await;

    println!(
        "   {} {}/{} relays acknowledged",
        if record.quorum_met { "✅" } else { "⚠️ " },
        record.ack_count(),
        config.publish.relays.len()
    );

    if let Err(e) = publish::write_record(&record, Path::new(&config.publish.records_dir), date) {
        warn!("Failed to write publication record: {:#}", e);
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from labdaily.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

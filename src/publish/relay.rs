//! Concurrent relay fan-out.
//!
//! Every relay is attempted in parallel with its own timeout; one
//! relay's failure never blocks or fails another's attempt. A global
//! budget bounds the whole phase: when it elapses, in-flight attempts
//! are abandoned and recorded as timeouts. Quorum is evaluated only
//! once all attempts have completed or the budget has elapsed.

use crate::config::PublishConfig;
use crate::models::{PublicationRecord, RelayOutcome};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use futures::stream::FuturesUnordered;
use futures::{SinkExt, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use nostr::Event;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Fan the signed event out to every configured relay and account for
/// the results. Never fails: every relay ends up with an outcome and
/// the quorum verdict is recorded either way.
pub async fn publish(
    event: &Event,
    config: &PublishConfig,
    show_progress: bool,
) -> PublicationRecord {
    let payload = serde_json::json!(["EVENT", event]).to_string();
    let event_id = event.id.to_hex();
    let public_key = event.pubkey.to_hex();
    let published_at = event.created_at.as_u64() as i64;

    info!(
        "Publishing event {} to {} relays (budget {}s)",
        event_id,
        config.relays.len(),
        config.publish_budget_seconds
    );

    let progress = if show_progress {
        let bar = ProgressBar::new(config.relays.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner} [{bar:40}] {pos}/{len} relays")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let per_relay_timeout = Duration::from_secs(config.relay_timeout_seconds);
    let deadline = Instant::now() + Duration::from_secs(config.publish_budget_seconds);

    let attempts: Vec<_> = config
        .relays
        .iter()
        .map(|relay| {
            let relay = relay.clone();
            let payload = payload.clone();
            let event_id = event_id.clone();
            let progress = progress.clone();
            async move {
                let outcome = attempt_relay(&relay, &payload, &event_id, per_relay_timeout).await;
                progress.inc(1);
                (relay, outcome)
            }
        })
        .collect();

    let relay_results = collect_outcomes(attempts, &config.relays, deadline).await;
    progress.finish_and_clear();

    let ack_count = relay_results
        .values()
        .filter(|o| **o == RelayOutcome::Ok)
        .count();
    let quorum_met = ack_count >= config.min_acks;

    if quorum_met {
        info!(
            "Publication succeeded: {}/{} relays acknowledged (quorum {})",
            ack_count,
            config.relays.len(),
            config.min_acks
        );
    } else {
        warn!(
            "Publication quorum not met: {}/{} acknowledgments, needed {}",
            ack_count,
            config.relays.len(),
            config.min_acks
        );
    }

    PublicationRecord {
        event_id,
        public_key,
        relay_results,
        quorum_met,
        published_at,
    }
}

/// Drain attempt futures until they finish or the deadline passes.
/// Relays with no recorded outcome by then are marked as timeouts.
async fn collect_outcomes<F>(
    attempts: Vec<F>,
    relays: &[String],
    deadline: Instant,
) -> BTreeMap<String, RelayOutcome>
where
    F: Future<Output = (String, RelayOutcome)>,
{
    let mut in_flight: FuturesUnordered<F> = attempts.into_iter().collect();
    let mut results: BTreeMap<String, RelayOutcome> = BTreeMap::new();

    loop {
        match tokio::time::timeout_at(deadline, in_flight.next()).await {
            Ok(Some((relay, outcome))) => {
                debug!("Relay {}: {}", relay, outcome);
                results.insert(relay, outcome);
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    "Publishing budget elapsed; abandoning {} in-flight attempts",
                    in_flight.len()
                );
                break;
            }
        }
    }

    for relay in relays {
        results
            .entry(relay.clone())
            .or_insert(RelayOutcome::Timeout);
    }

    results
}

/// One bounded delivery attempt against a single relay.
async fn attempt_relay(
    relay: &str,
    payload: &str,
    event_id: &str,
    timeout: Duration,
) -> RelayOutcome {
    match tokio::time::timeout(timeout, deliver(relay, payload, event_id)).await {
        Ok(Ok(())) => RelayOutcome::Ok,
        Ok(Err(e)) => {
            debug!("Relay {} failed: {:#}", relay, e);
            RelayOutcome::Error
        }
        Err(_) => {
            debug!("Relay {} timed out", relay);
            RelayOutcome::Timeout
        }
    }
}

/// Connect, send the event frame, and wait for the matching OK frame.
async fn deliver(relay: &str, payload: &str, event_id: &str) -> Result<()> {
    let (mut ws, _) = connect_async(relay)
        .await
        .with_context(|| format!("connect to {}", relay))?;

    ws.send(Message::Text(payload.to_string()))
        .await
        .with_context(|| format!("send event to {}", relay))?;

    while let Some(message) = ws.next().await {
        let message = message.with_context(|| format!("read from {}", relay))?;

        if let Message::Text(text) = message {
            // Relays may interleave NOTICE/EOSE frames; only the OK
            // frame for our event id settles the attempt.
            match parse_ok_frame(&text, event_id) {
                Some(true) => {
                    let _ = ws.close(None).await;
                    return Ok(());
                }
                Some(false) => {
                    let _ = ws.close(None).await;
                    return Err(anyhow!("relay rejected event: {}", text));
                }
                None => continue,
            }
        }
    }

    Err(anyhow!("relay closed connection without acknowledging"))
}

/// Parse an `["OK", <event_id>, <accepted>, ...]` frame for our event.
fn parse_ok_frame(text: &str, event_id: &str) -> Option<bool> {
    let value: Value = serde_json::from_str(text).ok()?;
    let frame = value.as_array()?;

    if frame.first()?.as_str()? != "OK" {
        return None;
    }
    if frame.get(1)?.as_str()? != event_id {
        return None;
    }
    frame.get(2)?.as_bool()
}

/// Persist the publication record under a dated path.
pub fn write_record(
    record: &PublicationRecord,
    records_dir: &Path,
    date: NaiveDate,
) -> Result<PathBuf> {
    std::fs::create_dir_all(records_dir)
        .with_context(|| format!("Failed to create {}", records_dir.display()))?;

    let path = records_dir.join(format!("{}.json", date));
    let json = serde_json::to_string_pretty(record).context("Failed to serialize record")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Publication record saved to {}", path.display());
    Ok(path)
}

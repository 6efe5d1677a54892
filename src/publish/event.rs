//! Publication event construction and signing.
//!
//! One long-form content event (kind 30023) per run: the canonical
//! report text as content, discovery tags derived from the day's
//! keywords, and a stable per-day identifier so republishing a day
//! replaces the previous version.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use nostr::{Event, EventBuilder, Keys, Tag, Timestamp};

/// Fixed topic hashtags carried on every publication.
const FIXED_TOPICS: &[&str] = &["ai", "research", "llm"];

/// Parse the signing key from raw hex. The public key is always
/// derived from it, never supplied separately.
pub fn parse_keys(private_key_hex: &str) -> Result<Keys> {
    Keys::parse(private_key_hex).context("Invalid signing key (expected raw hex private key)")
}

/// Build and sign the publication event.
///
/// `published_at` is the Unix timestamp stamped both into the event's
/// creation time and its `published_at` tag, so the event and the
/// publication record always agree.
pub fn build_event(
    keys: &Keys,
    title: &str,
    content: &str,
    summary: &str,
    keywords: &[String],
    date: NaiveDate,
    published_at: u64,
) -> Result<Event> {
    let stamp = published_at.to_string();
    let mut tags: Vec<Tag> = vec![
        Tag::identifier(format!("ai-research-{}", date)),
        Tag::parse(["title", title]).context("Failed to build title tag")?,
        Tag::parse(["published_at", stamp.as_str()])
            .context("Failed to build published_at tag")?,
    ];

    if !summary.is_empty() {
        let excerpt: String = summary.chars().take(200).collect();
        tags.push(
            Tag::parse(["summary", excerpt.as_str()]).context("Failed to build summary tag")?,
        );
    }

    for topic in FIXED_TOPICS {
        tags.push(Tag::hashtag(*topic));
    }
    for keyword in keywords {
        let keyword = keyword.to_lowercase();
        if !FIXED_TOPICS.contains(&keyword.as_str()) {
            tags.push(Tag::hashtag(keyword));
        }
    }

    let event = EventBuilder::long_form_text_note(content)
        .tags(tags)
        .custom_created_at(Timestamp::from(published_at))
        .sign_with_keys(keys)
        .context("Failed to sign publication event")?;

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{JsonUtil, Kind};

    // Throwaway test key, never used for real publishing.
    const TEST_KEY: &str = "5a1c6b2f3e4d5c6b7a8f9e0d1c2b3a4f5e6d7c8b9a0f1e2d3c4b5a6f7e8d9c0b";

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn test_parse_keys_derives_public_key() {
        let keys = parse_keys(TEST_KEY).unwrap();
        assert!(!keys.public_key().to_hex().is_empty());
    }

    #[test]
    fn test_parse_keys_rejects_garbage() {
        assert!(parse_keys("not-a-key").is_err());
    }

    #[test]
    fn test_build_event_kind_and_tags() {
        let keys = parse_keys(TEST_KEY).unwrap();
        let event = build_event(
            &keys,
            "The Lab - 2025-06-01",
            "# Report body",
            "Daily research intelligence",
            &["attention".to_string()],
            test_date(),
            1_750_000_000,
        )
        .unwrap();

        assert_eq!(event.kind, Kind::LongFormTextNote);

        let json = event.as_json();
        assert!(json.contains("ai-research-2025-06-01"));
        assert!(json.contains("The Lab - 2025-06-01"));
        assert!(json.contains("published_at"));
        assert!(json.contains("attention"));
        assert!(event.verify().is_ok());
    }

    #[test]
    fn test_build_event_deduplicates_fixed_topics() {
        let keys = parse_keys(TEST_KEY).unwrap();
        let event = build_event(
            &keys,
            "Title",
            "Body",
            "",
            &["AI".to_string(), "agents".to_string()],
            test_date(),
            1_750_000_000,
        )
        .unwrap();

        let json: serde_json::Value = serde_json::from_str(&event.as_json()).unwrap();
        let hashtag_count = json["tags"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|t| t.get(0).and_then(|v| v.as_str()) == Some("t"))
            .count();

        // ai, research, llm from the fixed set plus the one new keyword.
        assert_eq!(hashtag_count, 4);
    }

    #[test]
    fn test_event_timestamp_matches_published_at() {
        let keys = parse_keys(TEST_KEY).unwrap();
        let published_at = 1_750_000_000u64;
        let event = build_event(
            &keys,
            "Title",
            "Body",
            "",
            &[],
            test_date(),
            published_at,
        )
        .unwrap();

        assert_eq!(event.created_at.as_u64(), published_at);
    }
}

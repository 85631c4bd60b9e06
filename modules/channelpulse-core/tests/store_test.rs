//! Store behavior against an in-memory SQLite database.

use chrono::{Duration, Utc};

use channelpulse_common::{Insight, SourceKind, Stance, TopicSummary};
use channelpulse_core::Store;

#[tokio::test]
async fn upsert_source_is_idempotent_and_refreshes_fields() {
    let store = Store::open_in_memory().await.unwrap();

    let first = store
        .upsert_source("https://t.me/foo", "Foo", SourceKind::Telegram, "News")
        .await
        .unwrap();
    let second = store
        .upsert_source("https://t.me/foo", "Foo Renamed", SourceKind::Telegram, "Crypto")
        .await
        .unwrap();

    assert_eq!(first.id, second.id);

    let grouped = store.list_sources_by_category().await.unwrap();
    assert_eq!(grouped.len(), 1);
    let (category, sources) = grouped.iter().next().unwrap();
    assert_eq!(category, "Crypto");
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].name, "Foo Renamed");
}

#[tokio::test]
async fn record_message_deduplicates_on_the_natural_key() {
    let store = Store::open_in_memory().await.unwrap();
    let now = Utc::now();

    let first = store
        .record_message("telegram", "foo", 100, "https://t.me/foo", now, "hello")
        .await
        .unwrap();
    assert!(first.inserted);

    let second = store
        .record_message("telegram", "foo", 100, "https://t.me/foo", now, "hello again")
        .await
        .unwrap();
    assert!(!second.inserted);
    assert_eq!(first.id, second.id);

    // Same message id in a different channel is a distinct row.
    let other = store
        .record_message("telegram", "bar", 100, "https://t.me/bar", now, "hi")
        .await
        .unwrap();
    assert!(other.inserted);
    assert_ne!(other.id, first.id);
}

#[tokio::test]
async fn window_query_orders_by_timestamp_and_filters_sources() {
    let store = Store::open_in_memory().await.unwrap();
    let base = Utc::now() - Duration::hours(12);

    store
        .record_message("telegram", "foo", 2, "https://t.me/foo", base + Duration::hours(2), "b")
        .await
        .unwrap();
    store
        .record_message("telegram", "foo", 1, "https://t.me/foo", base + Duration::hours(1), "a")
        .await
        .unwrap();
    store
        .record_message("telegram", "bar", 3, "https://t.me/bar", base + Duration::hours(3), "c")
        .await
        .unwrap();
    // Outside the window below.
    store
        .record_message("telegram", "foo", 4, "https://t.me/foo", base - Duration::hours(5), "old")
        .await
        .unwrap();

    let window = store
        .get_messages_in_window(&[], base, base + Duration::hours(6))
        .await
        .unwrap();
    let texts: Vec<&str> = window.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["a", "b", "c"]);

    let only_foo = store
        .get_messages_in_window(
            &["https://t.me/foo".to_string()],
            base,
            base + Duration::hours(6),
        )
        .await
        .unwrap();
    assert_eq!(only_foo.len(), 2);
    assert!(only_foo.iter().all(|m| m.source_url == "https://t.me/foo"));
}

#[tokio::test]
async fn resolved_links_attach_and_read_back() {
    let store = Store::open_in_memory().await.unwrap();
    let record = store
        .record_message("telegram", "foo", 1, "https://t.me/foo", Utc::now(), "x")
        .await
        .unwrap();

    store
        .attach_resolved_links(record.id, r#"{"https://ex.com/1":"summary"}"#)
        .await
        .unwrap();

    let message = store.get_message(record.id).await.unwrap().unwrap();
    assert_eq!(
        message.resolved_links.as_deref(),
        Some(r#"{"https://ex.com/1":"summary"}"#)
    );
    assert!(store.get_message(9999).await.unwrap().is_none());
}

#[tokio::test]
async fn link_summaries_upsert_by_url() {
    let store = Store::open_in_memory().await.unwrap();

    assert!(store.get_link_summary("https://ex.com/1").await.unwrap().is_none());
    store.put_link_summary("https://ex.com/1", "first").await.unwrap();
    store.put_link_summary("https://ex.com/1", "second").await.unwrap();
    assert_eq!(
        store.get_link_summary("https://ex.com/1").await.unwrap().as_deref(),
        Some("second")
    );
}

#[tokio::test]
async fn topic_summaries_append_and_insights_overwrite() {
    let store = Store::open_in_memory().await.unwrap();
    let topic = TopicSummary {
        id: None,
        topic: "DeFi Protocol Launch".to_string(),
        metatopic: "DeFi".to_string(),
        importance: 8,
        summary: "launches".to_string(),
        message_ids: vec![1, 2],
    };
    let first_id = store.save_topic_summary(&topic).await.unwrap();
    let second_id = store.save_topic_summary(&topic).await.unwrap();
    // Topic summaries are an append-only log of analyses.
    assert_ne!(first_id, second_id);

    let insight = Insight {
        analysis_summary: "v1".to_string(),
        stance: Stance::Long,
        rationale_long: None,
        rationale_short: None,
        rationale_neutral: None,
        risks_and_watchouts: None,
        key_questions_for_user: None,
        suggested_instruments_long: None,
        suggested_instruments_short: None,
        useful_resources: None,
    };
    store.save_insight("DeFi Protocol Launch", &insight).await.unwrap();
    let updated = Insight {
        analysis_summary: "v2".to_string(),
        ..insight
    };
    // Overwrite by topic must not error on the unique key.
    store.save_insight("DeFi Protocol Launch", &updated).await.unwrap();
}

#[tokio::test]
async fn duplicate_subscribers_collapse_to_one_row() {
    let store = Store::open_in_memory().await.unwrap();

    assert!(store.add_subscriber("x@y.z", Some("main")).await.unwrap());
    assert!(!store.add_subscriber("x@y.z", None).await.unwrap());
    assert_eq!(store.subscriber_count().await.unwrap(), 1);
}

#[tokio::test]
async fn processed_flag_flips_for_consumed_messages() {
    let store = Store::open_in_memory().await.unwrap();
    let now = Utc::now();
    let a = store
        .record_message("telegram", "foo", 1, "https://t.me/foo", now, "a")
        .await
        .unwrap();
    let b = store
        .record_message("telegram", "foo", 2, "https://t.me/foo", now, "b")
        .await
        .unwrap();

    store.mark_messages_processed(&[a.id]).await.unwrap();

    assert!(store.get_message(a.id).await.unwrap().unwrap().processed);
    assert!(!store.get_message(b.id).await.unwrap().unwrap().processed);
}

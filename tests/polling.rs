//! Integration tests for the polling loop: repeated rounds against a live
//! store, failure isolation, cancellation and round scheduling.

mod common;

use common::{rss, MockFetcher};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use feedline::feed::{FetchSettings, HttpFetcher};
use feedline::sync::{poll_once, sync_source};
use feedline::util::UrlValidator;
use feedline::{spawn_poller, PollConfig, Store, Submission, SubmitOutcome};

const FEED_A: &str = "https://a.example.com/rss";
const FEED_B: &str = "https://b.example.com/rss";

fn poll_config(interval: Duration) -> PollConfig {
    PollConfig {
        interval,
        max_concurrent_fetches: 10,
    }
}

async fn subscribed(fetcher: &MockFetcher, addresses: &[&str]) -> Store {
    let store = Store::new();
    for address in addresses {
        sync_source(&store, fetcher, address).await.unwrap();
    }
    store
}

// ============================================================================
// Single Round Tests
// ============================================================================

#[tokio::test]
async fn test_unchanged_document_adds_nothing() {
    let fetcher = MockFetcher::new();
    fetcher.serve(FEED_A, rss("A", &[("One", "https://a/1"), ("Two", "https://a/2")]));
    let store = subscribed(&fetcher, &[FEED_A]).await;
    let mut changes = store.subscribe_channel(None);

    for _ in 0..3 {
        let results = poll_once(&store, &fetcher, 10).await;
        assert_eq!(results.len(), 1);
        assert_eq!(*results[0].outcome.as_ref().unwrap(), 0);
    }

    assert_eq!(store.feeds().len(), 1);
    assert_eq!(store.entries().len(), 2);
    assert!(changes.try_recv().is_err(), "re-polling must not notify");
}

#[tokio::test]
async fn test_new_items_are_appended_after_existing() {
    let fetcher = MockFetcher::new();
    fetcher.serve(FEED_A, rss("A", &[("One", "https://a/1")]));
    let store = subscribed(&fetcher, &[FEED_A]).await;

    fetcher.serve(
        FEED_A,
        rss("A", &[("Two", "https://a/2"), ("One", "https://a/1")]),
    );
    let results = poll_once(&store, &fetcher, 10).await;

    assert_eq!(*results[0].outcome.as_ref().unwrap(), 1);
    let links: Vec<String> = store.entries().into_iter().map(|e| e.link).collect();
    assert_eq!(links, vec!["https://a/1", "https://a/2"]);
}

#[tokio::test]
async fn test_failing_source_does_not_block_others() {
    let fetcher = MockFetcher::new();
    fetcher.serve(FEED_A, rss("A", &[("One", "https://a/1")]));
    fetcher.serve(FEED_B, rss("B", &[("Uno", "https://b/1")]));
    let store = subscribed(&fetcher, &[FEED_A, FEED_B]).await;

    fetcher.fail(FEED_A, 500);
    fetcher.serve(FEED_B, rss("B", &[("Uno", "https://b/1"), ("Dos", "https://b/2")]));

    let results = poll_once(&store, &fetcher, 10).await;
    assert_eq!(results.len(), 2);

    let a = results.iter().find(|r| r.source_address == FEED_A).unwrap();
    let b = results.iter().find(|r| r.source_address == FEED_B).unwrap();
    assert!(a.outcome.is_err());
    assert_eq!(*b.outcome.as_ref().unwrap(), 1);
    assert!(store.entry("https://b/2").is_some());
    assert_eq!(store.entries().len(), 3);
}

#[tokio::test]
async fn test_malformed_poll_leaves_store_unchanged() {
    let fetcher = MockFetcher::new();
    fetcher.serve(FEED_A, rss("A", &[("One", "https://a/1")]));
    let store = subscribed(&fetcher, &[FEED_A]).await;

    fetcher.serve(FEED_A, "<rss><channel><title>broken");
    let results = poll_once(&store, &fetcher, 10).await;

    assert!(results[0].outcome.is_err());
    assert_eq!(store.entries().len(), 1);
    assert_eq!(store.feeds()[0].title, "A");
}

#[tokio::test]
async fn test_changed_channel_metadata_is_not_refreshed() {
    let fetcher = MockFetcher::new();
    fetcher.serve(FEED_A, rss("A", &[("One", "https://a/1")]));
    let store = subscribed(&fetcher, &[FEED_A]).await;
    let mut changes = store.subscribe_channel(None);

    fetcher.serve(FEED_A, rss("Renamed", &[("One", "https://a/1")]));
    let results = poll_once(&store, &fetcher, 10).await;

    assert_eq!(*results[0].outcome.as_ref().unwrap(), 0);
    let feeds = store.feeds();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].title, "A");
    assert_eq!(feeds[0].description, "A news");
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_round_with_no_feeds_fetches_nothing() {
    let fetcher = MockFetcher::new();
    let store = Store::new();

    let results = poll_once(&store, &fetcher, 10).await;

    assert!(results.is_empty());
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_round_respects_concurrency_bound() {
    let fetcher = MockFetcher::with_delay(Duration::from_millis(100));
    let addresses: Vec<String> = (0..5)
        .map(|i| format!("https://f{}.example.com/rss", i))
        .collect();
    for address in &addresses {
        fetcher.serve(address, rss(address, &[]));
    }
    let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
    let store = subscribed(&fetcher, &refs).await;

    let results = poll_once(&store, &fetcher, 2).await;

    assert_eq!(results.len(), 5);
    assert_eq!(fetcher.max_active(), 2);
}

// ============================================================================
// Polling Loop Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_feed_added_between_rounds_is_polled() {
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.serve(FEED_A, rss("A", &[("One", "https://a/1")]));
    let store = subscribed(&fetcher, &[FEED_A]).await;

    let (tx, mut rx) = mpsc::channel(4);
    let poller = spawn_poller(
        store.clone(),
        fetcher.clone(),
        poll_config(Duration::from_secs(5)),
        Some(tx),
    );

    let first = rx.recv().await.unwrap();
    assert_eq!(first.round, 1);
    assert_eq!(first.results.len(), 1);

    fetcher.serve(FEED_B, rss("B", &[("Uno", "https://b/1")]));
    sync_source(&store, fetcher.as_ref(), FEED_B).await.unwrap();

    let second = rx.recv().await.unwrap();
    assert_eq!(second.round, 2);
    assert_eq!(second.results.len(), 2);
    assert_eq!(fetcher.calls(FEED_B), 2);

    poller.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rounds_do_not_overlap() {
    // Fetches take longer than the interval
    let fetcher = Arc::new(MockFetcher::with_delay(Duration::from_secs(3)));
    fetcher.serve(FEED_A, rss("A", &[("One", "https://a/1")]));
    let store = subscribed(&fetcher, &[FEED_A]).await;

    let (tx, mut rx) = mpsc::channel(4);
    let poller = spawn_poller(
        store.clone(),
        fetcher.clone(),
        poll_config(Duration::from_secs(1)),
        Some(tx),
    );

    for expected in 1..=3 {
        let report = rx.recv().await.unwrap();
        assert_eq!(report.round, expected);
    }

    poller.stop().await.unwrap();
    assert_eq!(fetcher.max_active(), 1);
    assert_eq!(store.entries().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_first_round_fetches_nothing() {
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.serve(FEED_A, rss("A", &[]));
    let store = subscribed(&fetcher, &[FEED_A]).await;

    let poller = spawn_poller(
        store,
        fetcher.clone(),
        poll_config(Duration::from_secs(3600)),
        None,
    );
    poller.stop().await.unwrap();

    // Only the initial subscription fetch
    assert_eq!(fetcher.total_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_abandons_round_in_flight() {
    let fetcher = Arc::new(MockFetcher::with_delay(Duration::from_secs(60)));
    fetcher.serve(FEED_A, rss("A", &[("One", "https://a/1")]));
    let store = subscribed(&fetcher, &[FEED_A]).await;

    let (tx, mut rx) = mpsc::channel(4);
    let poller = spawn_poller(
        store.clone(),
        fetcher.clone(),
        poll_config(Duration::from_secs(1)),
        Some(tx),
    );

    // Let the first round start, then cancel while its fetch is sleeping
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fetcher.calls(FEED_A), 2);
    poller.stop().await.unwrap();

    assert!(rx.recv().await.is_none(), "no report for a cancelled round");
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_report_channel_is_full() {
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.serve(FEED_A, rss("A", &[("One", "https://a/1")]));
    let store = subscribed(&fetcher, &[FEED_A]).await;

    // Held but never drained
    let (tx, _rx) = mpsc::channel(1);
    let poller = spawn_poller(
        store,
        fetcher.clone(),
        poll_config(Duration::from_secs(1)),
        Some(tx),
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(fetcher.calls(FEED_A) >= 3);

    tokio::time::timeout(Duration::from_secs(60), poller.stop())
        .await
        .expect("stop must not wait on a full report channel")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_never_polls() {
    let fetcher = Arc::new(MockFetcher::new());
    fetcher.serve(FEED_A, rss("A", &[("One", "https://a/1")]));
    let store = subscribed(&fetcher, &[FEED_A]).await;

    let (tx, mut rx) = mpsc::channel(4);
    let poller = spawn_poller(store, fetcher.clone(), poll_config(Duration::ZERO), Some(tx));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fetcher.total_calls(), 1);

    tokio::time::timeout(Duration::from_secs(5), poller.stop())
        .await
        .expect("poller should stop")
        .unwrap();
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_token_stops_loop() {
    let fetcher = Arc::new(MockFetcher::new());
    let poller = spawn_poller(
        Store::new(),
        fetcher,
        poll_config(Duration::from_secs(1)),
        None,
    );

    poller.cancel_token().cancel();
    tokio::time::timeout(Duration::from_secs(5), poller.stop())
        .await
        .expect("poller should stop")
        .unwrap();
}

// ============================================================================
// End-to-End
// ============================================================================

#[tokio::test]
async fn test_poller_picks_up_new_items_over_http() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(rss("Live", &[("First", "https://live/1")])),
        )
        .mount(&server)
        .await;

    let address = format!("{}/feed.xml", server.uri());
    let store = Store::new();
    let fetcher = Arc::new(HttpFetcher::new(FetchSettings::default()).unwrap());
    let submission = Submission::new(
        store.clone(),
        fetcher.clone(),
        Arc::new(UrlValidator::new(true)),
    );

    match submission.submit(&address).await {
        SubmitOutcome::Subscribed { new_entries, .. } => assert_eq!(new_entries, 1),
        other => panic!("expected subscription, got {:?}", other),
    }

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(rss(
            "Live",
            &[("Second", "https://live/2"), ("First", "https://live/1")],
        )))
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::channel(4);
    let poller = spawn_poller(
        store.clone(),
        fetcher,
        poll_config(Duration::from_millis(50)),
        Some(tx),
    );

    let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("round should complete")
        .unwrap();
    poller.stop().await.unwrap();

    assert_eq!(report.new_entries(), 1);
    assert_eq!(report.failures().count(), 0);
    let titles: Vec<String> = store.entries().into_iter().map(|e| e.title).collect();
    assert_eq!(titles, vec!["First", "Second"]);
}

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use feedline::feed::{Fetch, FetchError};

/// RSS document with the given channel title and `(title, link)` items.
pub fn rss(title: &str, items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(t, l)| {
            format!(
                "<item><title>{}</title><description>About {}</description><link>{}</link></item>",
                t, t, l
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{}</title><description>{} news</description>{}</channel></rss>"#,
        title, title, items
    )
}

#[derive(Clone)]
enum Response {
    Body(String),
    Status(u16),
}

/// In-memory [`Fetch`] with per-address responses and call accounting.
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Response>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn serve(&self, address: &str, body: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .insert(address.to_string(), Response::Body(body.into()));
    }

    pub fn fail(&self, address: &str, status: u16) {
        self.responses
            .lock()
            .unwrap()
            .insert(address.to_string(), Response::Status(status));
    }

    pub fn calls(&self, address: &str) -> usize {
        self.calls.lock().unwrap().get(address).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Highest number of fetches observed in flight at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for MockFetcher {
    async fn fetch(&self, address: &str) -> Result<String, FetchError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default() += 1;

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let response = self.responses.lock().unwrap().get(address).cloned();

        self.active.fetch_sub(1, Ordering::SeqCst);

        match response {
            Some(Response::Body(body)) => Ok(body),
            Some(Response::Status(code)) => Err(FetchError::HttpStatus(code)),
            None => Err(FetchError::HttpStatus(404)),
        }
    }
}

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{sync_source, SyncError};
use crate::config::Config;
use crate::feed::Fetch;
use crate::store::Store;

/// Timing and fan-out of the polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Delay between the end of one round and the start of the next
    pub interval: Duration,
    /// Fetches running at the same time within one round
    pub max_concurrent_fetches: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PollConfig {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            max_concurrent_fetches: config.max_concurrent_fetches,
        }
    }
}

/// Result of synchronizing one source during a round.
#[derive(Debug)]
pub struct SourceReport {
    pub source_address: String,
    /// Number of new entries appended, or why the source was skipped
    pub outcome: Result<usize, SyncError>,
}

/// Everything that happened during one poll round.
///
/// Results are in completion order, not subscription order.
#[derive(Debug)]
pub struct RoundReport {
    /// 1-based round counter
    pub round: u64,
    pub results: Vec<SourceReport>,
}

impl RoundReport {
    pub fn new_entries(&self) -> usize {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok())
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SourceReport> {
        self.results.iter().filter(|r| r.outcome.is_err())
    }
}

/// Handle to a running polling loop.
pub struct PollerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl PollerHandle {
    /// Token that stops the loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the loop, dropping any fetches still in flight, and wait for it.
    pub async fn stop(self) -> Result<(), JoinError> {
        self.cancel.cancel();
        self.join.await
    }
}

/// Runs one round: synchronizes every address currently in the store.
///
/// The address list is read from the live store at call time. Sources are
/// fetched concurrently, at most `max_concurrent` at once, and each applies
/// its own merge as soon as it completes. A failing source is logged and
/// reported without affecting the others.
pub async fn poll_once(
    store: &Store,
    fetcher: &dyn Fetch,
    max_concurrent: usize,
) -> Vec<SourceReport> {
    let addresses = store.feed_addresses();
    if addresses.is_empty() {
        return Vec::new();
    }

    stream::iter(addresses)
        .map(|source_address| async move {
            let outcome = sync_source(store, fetcher, &source_address)
                .await
                .map(|merged| merged.added_entries.len());

            match &outcome {
                Ok(0) => tracing::trace!(feed = %source_address, "No new entries"),
                Ok(added) => {
                    tracing::info!(feed = %source_address, new_entries = added, "Feed updated")
                }
                Err(e) => tracing::warn!(feed = %source_address, error = %e, "Feed poll failed"),
            }

            SourceReport {
                source_address,
                outcome,
            }
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await
}

/// Starts the polling loop on the current tokio runtime.
///
/// The loop waits `config.interval`, runs a round with [`poll_once`], and
/// only then schedules the next wait, so rounds never overlap and a slow
/// round stretches the effective period. Feeds added to the store between
/// rounds are part of the next round.
///
/// When `report_tx` is given, every finished round is sent on it. A dropped
/// receiver does not stop the loop; a full channel delays the next round
/// until there is room or the loop is stopped.
///
/// The loop runs until [`PollerHandle::stop`] is called or its cancel token
/// is cancelled; cancellation also abandons the fetches of a round in flight.
/// A zero interval disables automatic polling: no round ever runs and the
/// task only waits to be stopped.
pub fn spawn_poller(
    store: Store,
    fetcher: Arc<dyn Fetch>,
    config: PollConfig,
    report_tx: Option<mpsc::Sender<RoundReport>>,
) -> PollerHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let join = tokio::spawn(async move {
        if config.interval.is_zero() {
            tracing::debug!("Automatic polling disabled (interval 0)");
            token.cancelled().await;
            return;
        }

        let mut round: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(config.interval) => {}
            }

            round += 1;
            let results = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!(round = round, "Poll round cancelled in flight");
                    break;
                }
                results = poll_once(&store, fetcher.as_ref(), config.max_concurrent_fetches) => results,
            };

            let report = RoundReport { round, results };
            tracing::debug!(
                round = round,
                sources = report.results.len(),
                new_entries = report.new_entries(),
                "Poll round complete"
            );

            if let Some(tx) = &report_tx {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    sent = tx.send(report) => {
                        if let Err(e) = sent {
                            tracing::debug!(error = %e, "Round report receiver dropped");
                        }
                    }
                }
            }
        }

        tracing::info!(rounds = round, "Poller stopped");
    });

    PollerHandle { cancel, join }
}

//! Synchronization of subscribed feeds into the [`Store`].
//!
//! [`sync_source`] is the single fetch → parse → merge step shared by the
//! polling loop and the submission flow. [`spawn_poller`] repeats it for every
//! known source on a fixed delay until stopped.

mod poller;

pub use poller::{poll_once, spawn_poller, PollConfig, PollerHandle, RoundReport, SourceReport};

use thiserror::Error;

use crate::feed::{parse, Fetch, FetchError, MergeOutcome, ParseError};
use crate::store::Store;

/// Outcome of synchronizing one source that did not reach the store.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Not a feed: {0}")]
    Parse(#[from] ParseError),
}

/// Fetch, parse and merge one source, applying the result to `store`.
///
/// The store is only touched after the document parsed successfully, so a
/// failure leaves it unchanged.
pub async fn sync_source(
    store: &Store,
    fetcher: &dyn Fetch,
    source_address: &str,
) -> Result<MergeOutcome, SyncError> {
    let raw = fetcher.fetch(source_address).await?;
    let parsed = parse(&raw, Some(source_address))?;
    Ok(store.merge_parsed(parsed, source_address))
}

//! Submission of a new feed address.
//!
//! The flow moves the store's [`SubmissionStatus`] through
//! `Idle → Validating → Fetching → Success | Failure → Idle`, so a renderer
//! subscribed to [`StorePath::Submission`](crate::store::StorePath) sees every
//! step. Failures carry a symbolic [`Reason`], never display text.

use std::sync::Arc;

use crate::feed::Fetch;
use crate::store::{Phase, Reason, Store, SubmissionStatus};
use crate::sync::{sync_source, SyncError};
use crate::util::{Validate, ValidationError};

/// Result of one call to [`Submission::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The address was fetched and merged into the store
    Subscribed {
        source_address: String,
        new_entries: usize,
    },
    /// The submission ended in the failure phase
    Failed(Reason),
    /// Another submission is still running; nothing changed
    Busy,
}

/// Returns the status to idle if a submission future is dropped midway.
struct IdleGuard<'a> {
    store: &'a Store,
    armed: bool,
}

impl Drop for IdleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("Submission abandoned, resetting status");
            self.store.set_submission(SubmissionStatus::default());
        }
    }
}

/// Drives the submission state machine against one store.
pub struct Submission {
    store: Store,
    fetcher: Arc<dyn Fetch>,
    validator: Arc<dyn Validate>,
}

impl Submission {
    pub fn new(store: Store, fetcher: Arc<dyn Fetch>, validator: Arc<dyn Validate>) -> Self {
        Self {
            store,
            fetcher,
            validator,
        }
    }

    /// Validate, fetch and merge a user-supplied address.
    ///
    /// Returns [`SubmitOutcome::Busy`] without touching the store when a
    /// submission is already in progress. Otherwise the status ends back in
    /// [`Phase::Idle`], keeping the failure reason, if any, in
    /// `SubmissionStatus::error`.
    ///
    /// Invalid and duplicate addresses fail before any fetch is attempted.
    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        if !self.store.begin_submission() {
            tracing::debug!(input = %input, "Submission already in progress");
            return SubmitOutcome::Busy;
        }
        let mut guard = IdleGuard {
            store: &self.store,
            armed: true,
        };

        let outcome = self.run(input.trim()).await;

        let finished = match &outcome {
            SubmitOutcome::Failed(reason) => SubmissionStatus::new(Phase::Failure, Some(*reason)),
            _ => SubmissionStatus::new(Phase::Success, None),
        };
        self.store.set_submission(finished);
        self.store
            .set_submission(SubmissionStatus::new(Phase::Idle, finished.error));
        guard.armed = false;

        outcome
    }

    async fn run(&self, address: &str) -> SubmitOutcome {
        if let Err(e) = self.validator.validate(address) {
            tracing::debug!(input = %address, error = %e, "Rejected feed address");
            return SubmitOutcome::Failed(match e {
                ValidationError::Empty => Reason::Required,
                _ => Reason::InvalidUrl,
            });
        }

        if self.store.has_feed(address) {
            tracing::debug!(feed = %address, "Feed already subscribed");
            return SubmitOutcome::Failed(Reason::AlreadySubscribed);
        }

        self.store
            .set_submission(SubmissionStatus::new(Phase::Fetching, None));

        match sync_source(&self.store, self.fetcher.as_ref(), address).await {
            Ok(merged) => {
                tracing::info!(
                    feed = %address,
                    new_entries = merged.added_entries.len(),
                    "Subscribed to feed"
                );
                SubmitOutcome::Subscribed {
                    source_address: address.to_string(),
                    new_entries: merged.added_entries.len(),
                }
            }
            Err(SyncError::Fetch(e)) => {
                tracing::warn!(feed = %address, error = %e, "Could not fetch submitted feed");
                SubmitOutcome::Failed(Reason::NetworkError)
            }
            Err(SyncError::Parse(e)) => {
                tracing::warn!(feed = %address, error = %e, "Submitted address is not a feed");
                SubmitOutcome::Failed(Reason::NotAFeed)
            }
        }
    }
}

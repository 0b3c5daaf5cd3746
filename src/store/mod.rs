//! Reactive session store.
//!
//! [`Store`] is a cheap cloneable handle over the session's feeds, entries
//! and transient UI status. Every mutation goes through a setter that applies
//! the change, releases the state lock, then synchronously notifies the
//! listeners subscribed to the affected [`StorePath`].

mod events;
mod types;

pub use events::{Change, EntryProperty, Field, Item, StorePath, SubscriptionId};
pub use types::{Entry, Feed, Phase, Reason, StoreError, SubmissionStatus, SUCCESS_KEY};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tokio::sync::mpsc;

use crate::feed::{merge, DedupIndex, MergeOutcome, ParsedFeed};
use crate::util::normalize_address;
use events::{channel_listener, dispatch, Listener, Listeners};

// ============================================================================
// State
// ============================================================================

/// Snapshot-able contents of the store.
///
/// Feeds are indexed by normalized address and entries by link, so dedup
/// checks and read-flag updates are O(1) while both collections keep
/// insertion order.
#[derive(Debug, Default)]
pub struct StoreState {
    feeds: Vec<Feed>,
    feed_keys: HashSet<String>,
    entries: Vec<Entry>,
    entry_index: HashMap<String, usize>,
    submission: SubmissionStatus,
    preview: Option<String>,
}

impl StoreState {
    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, link: &str) -> Option<&Entry> {
        self.entry_index.get(link).map(|&i| &self.entries[i])
    }

    pub fn submission(&self) -> SubmissionStatus {
        self.submission
    }

    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }

    fn push_feed(&mut self, feed: Feed, changes: &mut Vec<Change>) -> bool {
        let key = normalize_address(&feed.source_address).to_string();
        if !self.feed_keys.insert(key) {
            return false;
        }
        self.feeds.push(feed.clone());
        changes.push(Change::Appended {
            item: Item::Feed(feed),
        });
        true
    }

    fn push_entry(&mut self, entry: Entry, changes: &mut Vec<Change>) -> bool {
        if self.entry_index.contains_key(&entry.link) {
            return false;
        }
        self.entry_index
            .insert(entry.link.clone(), self.entries.len());
        self.entries.push(entry.clone());
        changes.push(Change::Appended {
            item: Item::Entry(entry),
        });
        true
    }

    fn set_submission(&mut self, status: SubmissionStatus, changes: &mut Vec<Change>) -> bool {
        if self.submission == status {
            return false;
        }
        self.submission = status;
        changes.push(Change::FieldChanged {
            field: Field::Submission(status),
        });
        true
    }

    fn set_preview(&mut self, preview: Option<String>, changes: &mut Vec<Change>) -> bool {
        if self.preview == preview {
            return false;
        }
        self.preview = preview.clone();
        changes.push(Change::FieldChanged {
            field: Field::Preview(preview),
        });
        true
    }

    fn mark_read(&mut self, link: &str, changes: &mut Vec<Change>) -> Result<bool, StoreError> {
        let index = *self
            .entry_index
            .get(link)
            .ok_or_else(|| StoreError::UnknownEntry(link.to_string()))?;
        let entry = &mut self.entries[index];
        if entry.read {
            return Ok(false);
        }
        entry.read = true;
        changes.push(Change::ItemPropertyChanged {
            link: link.to_string(),
            property: EntryProperty::Read,
        });
        Ok(true)
    }
}

impl DedupIndex for StoreState {
    fn contains_feed(&self, source_address: &str) -> bool {
        self.feed_keys.contains(normalize_address(source_address))
    }

    fn contains_entry(&self, link: &str) -> bool {
        self.entry_index.contains_key(link)
    }
}

// ============================================================================
// Store Handle
// ============================================================================

/// Shared handle to one session's state.
///
/// Clones refer to the same state and listener set.
#[derive(Clone, Default)]
pub struct Store {
    state: Arc<Mutex<StoreState>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl std::fmt::Debug for Store {
    // Must not block: formatting may happen inside a `read` closure
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                return f.debug_struct("Store").finish_non_exhaustive();
            }
        };
        f.debug_struct("Store")
            .field("feeds", &state.feeds.len())
            .field("entries", &state.entries.len())
            .field("submission", &state.submission)
            .finish()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a mutation, then notify listeners of the changes it recorded.
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreState, &mut Vec<Change>) -> T) -> T {
        let mut changes = Vec::new();
        let result = {
            let mut state = self.lock();
            f(&mut state, &mut changes)
        };
        dispatch(&self.listeners, &changes);
        result
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    /// Register a listener for changes under `path`.
    pub fn subscribe<F>(&self, path: StorePath, listener: F) -> SubscriptionId
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        self.lock_listeners().add(Some(path), Arc::new(listener))
    }

    /// Register a listener for every change.
    pub fn subscribe_all<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        self.lock_listeners().add(None, Arc::new(listener))
    }

    /// Forward changes under `path` (or all changes for `None`) to a channel.
    pub fn subscribe_channel(&self, path: Option<StorePath>) -> mpsc::UnboundedReceiver<Change> {
        let (listener, rx): (Listener, _) = channel_listener();
        self.lock_listeners().add(path, listener);
        rx
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock_listeners().remove(id)
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Append a feed unless one with the same normalized address exists.
    pub fn append_feed(&self, feed: Feed) -> bool {
        self.mutate(|state, changes| state.push_feed(feed, changes))
    }

    /// Append an entry unless its link is already stored.
    pub fn append_entry(&self, entry: Entry) -> bool {
        self.mutate(|state, changes| state.push_entry(entry, changes))
    }

    /// Apply a merge outcome, returning how many elements were appended.
    ///
    /// Keys are re-checked, so applying a stale outcome twice is harmless.
    pub fn apply(&self, outcome: MergeOutcome) -> usize {
        self.mutate(|state, changes| apply_outcome(state, outcome, changes))
    }

    /// Merge freshly parsed results and apply them under a single lock.
    ///
    /// Returns the outcome that was applied.
    pub fn merge_parsed(&self, parsed: ParsedFeed, source_address: &str) -> MergeOutcome {
        self.mutate(|state, changes| {
            let outcome = merge(state, parsed, source_address);
            apply_outcome(state, outcome.clone(), changes);
            outcome
        })
    }

    pub fn set_submission(&self, status: SubmissionStatus) -> bool {
        self.mutate(|state, changes| state.set_submission(status, changes))
    }

    /// Move the submission from idle to validating.
    ///
    /// Returns `false` and changes nothing when a submission is in progress.
    pub fn begin_submission(&self) -> bool {
        self.mutate(|state, changes| {
            if !state.submission.is_idle() {
                return false;
            }
            state.set_submission(SubmissionStatus::new(Phase::Validating, None), changes);
            true
        })
    }

    /// Mark an entry read.
    ///
    /// Returns `Ok(true)` on the false → true transition and `Ok(false)` when
    /// the entry was already read.
    pub fn mark_read(&self, link: &str) -> Result<bool, StoreError> {
        self.mutate(|state, changes| state.mark_read(link, changes))
    }

    /// Open an entry in the preview pane, marking it read.
    pub fn open_preview(&self, link: &str) -> Result<(), StoreError> {
        self.mutate(|state, changes| {
            state.mark_read(link, changes)?;
            state.set_preview(Some(link.to_string()), changes);
            Ok(())
        })
    }

    pub fn close_preview(&self) -> bool {
        self.mutate(|state, changes| state.set_preview(None, changes))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Run a closure against the current state.
    ///
    /// The state lock is held for the duration of the call; do not mutate the
    /// store from inside it.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        f(&self.lock())
    }

    pub fn feeds(&self) -> Vec<Feed> {
        self.lock().feeds.clone()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.lock().entries.clone()
    }

    pub fn entry(&self, link: &str) -> Option<Entry> {
        self.lock().entry(link).cloned()
    }

    /// Snapshot of the current feed source addresses, in subscription order.
    pub fn feed_addresses(&self) -> Vec<String> {
        self.lock()
            .feeds
            .iter()
            .map(|f| f.source_address.clone())
            .collect()
    }

    /// Whether a feed with the same normalized address exists.
    pub fn has_feed(&self, address: &str) -> bool {
        self.lock().contains_feed(address)
    }

    pub fn submission(&self) -> SubmissionStatus {
        self.lock().submission
    }

    pub fn preview(&self) -> Option<String> {
        self.lock().preview.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().entries.iter().filter(|e| !e.read).count()
    }
}

fn apply_outcome(state: &mut StoreState, outcome: MergeOutcome, changes: &mut Vec<Change>) -> usize {
    let mut appended = 0;
    if let Some(feed) = outcome.added_feed {
        appended += usize::from(state.push_feed(feed, changes));
    }
    for entry in outcome.added_entries {
        appended += usize::from(state.push_entry(entry, changes));
    }
    appended
}

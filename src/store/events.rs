//! Change notifications emitted by the [`Store`](super::Store).
//!
//! Every mutation produces at most one [`Change`] per logically distinct
//! change. The three variants let a renderer decide between creating a node,
//! patching a node, or replacing a scalar.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use super::types::{Entry, Feed, SubmissionStatus};

/// Logical location in the store a change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorePath {
    Feeds,
    Entries,
    Submission,
    Preview,
}

/// An element appended to one of the store collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Feed(Feed),
    Entry(Entry),
}

/// New value of a scalar store field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum Field {
    Submission(SubmissionStatus),
    Preview(Option<String>),
}

/// Property of an existing entry that changed in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryProperty {
    Read,
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    /// A new element was added to a collection
    Appended { item: Item },
    /// A scalar field took a new value
    FieldChanged { field: Field },
    /// A nested property of an existing entry changed
    ItemPropertyChanged {
        link: String,
        property: EntryProperty,
    },
}

impl Change {
    pub fn path(&self) -> StorePath {
        match self {
            Change::Appended {
                item: Item::Feed(_),
            } => StorePath::Feeds,
            Change::Appended {
                item: Item::Entry(_),
            } => StorePath::Entries,
            Change::FieldChanged {
                field: Field::Submission(_),
            } => StorePath::Submission,
            Change::FieldChanged {
                field: Field::Preview(_),
            } => StorePath::Preview,
            Change::ItemPropertyChanged { .. } => StorePath::Entries,
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub(crate) type Listener = Arc<dyn Fn(&Change) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    /// `None` receives every change
    path: Option<StorePath>,
    listener: Listener,
}

/// Registered listeners, kept apart from the store state so that listeners
/// can read the store while being notified.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

impl Listeners {
    pub(crate) fn add(&mut self, path: Option<StorePath>, listener: Listener) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscriptions.push(Subscription { id, path, listener });
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    fn matching(&self, path: StorePath) -> Vec<Listener> {
        self.subscriptions
            .iter()
            .filter(|s| s.path.is_none_or(|p| p == path))
            .map(|s| Arc::clone(&s.listener))
            .collect()
    }
}

/// Deliver changes in order to every matching listener.
///
/// The registry lock is released before any listener runs, so a listener may
/// subscribe or unsubscribe without deadlocking.
pub(crate) fn dispatch(listeners: &Mutex<Listeners>, changes: &[Change]) {
    for change in changes {
        let targets = listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .matching(change.path());
        for listener in targets {
            listener(change);
        }
    }
}

/// Listener that forwards changes to an unbounded channel.
pub(crate) fn channel_listener() -> (Listener, mpsc::UnboundedReceiver<Change>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: Listener = Arc::new(move |change: &Change| {
        if tx.send(change.clone()).is_err() {
            tracing::trace!("Change receiver dropped");
        }
    });
    (listener, rx)
}

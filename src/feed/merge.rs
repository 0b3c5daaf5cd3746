use std::collections::HashSet;

use crate::feed::parser::ParsedFeed;
use crate::store::{Entry, Feed};

/// Membership checks over what is already stored.
///
/// Implementations are expected to answer in O(1).
pub trait DedupIndex {
    /// Whether a feed with this (normalized) source address exists
    fn contains_feed(&self, source_address: &str) -> bool;
    /// Whether an entry with this link exists
    fn contains_entry(&self, link: &str) -> bool;
}

/// What a merge found to be genuinely new.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added_feed: Option<Feed>,
    pub added_entries: Vec<Entry>,
}

impl MergeOutcome {
    pub fn is_empty(&self) -> bool {
        self.added_feed.is_none() && self.added_entries.is_empty()
    }
}

/// Computes which parts of a parsed document are new.
///
/// The feed is new when `index` holds no feed for `source_address`. An entry
/// is new when neither `index` nor an earlier entry of the same batch carries
/// its link. Nothing is written and no one is notified; the caller decides
/// when to apply the outcome, so merging again after applying yields an empty
/// outcome.
pub fn merge(index: &impl DedupIndex, parsed: ParsedFeed, source_address: &str) -> MergeOutcome {
    let added_feed = (!index.contains_feed(source_address)).then(|| Feed {
        source_address: source_address.to_string(),
        title: parsed.header.title,
        description: parsed.header.description,
    });

    let mut batch: HashSet<String> = HashSet::new();
    let added_entries: Vec<Entry> = parsed
        .entries
        .into_iter()
        .filter(|e| !index.contains_entry(&e.link) && batch.insert(e.link.clone()))
        .map(|e| Entry {
            link: e.link,
            title: e.title,
            description: e.description,
            read: false,
            source_address: source_address.to_string(),
        })
        .collect();

    tracing::trace!(
        feed = %source_address,
        new_feed = added_feed.is_some(),
        new_entries = added_entries.len(),
        "Merged parsed feed"
    );

    MergeOutcome {
        added_feed,
        added_entries,
    }
}

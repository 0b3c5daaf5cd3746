use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Store-specific errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No entry with this link has been stored
    #[error("Unknown entry: {0}")]
    UnknownEntry(String),
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed remote source.
///
/// Identified by `source_address`. Created on the first successful fetch of a
/// new address and not touched afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feed {
    pub source_address: String,
    pub title: String,
    pub description: String,
}

/// One item of a feed, identified by its link across all feeds.
///
/// `read` only ever moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub link: String,
    pub title: String,
    pub description: String,
    pub read: bool,
    /// Address of the feed the entry was first seen in
    pub source_address: String,
}

// ============================================================================
// Submission Status
// ============================================================================

/// Phase of the address submission flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Validating,
    Fetching,
    Success,
    Failure,
}

/// Symbolic failure reason of a submission.
///
/// The core never produces display text. Renderers map [`Reason::key`] through
/// their message catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Input was empty or whitespace
    Required,
    /// Input is not a valid address
    InvalidUrl,
    /// A feed with the same normalized address exists
    AlreadySubscribed,
    /// The address answered, but not with a feed document
    NotAFeed,
    /// The address could not be fetched
    NetworkError,
}

/// Catalog key for a successful submission.
pub const SUCCESS_KEY: &str = "rssAdded";

impl Reason {
    /// Message catalog key for this reason.
    pub fn key(self) -> &'static str {
        match self {
            Reason::Required => "required",
            Reason::InvalidUrl => "urlNotValid",
            Reason::AlreadySubscribed => "urlAlredyExist",
            Reason::NotAFeed => "notValid",
            Reason::NetworkError => "networkError",
        }
    }
}

/// Transient status of the submission flow.
///
/// `error` survives the automatic return to [`Phase::Idle`] so the last
/// failure stays visible; the next submission clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SubmissionStatus {
    pub phase: Phase,
    pub error: Option<Reason>,
}

impl SubmissionStatus {
    pub fn new(phase: Phase, error: Option<Reason>) -> Self {
        Self { phase, error }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }
}

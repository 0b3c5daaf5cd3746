//! Reactive feed store with a polling RSS synchronization engine.
//!
//! - [`store`]: session state with per-path change notifications
//! - [`feed`]: fetching, parsing and deduplicating feed documents
//! - [`sync`]: the cancellable polling loop
//! - [`submission`]: the validate → fetch → merge flow for new addresses
//! - [`config`]: optional TOML configuration
//!
//! A renderer subscribes to the [`Store`] and reacts to [`Change`] events;
//! everything else writes to the store through its setters.

pub mod config;
pub mod feed;
pub mod store;
pub mod submission;
pub mod sync;
pub mod util;

pub use config::{Config, ConfigError};
pub use store::{Change, Entry, Feed, Phase, Reason, Store, StorePath, SubmissionStatus};
pub use submission::{Submission, SubmitOutcome};
pub use sync::{spawn_poller, PollConfig, PollerHandle, RoundReport};

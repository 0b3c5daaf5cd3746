//! Feed documents: fetching, parsing, and deduplication.
//!
//! - **Fetching**: the [`Fetch`] capability and its HTTP implementation with
//!   timeouts, retries and size limits
//! - **Parsing**: RSS XML into a [`ParsedFeed`] (channel header + items)
//! - **Merging**: deciding which parsed feed and entries are new against a
//!   [`DedupIndex`]
//!
//! # Example
//!
//! ```ignore
//! use feedline::feed::{parse, Fetch};
//!
//! let raw = fetcher.fetch("https://example.com/feed.xml").await?;
//! let parsed = parse(&raw, Some("https://example.com/feed.xml"))?;
//! let outcome = store.merge_parsed(parsed, "https://example.com/feed.xml");
//! ```

mod fetcher;
mod merge;
mod parser;

pub use fetcher::{Fetch, FetchError, FetchSettings, HttpFetcher};
pub use merge::{merge, DedupIndex, MergeOutcome};
pub use parser::{parse, FeedHeader, ParseError, ParsedEntry, ParsedFeed};

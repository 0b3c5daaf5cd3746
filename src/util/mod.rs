//! Utility functions for common operations.
//!
//! - **Address validation**: the [`Validate`] collaborator, URL policy and
//!   address normalization
//! - **Text processing**: cleaning feed-supplied text for terminal output

mod text;
mod url_validator;

pub use text::clean_line;
pub use url_validator::{
    normalize_address, validate_url, UrlValidator, Validate, ValidationError,
};
